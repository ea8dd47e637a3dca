//! End-to-end scenarios for the locked file persister
//!
//! Each test drives the public contract on a real temp directory and then
//! inspects the managed file set directly: after every completed operation
//! only the committed file (or nothing) may remain.

use std::sync::Arc;
use stowage_core::{
    CancellationToken, CorrelationTag, DataPersisterExt, DataReader, Error, JsonCodec,
};
use stowage_file::{FileDataPersisterSettings, LockedFileDataPersister, ManagedPaths};
use tempfile::TempDir;

fn persister(dir: &TempDir) -> LockedFileDataPersister<u32> {
    LockedFileDataPersister::new(dir.path().join("value.json"), Arc::new(JsonCodec))
}

fn shared_mode(dir: &TempDir) -> LockedFileDataPersister<u32> {
    persister(dir).with_settings(FileDataPersisterSettings {
        exclusive_mode: false,
        ..Default::default()
    })
}

fn paths(dir: &TempDir) -> ManagedPaths {
    ManagedPaths::new(dir.path().join("value.json"))
}

/// Only the committed file (or nothing) may exist between operations.
fn assert_clean_state(dir: &TempDir) {
    let paths = paths(dir);
    assert!(!paths.staging().exists(), "staged file left behind");
    assert!(!paths.old().exists(), "old file left behind");
    assert!(!paths.lock().exists(), "lock file left behind");
}

#[tokio::test]
async fn test_load_missing_file_is_absent() {
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();

    let result = persister(&dir).load(&cancel).await.unwrap();
    assert!(result.is_absent());
    assert_clean_state(&dir);
}

#[tokio::test]
async fn test_fresh_write() {
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let persister = persister(&dir);

    let result = persister.save(&cancel, 42).await.unwrap();
    assert!(result.is_updated());
    assert!(result.previous().is_absent());
    assert_eq!(result.updated().value(), Some(&42));

    assert!(paths(&dir).committed().exists());
    assert_clean_state(&dir);
    assert_eq!(persister.get(&cancel).await.unwrap(), Some(42));
}

#[tokio::test]
async fn test_overwrite() {
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let persister = persister(&dir);

    persister.save(&cancel, 42).await.unwrap();
    let result = persister.save(&cancel, 43).await.unwrap();

    assert!(result.is_updated());
    assert_eq!(result.previous().value(), Some(&42));
    assert_eq!(result.updated().value(), Some(&43));
    assert_clean_state(&dir);
    assert_eq!(persister.get(&cancel).await.unwrap(), Some(43));
}

#[tokio::test]
async fn test_durability_across_instances() {
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();

    persister(&dir).save(&cancel, 7).await.unwrap();

    // a fresh instance reads what the first one acknowledged
    let fresh = persister(&dir);
    assert_eq!(fresh.get(&cancel).await.unwrap(), Some(7));
}

#[tokio::test]
async fn test_remove() {
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let persister = persister(&dir);

    persister.save(&cancel, 42).await.unwrap();
    let result = persister.remove(&cancel).await.unwrap();

    assert!(result.is_updated());
    assert!(result.updated().is_absent());
    assert!(!paths(&dir).committed().exists());
    assert_clean_state(&dir);
    assert!(persister.load(&cancel).await.unwrap().is_absent());
}

#[tokio::test]
async fn test_remove_absent_changes_nothing() {
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();

    let result = persister(&dir).remove(&cancel).await.unwrap();
    assert!(!result.is_updated());
    assert!(!paths(&dir).committed().exists());
    assert_clean_state(&dir);
}

#[tokio::test]
async fn test_write_elision_on_equal_value() {
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let persister = shared_mode(&dir);

    persister.save(&cancel, 42).await.unwrap();
    let modified_before = std::fs::metadata(paths(&dir).committed())
        .unwrap()
        .modified()
        .unwrap();

    let result = persister.save(&cancel, 42).await.unwrap();
    assert!(!result.is_updated());
    assert_eq!(result.previous(), result.updated());

    let modified_after = std::fs::metadata(paths(&dir).committed())
        .unwrap()
        .modified()
        .unwrap();
    assert_eq!(modified_before, modified_after, "file was rewritten");
    assert_clean_state(&dir);
}

#[tokio::test]
async fn test_uncommitted_callback_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let persister = persister(&dir);

    let result = persister.update(&cancel, None, |_ctx| Ok(())).await.unwrap();
    assert!(!result.is_updated());
    assert!(!paths(&dir).committed().exists());
    assert_clean_state(&dir);
}

#[tokio::test]
async fn test_callback_error_is_captured() {
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let persister = persister(&dir);
    persister.save(&cancel, 42).await.unwrap();

    let result = persister
        .update(&cancel, None, |_ctx| Err(Error::callback("exploded")))
        .await
        .unwrap();

    assert!(!result.is_updated());
    assert!(result.updated().is_error());
    assert_eq!(result.previous().value(), Some(&42));
    // disk state untouched
    assert_eq!(persister.get(&cancel).await.unwrap(), Some(42));
    assert_clean_state(&dir);
}

#[tokio::test]
async fn test_load_corrupt_file_captures_error() {
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    std::fs::write(paths(&dir).committed(), b"{definitely not json").unwrap();

    let result = persister(&dir).load(&cancel).await.unwrap();
    assert!(result.is_error());
    assert_clean_state(&dir);
}

#[tokio::test]
async fn test_update_commits_over_corrupt_file() {
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    std::fs::write(paths(&dir).committed(), b"{definitely not json").unwrap();

    let persister = persister(&dir);
    let result = persister
        .update(&cancel, None, |ctx| {
            // the read half carries the failure, committing still works
            assert!(ctx.read().is_error());
            ctx.commit(1);
            Ok(())
        })
        .await
        .unwrap();

    assert!(result.is_updated());
    assert!(result.previous().is_error());
    assert_eq!(result.updated().value(), Some(&1));
    assert_eq!(persister.get(&cancel).await.unwrap(), Some(1));
    assert_clean_state(&dir);
}

#[tokio::test]
async fn test_correlation_tag_flows_to_updated_result() {
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let persister = persister(&dir);
    let tag: CorrelationTag = Arc::new(String::from("save-settings"));

    let result = persister
        .update(&cancel, Some(tag), |ctx| {
            ctx.commit(5);
            Ok(())
        })
        .await
        .unwrap();

    let tag = result
        .updated()
        .correlation_tag()
        .and_then(|t| t.downcast_ref::<String>());
    assert_eq!(tag.map(String::as_str), Some("save-settings"));

    // in exclusive mode the cached result keeps the tag across loads
    let loaded = persister.load(&cancel).await.unwrap();
    assert!(loaded.correlation_tag().is_some());
}

#[tokio::test]
async fn test_shared_mode_rereads_disk() {
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();

    let writer = shared_mode(&dir);
    let reader = shared_mode(&dir);

    writer.save(&cancel, 1).await.unwrap();
    assert_eq!(reader.get(&cancel).await.unwrap(), Some(1));

    writer.save(&cancel, 2).await.unwrap();
    assert_eq!(reader.get(&cancel).await.unwrap(), Some(2));
}

#[tokio::test]
async fn test_exclusive_cache_serves_repeated_loads() {
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let persister = persister(&dir);

    persister.save(&cancel, 9).await.unwrap();
    let first = persister.load(&cancel).await.unwrap();
    let second = persister.load(&cancel).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(second.value(), Some(&9));
}

#[tokio::test]
async fn test_close_releases_cache() {
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let persister = persister(&dir);

    persister.save(&cancel, 9).await.unwrap();
    persister.close().await;
    assert_eq!(persister.get(&cancel).await.unwrap(), Some(9));
}

#[tokio::test]
async fn test_contended_lock_surfaces_as_captured_error() {
    use fs4::FileExt;

    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();

    // hold the sentinel the way a foreign process would
    let dir_paths = paths(&dir);
    let lock_path = dir_paths.lock();
    let held = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
        .unwrap();
    FileExt::try_lock_exclusive(&held).unwrap();

    let persister = persister(&dir).with_settings(FileDataPersisterSettings {
        num_retries: 1,
        retry_delay: std::time::Duration::from_millis(5),
        ..Default::default()
    });

    let result = persister.load(&cancel).await.unwrap();
    assert!(result.is_error());
    assert!(matches!(
        result.captured_error(),
        Some(Error::LockUnavailable { .. })
    ));

    FileExt::unlock(&held).unwrap();
}

#[tokio::test]
async fn test_cancellation_during_lock_retry_mutates_nothing() {
    use fs4::FileExt;

    let dir = TempDir::new().unwrap();

    let dir_paths = paths(&dir);
    let lock_path = dir_paths.lock();
    let held = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
        .unwrap();
    FileExt::try_lock_exclusive(&held).unwrap();

    let persister = persister(&dir).with_settings(FileDataPersisterSettings {
        num_retries: 100,
        retry_delay: std::time::Duration::from_millis(50),
        ..Default::default()
    });

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        cancel_clone.cancel();
    });

    let outcome = persister.save(&cancel, 42).await;
    assert!(matches!(outcome, Err(Error::Cancelled)));

    // nothing in the managed set was touched
    assert!(!paths(&dir).committed().exists());
    assert!(!paths(&dir).staging().exists());
    assert!(!paths(&dir).old().exists());

    FileExt::unlock(&held).unwrap();
}

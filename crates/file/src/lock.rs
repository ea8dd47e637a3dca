//! Lock file and crash recovery
//!
//! Every operation on a managed file set starts by taking an exclusive
//! advisory lock on the `.lck` sentinel and ends by deleting it. Holding
//! the lock is what licenses touching the other three files, so recovery
//! runs here, immediately after acquisition and before any user-visible
//! I/O: whatever combination of committed/staged/old files a crash left
//! behind is reconciled into either nothing or a single committed file.

use crate::paths::ManagedPaths;
use crate::settings::FileDataPersisterSettings;
use fs4::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use stowage_core::{ensure_not_cancelled, Error, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Held exclusive lock over a managed file set
///
/// Dropping the lock closes the sentinel handle and deletes the file. A
/// failed deletion is swallowed: the sentinel merely lingers and the next
/// acquisition reopens it.
pub(crate) struct FileLock {
    handle: Option<File>,
    path: PathBuf,
}

impl FileLock {
    /// Acquire the lock, then reconcile the file set
    ///
    /// Contention is retried `num_retries` times with linear back-off, each
    /// wait raced against the cancellation token. Cancellation returns
    /// without having touched any file.
    pub(crate) async fn acquire(
        paths: &ManagedPaths,
        settings: &FileDataPersisterSettings,
        cancel: &CancellationToken,
    ) -> Result<FileLock> {
        ensure_not_cancelled(cancel)?;

        let mut attempts: u32 = 0;
        let handle = loop {
            attempts += 1;
            match try_open_exclusive(paths.lock()) {
                Ok(handle) => break handle,
                Err(err) if attempts > settings.num_retries => {
                    debug!(
                        path = %paths.lock().display(),
                        attempts,
                        error = %err,
                        "lock file still held, giving up"
                    );
                    return Err(Error::LockUnavailable {
                        path: paths.lock().to_path_buf(),
                        attempts,
                    });
                }
                Err(_) => {
                    let delay = settings.retry_delay * attempts;
                    debug!(
                        path = %paths.lock().display(),
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        "lock file held, backing off"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(Error::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        };

        recover(paths)?;

        Ok(FileLock {
            handle: Some(handle),
            path: paths.lock().to_path_buf(),
        })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            // fully qualified to dodge shadowing by std's File locking methods
            let _ = FileExt::unlock(&handle);
            drop(handle);
            if let Err(err) = fs::remove_file(&self.path) {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!(
                        path = %self.path.display(),
                        error = %err,
                        "could not delete lock file; next acquire reuses it"
                    );
                }
            }
        }
    }
}

fn try_open_exclusive(path: &Path) -> io::Result<File> {
    let handle = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;
    // fully qualified to dodge shadowing by std's File locking methods
    FileExt::try_lock_exclusive(&handle)?;
    Ok(handle)
}

/// Reconcile the file set into `{}` or `{committed}`
///
/// Runs under the lock, before any other I/O. The rules, with `o`/`c`/`n`
/// the existence of the old, committed, and staged files:
///
/// 1. `o ∧ c ∧ n`: the staged file is trusted as the most recent writer's
///    intent — the old file is dropped and the committed file demoted in
///    its place, then the roll-forward below applies.
/// 2. `o ∧ n`: roll forward, rename staged → committed.
/// 3. `o ∧ c`: delete the old file.
/// 4. `n` (standalone or beside committed): roll back, delete the staged
///    file.
/// 5. `o` alone: not producible by the commit protocol; the old file holds
///    the last durable value, so it is promoted back to committed rather
///    than discarded.
///
/// The procedure is idempotent: a second run finds nothing to do.
pub(crate) fn recover(paths: &ManagedPaths) -> Result<()> {
    let mut old = paths.old().exists();
    let mut committed = paths.committed().exists();
    let mut staged = paths.staging().exists();

    if old && committed && staged {
        warn!(
            path = %paths.committed().display(),
            "all three value files present; keeping staged value"
        );
        fs::remove_file(paths.old())?;
        fs::rename(paths.committed(), paths.old())?;
        committed = false;
    }

    if old && staged {
        info!(
            path = %paths.committed().display(),
            "rolling interrupted commit forward"
        );
        fs::rename(paths.staging(), paths.committed())?;
        staged = false;
        committed = true;
    }

    if old && committed {
        info!(
            path = %paths.old().display(),
            "discarding superseded value left by interrupted commit"
        );
        fs::remove_file(paths.old())?;
        old = false;
    }

    if staged {
        info!(
            path = %paths.staging().display(),
            "rolling abandoned staged value back"
        );
        fs::remove_file(paths.staging())?;
    }

    if old {
        warn!(
            path = %paths.old().display(),
            "only the superseded file exists; restoring it as committed"
        );
        fs::rename(paths.old(), paths.committed())?;
    }

    Ok(())
}

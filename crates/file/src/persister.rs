//! Crash-safe single-value file persister
//!
//! [`LockedFileDataPersister`] stores one typed value in one file and
//! guarantees that, whatever happens mid-write (a crash, a failed rename,
//! a cancelled serialization), the file set resolves deterministically to a
//! consistent state on the next operation.
//!
//! ## Commit protocol
//!
//! An update stages the serialized value into `P.new`, then pivots:
//!
//! 1. rename `P` → `P.old` (the durability point: from here recovery rolls
//!    forward instead of back)
//! 2. rename `P.new` → `P`
//! 3. delete `P.old`
//!
//! The pivot runs as a synchronous, non-cancellable block. Readers taking
//! the lock either see the state before step 1 (and find nothing to
//! recover) or after it (and recovery finishes the transition forward).
//!
//! ## Serialization layers
//!
//! Inner to outer: the per-instance async mutex totally orders operations
//! on one instance; the `.lck` sentinel serializes instances and processes
//! sharing the file; in exclusive mode the retained read-write handle on
//! `P` additionally denies share-respecting openers (advisory on POSIX) and
//! anchors an in-memory replica of the committed value, so repeated loads
//! touch no disk.

use crate::lock::FileLock;
use crate::paths::ManagedPaths;
use crate::settings::FileDataPersisterSettings;
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stowage_core::{
    Codec, Comparer, CorrelationTag, DataPersister, DataReader, Error, LoadResult, Result,
    TransactionContext, UpdateCallback, UpdateResult,
};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Exclusive-mode state: the retained handle on the committed file and the
/// in-memory replica of its deserialized value. Either both are populated
/// or neither; the cache is only trusted while the handle anchors it.
struct ExclusiveState<T> {
    handle: Option<tokio::fs::File>,
    cached: Option<LoadResult<T>>,
}

impl<T> ExclusiveState<T> {
    /// Close the retained handle before any file mutation
    ///
    /// `into_std` forces the close to complete now instead of on a
    /// background task, so a rename of the committed file cannot race the
    /// still-open handle.
    async fn invalidate(&mut self) {
        self.cached = None;
        if let Some(handle) = self.handle.take() {
            drop(handle.into_std().await);
        }
    }
}

/// Transactional persister for one typed value in one file
///
/// ```no_run
/// use std::sync::Arc;
/// use stowage_core::{CancellationToken, DataPersisterExt, JsonCodec};
/// use stowage_file::LockedFileDataPersister;
///
/// # async fn example() -> stowage_core::Result<()> {
/// let persister: LockedFileDataPersister<u32> =
///     LockedFileDataPersister::new("/data/counter.json", Arc::new(JsonCodec));
/// let cancel = CancellationToken::new();
///
/// let result = persister
///     .update(&cancel, None, |ctx| {
///         let next = ctx.read().value().copied().unwrap_or(0) + 1;
///         ctx.commit(next);
///         Ok(())
///     })
///     .await?;
/// assert!(result.is_updated());
/// # Ok(())
/// # }
/// ```
pub struct LockedFileDataPersister<T> {
    paths: ManagedPaths,
    codec: Arc<dyn Codec<T>>,
    comparer: Option<Arc<Comparer<T>>>,
    settings: FileDataPersisterSettings,
    state: Mutex<ExclusiveState<T>>,
}

impl<T> LockedFileDataPersister<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// A persister over `path` with default settings
    pub fn new(path: impl Into<PathBuf>, codec: Arc<dyn Codec<T>>) -> Self {
        LockedFileDataPersister {
            paths: ManagedPaths::new(path),
            codec,
            comparer: None,
            settings: FileDataPersisterSettings::default(),
            state: Mutex::new(ExclusiveState {
                handle: None,
                cached: None,
            }),
        }
    }

    /// Override the settings
    #[must_use]
    pub fn with_settings(mut self, settings: FileDataPersisterSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Use `comparer` for change detection instead of `PartialEq`
    #[must_use]
    pub fn with_comparer(mut self, comparer: Arc<Comparer<T>>) -> Self {
        self.comparer = Some(comparer);
        self
    }

    /// Path of the committed value file
    pub fn path(&self) -> &Path {
        self.paths.committed()
    }

    /// Release the exclusive-mode handle and forget the cached value
    ///
    /// The next operation re-reads the file. Dropping the persister closes
    /// the handle as well; `close` only exists to do it eagerly.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        state.invalidate().await;
    }

    /// Wait for the per-instance mutex, racing the cancellation token
    async fn lock_state(
        &self,
        cancel: &CancellationToken,
    ) -> Result<MutexGuard<'_, ExclusiveState<T>>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            guard = self.state.lock() => Ok(guard),
        }
    }

    /// Read the committed file, retaining handle and cache in exclusive mode
    ///
    /// Expected failures come back inside the `LoadResult`; only
    /// cancellation is an `Err`. When the open succeeded but the payload did
    /// not deserialize, the handle and the error result are still retained:
    /// deserialization is deterministic, so the cache keeps mirroring the
    /// file.
    async fn read_current(
        &self,
        cancel: &CancellationToken,
        state: &mut ExclusiveState<T>,
    ) -> Result<LoadResult<T>> {
        let mut open = tokio::fs::OpenOptions::new();
        open.read(true);
        if self.settings.exclusive_mode {
            open.write(true);
        }

        let mut file = match open.open(self.paths.committed()).await {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(LoadResult::absent().with_comparer(self.comparer.clone()));
            }
            Err(err) => {
                return Ok(LoadResult::error(err.into()).with_comparer(self.comparer.clone()));
            }
        };

        let result = match self.codec.read(cancel, &mut file).await {
            Ok(value) => LoadResult::present(value).with_comparer(self.comparer.clone()),
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => LoadResult::error(err).with_comparer(self.comparer.clone()),
        };

        if self.settings.exclusive_mode {
            state.handle = Some(file);
            state.cached = Some(result.clone());
        }
        Ok(result)
    }

    async fn load_locked(
        &self,
        cancel: &CancellationToken,
        state: &mut ExclusiveState<T>,
    ) -> Result<LoadResult<T>> {
        let _file_lock = match FileLock::acquire(&self.paths, &self.settings, cancel).await {
            Ok(lock) => lock,
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => {
                return Ok(LoadResult::error(err).with_comparer(self.comparer.clone()));
            }
        };

        if let Some(cached) = &state.cached {
            return Ok(cached.clone());
        }
        self.read_current(cancel, state).await
    }

    async fn update_locked(
        &self,
        cancel: &CancellationToken,
        correlation_tag: Option<CorrelationTag>,
        callback: UpdateCallback<'_, T>,
        state: &mut ExclusiveState<T>,
    ) -> Result<UpdateResult<T>> {
        let _file_lock = match FileLock::acquire(&self.paths, &self.settings, cancel).await {
            Ok(lock) => lock,
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => {
                let previous =
                    LoadResult::error(err.clone()).with_comparer(self.comparer.clone());
                return Ok(UpdateResult::failed(previous, err));
            }
        };

        // Read the current state. A deserialize failure still yields a
        // context: the callback may commit over unreadable bytes.
        let read = match &state.cached {
            Some(cached) => cached.clone(),
            None => self.read_current(cancel, state).await?,
        };

        let ctx = TransactionContext::new(read.clone(), correlation_tag);
        let mut ctx = match callback(ctx).await {
            Ok(ctx) => ctx,
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => return Ok(UpdateResult::failed(read, err)),
        };

        if !ctx.is_committed() {
            return Ok(UpdateResult::unchanged(read));
        }

        // A write follows: the retained handle must not outlive the file it
        // mirrors.
        state.invalidate().await;

        match self.apply_commit(cancel, &mut ctx, state).await {
            Ok(Some(updated)) => Ok(UpdateResult::committed(read, updated)),
            Ok(None) => Ok(UpdateResult::unchanged(read)),
            Err(err) if err.is_cancelled() => Err(err),
            Err(err) => Ok(UpdateResult::failed(read, err)),
        }
    }

    /// Apply a committed transaction to disk
    ///
    /// Returns the new state, or `None` when an idempotent removal found
    /// nothing to delete. Failures leave the staged or old files behind for
    /// the next operation's recovery.
    async fn apply_commit(
        &self,
        cancel: &CancellationToken,
        ctx: &mut TransactionContext<T>,
        state: &mut ExclusiveState<T>,
    ) -> Result<Option<LoadResult<T>>> {
        let tag = ctx.transaction_correlation_tag().cloned();

        if ctx.is_removed() {
            if !self.paths.committed().exists() {
                ctx.reset();
                return Ok(None);
            }
            tokio::fs::remove_file(self.paths.committed()).await?;
            debug!(path = %self.paths.committed().display(), "removed committed value");
            return Ok(Some(
                LoadResult::absent()
                    .with_correlation_tag(tag)
                    .with_comparer(self.comparer.clone()),
            ));
        }

        let value = match ctx.committed_value().cloned() {
            Some(value) => value,
            // A committed, non-removed context always carries a value;
            // treat the impossible as "nothing to do" rather than panic.
            None => {
                ctx.reset();
                return Ok(None);
            }
        };

        let mut staged = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.paths.staging())
            .await?;
        self.codec.write(cancel, &value, &mut staged).await?;
        staged.sync_all().await?;
        drop(staged.into_std().await);
        debug!(path = %self.paths.staging().display(), "staged new value");

        self.pivot()?;

        let updated = LoadResult::present(value)
            .with_correlation_tag(tag)
            .with_comparer(self.comparer.clone());

        if self.settings.exclusive_mode {
            let handle = tokio::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .open(self.paths.committed())
                .await?;
            state.handle = Some(handle);
            state.cached = Some(updated.clone());
        }

        Ok(Some(updated))
    }

    /// The commit pivot: synchronous and non-cancellable
    ///
    /// The first rename is the durability point: once the old file exists,
    /// recovery completes the transition forward even across a crash.
    fn pivot(&self) -> Result<()> {
        if self.paths.committed().exists() {
            std::fs::rename(self.paths.committed(), self.paths.old())?;
            std::fs::rename(self.paths.staging(), self.paths.committed())?;
            std::fs::remove_file(self.paths.old())?;
        } else {
            std::fs::rename(self.paths.staging(), self.paths.committed())?;
        }
        debug!(path = %self.paths.committed().display(), "commit pivot complete");
        Ok(())
    }
}

#[async_trait]
impl<T> DataReader<T> for LockedFileDataPersister<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    async fn load(&self, cancel: &CancellationToken) -> Result<LoadResult<T>> {
        let mut state = self.lock_state(cancel).await?;
        self.load_locked(cancel, &mut state).await
    }
}

#[async_trait]
impl<T> DataPersister<T> for LockedFileDataPersister<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    async fn update_with(
        &self,
        cancel: &CancellationToken,
        correlation_tag: Option<CorrelationTag>,
        callback: UpdateCallback<'_, T>,
    ) -> Result<UpdateResult<T>> {
        let mut state = self.lock_state(cancel).await?;
        self.update_locked(cancel, correlation_tag, callback, &mut state)
            .await
    }
}

//! Read-only file loader
//!
//! [`FileDataReader`] loads a value from a single file with a shared read,
//! never writes, and never takes the lock file. Its main use is as the
//! reference source of the versionable decorator: bundled seed data that
//! other machinery ships next to the application and that nothing mutates.
//!
//! When the file is declared constant, the first non-cancelled result is
//! cached and every later load is served from memory.

use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use stowage_core::{ensure_not_cancelled, Codec, Comparer, DataReader, LoadResult, Result};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Shared-read loader over a single file
pub struct FileDataReader<T> {
    path: PathBuf,
    codec: Arc<dyn Codec<T>>,
    comparer: Option<Arc<Comparer<T>>>,
    data_constant: bool,
    cache: OnceCell<LoadResult<T>>,
}

impl<T> FileDataReader<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// A reader over `path`; every load re-reads the file
    pub fn new(path: impl Into<PathBuf>, codec: Arc<dyn Codec<T>>) -> Self {
        FileDataReader {
            path: path.into(),
            codec,
            comparer: None,
            data_constant: false,
            cache: OnceCell::new(),
        }
    }

    /// A reader over a file that never changes; the first result is cached
    pub fn constant(path: impl Into<PathBuf>, codec: Arc<dyn Codec<T>>) -> Self {
        FileDataReader {
            data_constant: true,
            ..Self::new(path, codec)
        }
    }

    /// Use `comparer` for result equality instead of `PartialEq`
    #[must_use]
    pub fn with_comparer(mut self, comparer: Arc<Comparer<T>>) -> Self {
        self.comparer = Some(comparer);
        self
    }

    async fn load_once(&self, cancel: &CancellationToken) -> Result<LoadResult<T>> {
        ensure_not_cancelled(cancel)?;

        let mut file = match tokio::fs::OpenOptions::new()
            .read(true)
            .open(&self.path)
            .await
        {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(LoadResult::absent().with_comparer(self.comparer.clone()));
            }
            Err(err) => {
                return Ok(LoadResult::error(err.into()).with_comparer(self.comparer.clone()));
            }
        };

        match self.codec.read(cancel, &mut file).await {
            Ok(value) => {
                debug!(path = %self.path.display(), "loaded reference value");
                Ok(LoadResult::present(value).with_comparer(self.comparer.clone()))
            }
            Err(err) if err.is_cancelled() => Err(err),
            Err(err) => Ok(LoadResult::error(err).with_comparer(self.comparer.clone())),
        }
    }
}

#[async_trait]
impl<T> DataReader<T> for FileDataReader<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    async fn load(&self, cancel: &CancellationToken) -> Result<LoadResult<T>> {
        if self.data_constant {
            let result = self
                .cache
                .get_or_try_init(|| self.load_once(cancel))
                .await?;
            return Ok(result.clone());
        }
        self.load_once(cancel).await
    }

    fn is_data_constant(&self) -> bool {
        self.data_constant
    }
}

//! Value codecs
//!
//! A [`Codec`] turns a typed value into bytes inside the file the persister
//! manages, and back. The persister owns the file handle and its
//! positioning; a codec only borrows it for the duration of one read or
//! write and therefore cannot close it.
//!
//! Two serde-based codecs ship with the crate: [`BincodeCodec`] for compact
//! binary payloads and [`JsonCodec`] for inspectable ones. Payloads are
//! otherwise opaque to the persister.

use crate::error::{Error, Result};
use crate::traits::ensure_not_cancelled;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Reads and writes one value over a borrowed file handle
#[async_trait]
pub trait Codec<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    /// Deserialize the value from the file
    ///
    /// The handle is positioned at the start of the payload. Failures map
    /// to [`Error::Deserialization`].
    async fn read(&self, cancel: &CancellationToken, file: &mut File) -> Result<T>;

    /// Serialize `value` into the file
    ///
    /// The handle is freshly truncated. Failures map to
    /// [`Error::Serialization`]; durability (`sync_all`) is the persister's
    /// job, not the codec's.
    async fn write(&self, cancel: &CancellationToken, value: &T, file: &mut File) -> Result<()>;
}

/// Compact binary codec over `bincode`
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

#[async_trait]
impl<T> Codec<T> for BincodeCodec
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn read(&self, cancel: &CancellationToken, file: &mut File) -> Result<T> {
        ensure_not_cancelled(cancel)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await?;
        bincode::deserialize(&buf).map_err(|e| Error::deserialization(e.to_string()))
    }

    async fn write(&self, cancel: &CancellationToken, value: &T, file: &mut File) -> Result<()> {
        ensure_not_cancelled(cancel)?;
        let bytes = bincode::serialize(value).map_err(|e| Error::serialization(e.to_string()))?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Human-readable JSON codec over `serde_json`
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[async_trait]
impl<T> Codec<T> for JsonCodec
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn read(&self, cancel: &CancellationToken, file: &mut File) -> Result<T> {
        ensure_not_cancelled(cancel)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await?;
        serde_json::from_slice(&buf).map_err(|e| Error::deserialization(e.to_string()))
    }

    async fn write(&self, cancel: &CancellationToken, value: &T, file: &mut File) -> Result<()> {
        ensure_not_cancelled(cancel)?;
        let bytes =
            serde_json::to_vec(value).map_err(|e| Error::serialization(e.to_string()))?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        Ok(())
    }
}

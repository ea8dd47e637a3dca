//! Error types for stowage persisters
//!
//! One unified error enum covers every failure a persister can produce.
//! We use `thiserror` for automatic `Display` and `Error` trait
//! implementations.
//!
//! Most failures never surface as `Err` from `load`/`update`: they are
//! captured into a [`LoadResult`](crate::result::LoadResult) (or the
//! `updated` half of an [`UpdateResult`](crate::result::UpdateResult)) and
//! returned as data. The exception is [`Error::Cancelled`], which always
//! propagates to the caller.
//!
//! The enum is `Clone` so a captured failure can travel inside results that
//! are themselves cached and cloned; the underlying `io::Error` is shared
//! through an `Arc` so its kind and message survive the trip.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for stowage operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for stowage persisters
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// I/O error (file open, read, write, rename, delete)
    #[error("I/O error: {cause}")]
    Io {
        /// The underlying I/O error
        cause: Arc<io::Error>,
    },

    /// Writing a value through the codec failed
    #[error("serialization error: {message}")]
    Serialization {
        /// What went wrong
        message: String,
    },

    /// Reading a value through the codec failed
    #[error("deserialization error: {message}")]
    Deserialization {
        /// What went wrong
        message: String,
    },

    /// The lock file could not be acquired within the configured retries
    #[error("lock unavailable: {path} (after {attempts} attempts)")]
    LockUnavailable {
        /// Path of the lock file
        path: PathBuf,
        /// How many acquisition attempts were made
        attempts: u32,
    },

    /// The operation was cancelled through its cancellation token
    ///
    /// This is the only error kind that propagates as `Err` from
    /// `load`/`update`; everything else is captured into the result.
    #[error("operation cancelled")]
    Cancelled,

    /// The transaction callback failed
    #[error("callback error: {message}")]
    Callback {
        /// What went wrong
        message: String,
    },
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io { cause: Arc::new(e) }
    }
}

impl Error {
    /// Create a Serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Error::Serialization {
            message: message.into(),
        }
    }

    /// Create a Deserialization error
    pub fn deserialization(message: impl Into<String>) -> Self {
        Error::Deserialization {
            message: message.into(),
        }
    }

    /// Create a Callback error
    pub fn callback(message: impl Into<String>) -> Self {
        Error::Callback {
            message: message.into(),
        }
    }

    /// Check if this error is a cancellation
    ///
    /// Cancellation must never be captured into a result; callers use this
    /// to decide between propagating and capturing.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Check if this error is a lock acquisition failure
    pub fn is_lock_unavailable(&self) -> bool {
        matches!(self, Error::LockUnavailable { .. })
    }

    /// Check if this error is a codec failure (either direction)
    pub fn is_codec_error(&self) -> bool {
        matches!(
            self,
            Error::Serialization { .. } | Error::Deserialization { .. }
        )
    }

    /// Check if this error is an I/O failure
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io { .. })
    }
}

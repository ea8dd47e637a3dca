//! Contract layer for stowage
//!
//! This crate defines the types every stowage provider speaks:
//!
//! - [`LoadResult`] / [`UpdateResult`]: tri-state result records with
//!   captured-error transport and correlation tags
//! - [`TransactionContext`]: the mutable per-update object handed to the
//!   transaction callback
//! - [`DataReader`] / [`DataPersister`]: object-safe async traits at the
//!   provider seam, plus [`DataPersisterExt`] conveniences
//! - [`Codec`]: serialize/deserialize over a borrowed file handle, with
//!   bincode and JSON implementations
//! - [`MemoryDataPersister`]: the contract over process memory
//!
//! Crash-safe file persistence lives in `stowage-file`; value-mapping
//! decorators live in `stowage-decorators`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod context;
pub mod error;
pub mod memory;
pub mod result;
pub mod traits;

pub use codec::{BincodeCodec, Codec, JsonCodec};
pub use context::TransactionContext;
pub use error::{Error, Result};
pub use memory::MemoryDataPersister;
pub use result::{values_equal, Comparer, CorrelationTag, LoadResult, UpdateResult};
pub use traits::{
    async_callback, ensure_not_cancelled, sync_callback, BoxFuture, DataPersister,
    DataPersisterExt, DataReader, UpdateCallback, Versioned,
};

// The cancellation token is part of every public signature; re-export it so
// downstream crates do not need a direct tokio-util dependency.
pub use tokio_util::sync::CancellationToken;

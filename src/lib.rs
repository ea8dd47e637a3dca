//! # Stowage
//!
//! Crash-safe, concurrency-safe atomic updates of one typed value stored in
//! one file — on an ordinary filesystem with no transactional primitives.
//!
//! A persister owns a base path and a codec. `load` reads the current
//! value; `update` runs a transactional read-modify-write: the callback
//! sees a snapshot, decides to commit, remove, or do nothing, and the
//! persister applies the outcome through a staged write and an atomic
//! rename pivot. Whatever a crash leaves behind, the next operation's
//! recovery resolves it deterministically.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use stowage::{CancellationToken, DataPersisterExt, JsonCodec, LockedFileDataPersister};
//!
//! # async fn example() -> stowage::Result<()> {
//! let persister: LockedFileDataPersister<u32> =
//!     LockedFileDataPersister::new("./counter.json", Arc::new(JsonCodec));
//! let cancel = CancellationToken::new();
//!
//! // Atomic increment: read, modify, commit. Concurrent writers through
//! // other instances or processes serialize on the lock file.
//! persister
//!     .update(&cancel, None, |ctx| {
//!         let next = ctx.read().value().copied().unwrap_or(0) + 1;
//!         ctx.commit(next);
//!         Ok(())
//!     })
//!     .await?;
//!
//! assert_eq!(persister.get(&cancel).await?, Some(1));
//! # Ok(())
//! # }
//! ```
//!
//! # Pieces
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`LockedFileDataPersister`] | Transactional file persister (lock file, recovery, rename-pivot commit) |
//! | [`FileDataReader`] | Read-only loader, cacheable for immutable reference data |
//! | [`MemoryDataPersister`] | Same contract over process memory |
//! | [`DefaultValueDataPersister`] | Maps default values to presence/absence at the boundary |
//! | [`VersionableDataPersister`] | Prefers reference data over a version-mismatched local value |
//!
//! Results never hide state in exceptions: a load is `Present`, `Absent`,
//! or `Error` with the failure captured inside; only cancellation
//! propagates as `Err`.

pub use stowage_core::{
    async_callback, ensure_not_cancelled, sync_callback, values_equal, BincodeCodec, BoxFuture,
    CancellationToken, Codec, Comparer, CorrelationTag, DataPersister, DataPersisterExt,
    DataReader, Error, JsonCodec, LoadResult, MemoryDataPersister, Result, TransactionContext,
    UpdateCallback, UpdateResult, Versioned,
};

pub use stowage_file::{
    FileDataPersisterSettings, FileDataReader, LockedFileDataPersister, ManagedPaths,
};

pub use stowage_decorators::{
    DefaultValueDataPersister, DefaultValueOptions, VersionableDataPersister,
};

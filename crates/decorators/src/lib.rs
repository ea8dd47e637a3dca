//! Value-mapping decorators for stowage persisters
//!
//! Decorators wrap any `Arc<dyn DataPersister<T>>` and adjust what crosses
//! the boundary without touching the underlying transactional machinery:
//!
//! - [`DefaultValueDataPersister`]: maps between an "empty / default"
//!   representation at the caller and presence/absence at the store
//! - [`VersionableDataPersister`]: prefers an immutable reference value
//!   whenever the locally persisted one carries a different format version

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod default_value;
pub mod versionable;

pub use default_value::{DefaultValueDataPersister, DefaultValueOptions};
pub use versionable::VersionableDataPersister;

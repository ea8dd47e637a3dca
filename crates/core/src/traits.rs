//! Trait seams between providers and callers
//!
//! [`DataReader`] is the read-only contract; [`DataPersister`] adds the
//! transactional update. Both are object-safe async traits so decorators can
//! wrap any provider behind `Arc<dyn DataPersister<T>>`.
//!
//! The transaction callback crosses the trait boundary as a boxed
//! [`UpdateCallback`]; [`sync_callback`] and [`async_callback`] build one
//! from a plain closure, and [`DataPersisterExt`] layers the convenience
//! operations (`update` with a sync closure, `save`, `remove`, `get`) on
//! top of the boxed form.

use crate::context::TransactionContext;
use crate::error::{Error, Result};
use crate::result::{CorrelationTag, LoadResult, UpdateResult};
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

/// Owned, pinned future, the currency of boxed async callbacks
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Boxed transaction callback
///
/// Takes the [`TransactionContext`] by value for exactly one invocation and
/// hands it back once the caller has decided to commit, remove, or leave
/// the value untouched; the persister then inspects the returned context.
/// Errors other than [`Error::Cancelled`] are captured into the update
/// result rather than propagated.
pub type UpdateCallback<'a, T> =
    Box<dyn FnOnce(TransactionContext<T>) -> BoxFuture<'a, Result<TransactionContext<T>>> + Send + 'a>;

/// Fail with [`Error::Cancelled`] when the token has fired
pub fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

/// Box an async closure as an [`UpdateCallback`]
///
/// The context flows through the future by value and comes back out:
///
/// ```ignore
/// persister.update_with(&cancel, None, async_callback(|mut ctx| Box::pin(async move {
///     ctx.commit(next_value().await?);
///     Ok(ctx)
/// }))).await?;
/// ```
pub fn async_callback<'a, T, F>(f: F) -> UpdateCallback<'a, T>
where
    T: 'a,
    F: FnOnce(TransactionContext<T>) -> BoxFuture<'a, Result<TransactionContext<T>>> + Send + 'a,
{
    Box::new(f)
}

/// Box a synchronous closure as an [`UpdateCallback`]
pub fn sync_callback<'a, T, F>(f: F) -> UpdateCallback<'a, T>
where
    T: Send + 'a,
    F: FnOnce(&mut TransactionContext<T>) -> Result<()> + Send + 'a,
{
    Box::new(move |mut ctx| {
        Box::pin(async move {
            f(&mut ctx)?;
            Ok(ctx)
        })
    })
}

/// Read-only access to a persisted value
#[async_trait]
pub trait DataReader<T>: Send + Sync
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Load the current value
    ///
    /// Expected conditions are encoded in the result: a missing value is
    /// `Absent`, a failed read is `Error`. Only cancellation surfaces as
    /// `Err`.
    async fn load(&self, cancel: &CancellationToken) -> Result<LoadResult<T>>;

    /// True when the underlying data never changes
    ///
    /// Consumers may cache the first successful load forever.
    fn is_data_constant(&self) -> bool {
        false
    }
}

/// Transactional read-modify-write access to a persisted value
#[async_trait]
pub trait DataPersister<T>: DataReader<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Run one atomic update transaction
    ///
    /// The callback receives a [`TransactionContext`] seeded with the
    /// current value; whatever it commits (or removes) is applied
    /// atomically. Callback failures are captured into the `updated` half
    /// of the result, except cancellation, which propagates.
    async fn update_with(
        &self,
        cancel: &CancellationToken,
        correlation_tag: Option<CorrelationTag>,
        callback: UpdateCallback<'_, T>,
    ) -> Result<UpdateResult<T>>;
}

/// Convenience operations over any [`DataPersister`]
pub trait DataPersisterExt<T>: DataPersister<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Run an update transaction with a synchronous callback
    fn update<'a, F>(
        &'a self,
        cancel: &'a CancellationToken,
        correlation_tag: Option<CorrelationTag>,
        f: F,
    ) -> BoxFuture<'a, Result<UpdateResult<T>>>
    where
        F: FnOnce(&mut TransactionContext<T>) -> Result<()> + Send + 'a,
    {
        self.update_with(cancel, correlation_tag, sync_callback(f))
    }

    /// Commit `value`, eliding the write when it equals the current value
    fn save<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        value: T,
    ) -> BoxFuture<'a, Result<UpdateResult<T>>> {
        self.update(cancel, None, move |ctx| {
            ctx.commit(value);
            Ok(())
        })
    }

    /// Remove the persisted value
    fn remove<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<UpdateResult<T>>> {
        self.update(cancel, None, |ctx| {
            ctx.remove_and_commit();
            Ok(())
        })
    }

    /// Load, mapping `Absent` to `None` and rethrowing a captured failure
    fn get<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<Option<T>>> {
        Box::pin(async move {
            let result = self.load(cancel).await?;
            if let Some(err) = result.captured_error() {
                return Err(err.clone());
            }
            Ok(result.into_value())
        })
    }
}

impl<T, P> DataPersisterExt<T> for P
where
    P: DataPersister<T> + ?Sized,
    T: Clone + PartialEq + Send + Sync + 'static,
{
}

/// A value type carrying a serialized-format version number
///
/// Used by the versionable decorator to decide when a reference value
/// supersedes the locally persisted one.
pub trait Versioned {
    /// The version of this value's serialized shape
    fn format_version(&self) -> u32;
}

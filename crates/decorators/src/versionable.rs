//! Format-version arbitration decorator
//!
//! [`VersionableDataPersister`] pairs a writable persister with an
//! immutable reference source, typically seed data bundled with the
//! application. Whenever the locally persisted value is missing, unreadable,
//! or carries a different serialized-format version than the reference, the
//! reference wins: loads report it, and the next committed update migrates
//! the local file to the reference's shape.
//!
//! The migration rides the inner persister's transaction, so atomicity on
//! disk is preserved.

use async_trait::async_trait;
use std::sync::Arc;
use stowage_core::{
    CancellationToken, CorrelationTag, DataPersister, DataReader, LoadResult, Result,
    TransactionContext, UpdateCallback, UpdateResult, Versioned,
};
use tokio::sync::OnceCell;
use tracing::debug;

/// Decorator preferring a reference value over a version-mismatched local one
pub struct VersionableDataPersister<T> {
    inner: Arc<dyn DataPersister<T>>,
    reference: Arc<dyn DataReader<T>>,
    memo: OnceCell<LoadResult<T>>,
}

/// True when the reference value supersedes the local read
///
/// The reference must be present, and the local read must either carry no
/// value (absent, or unreadable bytes) or disagree on the format version.
fn should_use_reference<T: Versioned>(reference: &LoadResult<T>, local: &LoadResult<T>) -> bool {
    match (reference.value(), local.value()) {
        (Some(reference), Some(local)) => local.format_version() != reference.format_version(),
        (Some(_), None) => true,
        (None, _) => false,
    }
}

impl<T> VersionableDataPersister<T>
where
    T: Versioned + Clone + PartialEq + Send + Sync + 'static,
{
    /// Wrap `inner`, arbitrating against `reference`
    pub fn new(inner: Arc<dyn DataPersister<T>>, reference: Arc<dyn DataReader<T>>) -> Self {
        VersionableDataPersister {
            inner,
            reference,
            memo: OnceCell::new(),
        }
    }

    /// Load the reference value, memoized when the reader declares it constant
    ///
    /// Re-entrancy is harmless here: the outer operation is already
    /// serialized by the inner persister's mutex.
    async fn load_reference(&self, cancel: &CancellationToken) -> Result<LoadResult<T>> {
        if self.reference.is_data_constant() {
            let result = self
                .memo
                .get_or_try_init(|| self.reference.load(cancel))
                .await?;
            return Ok(result.clone());
        }
        self.reference.load(cancel).await
    }
}

#[async_trait]
impl<T> DataReader<T> for VersionableDataPersister<T>
where
    T: Versioned + Clone + PartialEq + Send + Sync + 'static,
{
    async fn load(&self, cancel: &CancellationToken) -> Result<LoadResult<T>> {
        let local = self.inner.load(cancel).await?;
        let reference = self.load_reference(cancel).await?;
        if should_use_reference(&reference, &local) {
            debug!("reference value supersedes local read");
            return Ok(reference);
        }
        Ok(local)
    }

    fn is_data_constant(&self) -> bool {
        self.inner.is_data_constant()
    }
}

#[async_trait]
impl<T> DataPersister<T> for VersionableDataPersister<T>
where
    T: Versioned + Clone + PartialEq + Send + Sync + 'static,
{
    async fn update_with(
        &self,
        cancel: &CancellationToken,
        correlation_tag: Option<CorrelationTag>,
        callback: UpdateCallback<'_, T>,
    ) -> Result<UpdateResult<T>> {
        let reference = self.load_reference(cancel).await?;

        self.inner
            .update_with(
                cancel,
                correlation_tag,
                Box::new(move |mut inner_ctx| {
                    Box::pin(async move {
                        if !should_use_reference(&reference, inner_ctx.read()) {
                            return callback(inner_ctx).await;
                        }

                        // The caller transacts against the reference value;
                        // its decision is mirrored onto the local context so
                        // the migrated shape lands on disk atomically.
                        let reference_ctx = TransactionContext::new(
                            reference.clone(),
                            inner_ctx.transaction_correlation_tag().cloned(),
                        );
                        let reference_ctx = callback(reference_ctx).await?;

                        if reference_ctx.is_committed() {
                            if reference_ctx.is_removed() {
                                inner_ctx.remove_and_commit();
                            } else if let Some(value) = reference_ctx.committed_value() {
                                inner_ctx.commit(value.clone());
                            }
                        }
                        Ok(inner_ctx)
                    })
                }),
            )
            .await
    }
}

//! Default-value mapping decorator
//!
//! [`DefaultValueDataPersister`] translates between an "empty / default"
//! representation at the caller boundary and presence/absence at the
//! underlying persister. A caller that wants "no file" to look like a
//! well-formed default value, and a committed default to mean "delete the
//! file", configures the mapping here instead of hand-rolling it at every
//! call site.
//!
//! The transactional guarantees of the inner persister are untouched: the
//! decorator only rewrites what flows across its boundary.

use async_trait::async_trait;
use bitflags::bitflags;
use std::sync::Arc;
use stowage_core::{
    values_equal, CancellationToken, Comparer, CorrelationTag, DataPersister, DataReader,
    LoadResult, Result, TransactionContext, UpdateCallback, UpdateResult,
};

bitflags! {
    /// Which mappings the decorator applies
    ///
    /// Read-side options rewrite what a load reports; write-side options
    /// rewrite what a commit stores. `T::default()` is the type's
    /// zero/empty sentinel; the custom default is supplied at construction.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DefaultValueOptions: u8 {
        /// Surface an `Absent` inner read as the custom default.
        const READ_EMPTY_TO_CUSTOM_DEFAULT = 1 << 0;
        /// Surface an `Error` inner read as the custom default.
        const READ_ERROR_TO_CUSTOM_DEFAULT = 1 << 1;
        /// Surface a read equal to `T::default()` as the custom default.
        const READ_DEFAULT_TO_CUSTOM_DEFAULT = 1 << 2;
        /// Turn a commit of `T::default()` into a removal.
        const WRITE_DEFAULT_TO_EMPTY = 1 << 3;
        /// Turn a commit of the custom default into a removal.
        const WRITE_CUSTOM_DEFAULT_TO_EMPTY = 1 << 4;
    }
}

/// Decorator mapping default values to presence/absence
pub struct DefaultValueDataPersister<T> {
    inner: Arc<dyn DataPersister<T>>,
    options: DefaultValueOptions,
    custom_default: T,
    comparer: Option<Arc<Comparer<T>>>,
}

impl<T> DefaultValueDataPersister<T>
where
    T: Clone + PartialEq + Default + Send + Sync + 'static,
{
    /// Wrap `inner` with the given mapping options and custom default
    pub fn new(
        inner: Arc<dyn DataPersister<T>>,
        options: DefaultValueOptions,
        custom_default: T,
    ) -> Self {
        DefaultValueDataPersister {
            inner,
            options,
            custom_default,
            comparer: None,
        }
    }

    /// Use `comparer` for the sentinel comparisons instead of `PartialEq`
    #[must_use]
    pub fn with_comparer(mut self, comparer: Arc<Comparer<T>>) -> Self {
        self.comparer = Some(comparer);
        self
    }

    /// Apply the read-side mapping to an inner result
    fn map_read(&self, result: LoadResult<T>) -> LoadResult<T> {
        let mapped = if result.is_absent() {
            self.options
                .contains(DefaultValueOptions::READ_EMPTY_TO_CUSTOM_DEFAULT)
        } else if result.is_error() {
            self.options
                .contains(DefaultValueOptions::READ_ERROR_TO_CUSTOM_DEFAULT)
        } else {
            self.options
                .contains(DefaultValueOptions::READ_DEFAULT_TO_CUSTOM_DEFAULT)
                && result
                    .value()
                    .map(|v| values_equal(self.comparer.as_ref(), v, &T::default()))
                    .unwrap_or(false)
        };

        if mapped {
            let tag = result.correlation_tag().cloned();
            LoadResult::present(self.custom_default.clone())
                .with_correlation_tag(tag)
                .with_comparer(self.comparer.clone())
        } else {
            result
        }
    }

    /// True when committing `value` should remove the underlying file
    fn write_maps_to_removal(&self, value: &T) -> bool {
        let to_empty = self
            .options
            .contains(DefaultValueOptions::WRITE_DEFAULT_TO_EMPTY)
            && values_equal(self.comparer.as_ref(), value, &T::default());
        let custom_to_empty = self
            .options
            .contains(DefaultValueOptions::WRITE_CUSTOM_DEFAULT_TO_EMPTY)
            && values_equal(self.comparer.as_ref(), value, &self.custom_default);
        to_empty || custom_to_empty
    }
}

#[async_trait]
impl<T> DataReader<T> for DefaultValueDataPersister<T>
where
    T: Clone + PartialEq + Default + Send + Sync + 'static,
{
    async fn load(&self, cancel: &CancellationToken) -> Result<LoadResult<T>> {
        let inner = self.inner.load(cancel).await?;
        Ok(self.map_read(inner))
    }

    fn is_data_constant(&self) -> bool {
        self.inner.is_data_constant()
    }
}

#[async_trait]
impl<T> DataPersister<T> for DefaultValueDataPersister<T>
where
    T: Clone + PartialEq + Default + Send + Sync + 'static,
{
    async fn update_with(
        &self,
        cancel: &CancellationToken,
        correlation_tag: Option<CorrelationTag>,
        callback: UpdateCallback<'_, T>,
    ) -> Result<UpdateResult<T>> {
        let result = self
            .inner
            .update_with(
                cancel,
                correlation_tag,
                Box::new(move |mut inner_ctx| {
                    Box::pin(async move {
                        // The caller transacts against the mapped view.
                        let mapped = self.map_read(inner_ctx.read().clone());
                        let outer_ctx = TransactionContext::new(
                            mapped,
                            inner_ctx.transaction_correlation_tag().cloned(),
                        );
                        let outer_ctx = callback(outer_ctx).await?;

                        if outer_ctx.is_committed() {
                            if outer_ctx.is_removed() {
                                inner_ctx.remove_and_commit();
                            } else if let Some(value) = outer_ctx.committed_value() {
                                if self.write_maps_to_removal(value) {
                                    inner_ctx.remove_and_commit();
                                } else {
                                    inner_ctx.commit(value.clone());
                                }
                            }
                        }
                        Ok(inner_ctx)
                    })
                }),
            )
            .await?;

        // Re-map both halves so the outward result matches what a decorated
        // load would report before and after the update.
        let (is_updated, previous, updated) = result.into_parts();
        Ok(UpdateResult::from_parts(
            is_updated,
            self.map_read(previous),
            self.map_read(updated),
        ))
    }
}

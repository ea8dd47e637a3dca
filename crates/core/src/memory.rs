//! In-memory persister
//!
//! The full [`DataPersister`] contract over process memory: same
//! transaction-context semantics (write elision, idempotent removal,
//! callback error capture), no durability. Useful as a stand-in during
//! tests and for composing decorators without touching disk.

use crate::context::TransactionContext;
use crate::error::Result;
use crate::result::{Comparer, CorrelationTag, LoadResult, UpdateResult};
use crate::traits::{ensure_not_cancelled, DataPersister, DataReader, UpdateCallback};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

struct MemoryState<T> {
    value: Option<T>,
    correlation_tag: Option<CorrelationTag>,
}

/// A [`DataPersister`] backed by process memory
pub struct MemoryDataPersister<T> {
    comparer: Option<Arc<Comparer<T>>>,
    state: Mutex<MemoryState<T>>,
}

impl<T> MemoryDataPersister<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// An empty persister (loads report `Absent`)
    pub fn new() -> Self {
        MemoryDataPersister {
            comparer: None,
            state: Mutex::new(MemoryState {
                value: None,
                correlation_tag: None,
            }),
        }
    }

    /// A persister seeded with an initial value
    pub fn with_value(value: T) -> Self {
        MemoryDataPersister {
            comparer: None,
            state: Mutex::new(MemoryState {
                value: Some(value),
                correlation_tag: None,
            }),
        }
    }

    /// Use `comparer` for change detection instead of `PartialEq`
    #[must_use]
    pub fn with_comparer(mut self, comparer: Arc<Comparer<T>>) -> Self {
        self.comparer = Some(comparer);
        self
    }

    fn snapshot(&self, state: &MemoryState<T>) -> LoadResult<T> {
        match &state.value {
            Some(v) => LoadResult::present(v.clone())
                .with_correlation_tag(state.correlation_tag.clone())
                .with_comparer(self.comparer.clone()),
            None => LoadResult::absent().with_comparer(self.comparer.clone()),
        }
    }
}

impl<T> Default for MemoryDataPersister<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> DataReader<T> for MemoryDataPersister<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    async fn load(&self, cancel: &CancellationToken) -> Result<LoadResult<T>> {
        ensure_not_cancelled(cancel)?;
        let state = self.state.lock().await;
        Ok(self.snapshot(&state))
    }
}

#[async_trait]
impl<T> DataPersister<T> for MemoryDataPersister<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    async fn update_with(
        &self,
        cancel: &CancellationToken,
        correlation_tag: Option<CorrelationTag>,
        callback: UpdateCallback<'_, T>,
    ) -> Result<UpdateResult<T>> {
        ensure_not_cancelled(cancel)?;
        let mut state = self.state.lock().await;
        let read = self.snapshot(&state);

        let ctx = TransactionContext::new(read.clone(), correlation_tag);
        let mut ctx = match callback(ctx).await {
            Ok(ctx) => ctx,
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => return Ok(UpdateResult::failed(read, err)),
        };

        if !ctx.is_committed() {
            return Ok(UpdateResult::unchanged(read));
        }

        let tag = ctx.transaction_correlation_tag().cloned();
        if ctx.is_removed() {
            if state.value.is_none() {
                ctx.reset();
                return Ok(UpdateResult::unchanged(read));
            }
            state.value = None;
            state.correlation_tag = tag.clone();
            let updated = LoadResult::absent()
                .with_correlation_tag(tag)
                .with_comparer(self.comparer.clone());
            return Ok(UpdateResult::committed(read, updated));
        }

        let value = match ctx.committed_value().cloned() {
            Some(value) => value,
            // a committed, non-removed context always carries a value
            None => return Ok(UpdateResult::unchanged(read)),
        };
        state.value = Some(value.clone());
        state.correlation_tag = tag.clone();
        let updated = LoadResult::present(value)
            .with_correlation_tag(tag)
            .with_comparer(self.comparer.clone());
        Ok(UpdateResult::committed(read, updated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::traits::DataPersisterExt;

    #[tokio::test]
    async fn test_load_empty_is_absent() {
        let persister = MemoryDataPersister::<u32>::new();
        let cancel = CancellationToken::new();
        assert!(persister.load(&cancel).await.unwrap().is_absent());
    }

    #[tokio::test]
    async fn test_commit_then_load() {
        let persister = MemoryDataPersister::<u32>::new();
        let cancel = CancellationToken::new();

        let result = persister.save(&cancel, 42).await.unwrap();
        assert!(result.is_updated());
        assert_eq!(result.updated().value(), Some(&42));
        assert_eq!(persister.get(&cancel).await.unwrap(), Some(42));
    }

    #[tokio::test]
    async fn test_write_elision() {
        let persister = MemoryDataPersister::with_value(42u32);
        let cancel = CancellationToken::new();

        let result = persister.save(&cancel, 42).await.unwrap();
        assert!(!result.is_updated());
    }

    #[tokio::test]
    async fn test_remove_and_reload() {
        let persister = MemoryDataPersister::with_value(42u32);
        let cancel = CancellationToken::new();

        let result = persister.remove(&cancel).await.unwrap();
        assert!(result.is_updated());
        assert!(result.updated().is_absent());
        assert!(persister.load(&cancel).await.unwrap().is_absent());
    }

    #[tokio::test]
    async fn test_remove_absent_is_noop() {
        let persister = MemoryDataPersister::<u32>::new();
        let cancel = CancellationToken::new();

        let result = persister.remove(&cancel).await.unwrap();
        assert!(!result.is_updated());
        assert!(result.updated().is_absent());
    }

    #[tokio::test]
    async fn test_callback_error_is_captured() {
        let persister = MemoryDataPersister::with_value(42u32);
        let cancel = CancellationToken::new();

        let result = persister
            .update(&cancel, None, |_ctx| Err(Error::callback("exploded")))
            .await
            .unwrap();
        assert!(!result.is_updated());
        assert!(result.updated().is_error());
        assert_eq!(result.previous().value(), Some(&42));
    }

    #[tokio::test]
    async fn test_cancellation_in_callback_propagates() {
        let persister = MemoryDataPersister::with_value(42u32);
        let cancel = CancellationToken::new();

        let outcome = persister
            .update(&cancel, None, |_ctx| Err(Error::Cancelled))
            .await;
        assert!(matches!(outcome, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_correlation_tag_travels_to_result() {
        let persister = MemoryDataPersister::<u32>::new();
        let cancel = CancellationToken::new();
        let tag: CorrelationTag = Arc::new("intent-7");

        let result = persister
            .update(&cancel, Some(tag), |ctx| {
                ctx.commit(1);
                Ok(())
            })
            .await
            .unwrap();

        let tag = result
            .updated()
            .correlation_tag()
            .and_then(|t| t.downcast_ref::<&str>());
        assert_eq!(tag, Some(&"intent-7"));

        // the tag survives into the next load
        let loaded = persister.load(&cancel).await.unwrap();
        assert!(loaded.correlation_tag().is_some());
    }
}

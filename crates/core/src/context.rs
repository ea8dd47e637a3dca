//! Transaction context for atomic updates
//!
//! A [`TransactionContext`] is handed to the update callback and is mutable
//! only for the duration of that one invocation. The callback inspects the
//! snapshot read at the start of the transaction and decides to commit a new
//! value, remove the persisted value, or do nothing; the persister examines
//! the context afterwards to decide whether any disk write is needed.
//!
//! Change detection runs under the provider's comparer: committing a value
//! equal to the one just read is a no-op, which the persister uses as a
//! write-elision signal.

use crate::result::{values_equal, Comparer, CorrelationTag, LoadResult};
use std::sync::Arc;

/// Per-update state passed to the transaction callback
///
/// # Lifecycle
///
/// 1. The persister reads the current value and builds a context from it.
/// 2. The callback calls [`commit`](Self::commit),
///    [`remove_and_commit`](Self::remove_and_commit), or neither.
/// 3. The persister inspects [`is_committed`](Self::is_committed) /
///    [`is_removed`](Self::is_removed) and performs the write, the removal,
///    or nothing.
pub struct TransactionContext<T> {
    read: LoadResult<T>,
    transaction_correlation_tag: Option<CorrelationTag>,
    comparer: Option<Arc<Comparer<T>>>,
    committed: bool,
    removed: bool,
    committed_value: Option<T>,
}

impl<T: Clone + PartialEq> TransactionContext<T> {
    /// Build a context from the snapshot read at transaction start
    ///
    /// The comparer is taken from the snapshot, so change detection matches
    /// the provider that produced the read.
    pub fn new(read: LoadResult<T>, transaction_correlation_tag: Option<CorrelationTag>) -> Self {
        let comparer = read.comparer().cloned();
        TransactionContext {
            read,
            transaction_correlation_tag,
            comparer,
            committed: false,
            removed: false,
            committed_value: None,
        }
    }

    /// The snapshot read at the start of the transaction
    ///
    /// An `Error` read is possible: the persisted bytes exist but could not
    /// be deserialized. The callback may still commit over it.
    pub fn read(&self) -> &LoadResult<T> {
        &self.read
    }

    /// The caller-supplied tag for this transaction
    ///
    /// On a successful commit it becomes the correlation tag of the new
    /// persisted result.
    pub fn transaction_correlation_tag(&self) -> Option<&CorrelationTag> {
        self.transaction_correlation_tag.as_ref()
    }

    /// Commit `value` as the new persisted state
    ///
    /// Marks the transaction committed only when `value` differs from the
    /// read snapshot under the comparer; committing the value just read is
    /// a no-op and no disk write happens. An `Absent` or `Error` read always
    /// counts as different. Clears a pending removal.
    pub fn commit(&mut self, value: T) {
        let differs = match self.read.value() {
            Some(previous) => !values_equal(self.comparer.as_ref(), previous, &value),
            None => true,
        };
        self.committed = differs;
        self.removed = false;
        self.committed_value = Some(value);
    }

    /// Remove the persisted value
    ///
    /// A no-op when the read snapshot was already `Absent`.
    pub fn remove_and_commit(&mut self) {
        self.committed = self.read.is_present();
        self.removed = true;
        self.committed_value = None;
    }

    /// Commit `Some(value)` or remove on `None`
    pub fn commit_option(&mut self, value: Option<T>) {
        match value {
            Some(v) => self.commit(v),
            None => self.remove_and_commit(),
        }
    }

    /// Return the context to its uncommitted state
    pub fn reset(&mut self) {
        self.committed = false;
        self.removed = false;
        self.committed_value = None;
    }

    /// True when the transaction will write
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// True when the transaction removes rather than writes
    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// The value to be committed, when one was supplied
    pub fn committed_value(&self) -> Option<&T> {
        self.committed_value.as_ref()
    }
}

//! Load and update result records
//!
//! [`LoadResult`] is the tri-state outcome of reading a persisted value:
//! present, absent, or a captured error. [`UpdateResult`] pairs the snapshot
//! read at the start of a transactional update with the state the update
//! left behind.
//!
//! Both records are immutable once constructed and cheap to clone; the
//! persister caches and returns the same logical result without re-reading
//! disk.

use crate::error::Error;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Opaque caller-supplied tag threaded through results
///
/// Lets callers match an observed result to the update that produced it.
/// Runtime-only: tags are never persisted and do not survive a process
/// restart.
pub type CorrelationTag = Arc<dyn Any + Send + Sync>;

/// Equality predicate a provider uses for change detection
///
/// When a persister is built without one, structural `PartialEq` is used.
pub type Comparer<T> = dyn Fn(&T, &T) -> bool + Send + Sync;

/// Compare two values under an optional provider comparer
///
/// Falls back to structural equality when no comparer is configured.
pub fn values_equal<T: PartialEq>(comparer: Option<&Arc<Comparer<T>>>, a: &T, b: &T) -> bool {
    match comparer {
        Some(cmp) => cmp(a, b),
        None => a == b,
    }
}

enum LoadState<T> {
    Present(T),
    Absent,
    Error(Error),
}

impl<T: Clone> Clone for LoadState<T> {
    fn clone(&self) -> Self {
        match self {
            LoadState::Present(v) => LoadState::Present(v.clone()),
            LoadState::Absent => LoadState::Absent,
            LoadState::Error(e) => LoadState::Error(e.clone()),
        }
    }
}

/// Outcome of loading a persisted value
///
/// Exactly one of three states holds:
///
/// - `Present(value)`: the value was read successfully
/// - `Absent`: nothing is persisted (not an error)
/// - `Error`: reading failed; the failure is carried inside the result
///
/// A result also carries the [`CorrelationTag`] of the update that produced
/// it and the producing provider's comparer, which drives [`PartialEq`] and
/// change detection during transactions.
pub struct LoadResult<T> {
    state: LoadState<T>,
    correlation_tag: Option<CorrelationTag>,
    comparer: Option<Arc<Comparer<T>>>,
}

impl<T> LoadResult<T> {
    /// A result carrying a value
    pub fn present(value: T) -> Self {
        LoadResult {
            state: LoadState::Present(value),
            correlation_tag: None,
            comparer: None,
        }
    }

    /// A result for a value that is not persisted
    pub fn absent() -> Self {
        LoadResult {
            state: LoadState::Absent,
            correlation_tag: None,
            comparer: None,
        }
    }

    /// A result capturing a load failure
    pub fn error(error: Error) -> Self {
        LoadResult {
            state: LoadState::Error(error),
            correlation_tag: None,
            comparer: None,
        }
    }

    /// Attach a correlation tag
    #[must_use]
    pub fn with_correlation_tag(mut self, tag: Option<CorrelationTag>) -> Self {
        self.correlation_tag = tag;
        self
    }

    /// Attach the producing provider's comparer
    #[must_use]
    pub fn with_comparer(mut self, comparer: Option<Arc<Comparer<T>>>) -> Self {
        self.comparer = comparer;
        self
    }

    /// True when a value was read
    pub fn is_present(&self) -> bool {
        matches!(self.state, LoadState::Present(_))
    }

    /// True when nothing is persisted
    pub fn is_absent(&self) -> bool {
        matches!(self.state, LoadState::Absent)
    }

    /// True when the load failed
    pub fn is_error(&self) -> bool {
        matches!(self.state, LoadState::Error(_))
    }

    /// The value, when present
    pub fn value(&self) -> Option<&T> {
        match &self.state {
            LoadState::Present(v) => Some(v),
            _ => None,
        }
    }

    /// The captured failure, when the load failed
    pub fn captured_error(&self) -> Option<&Error> {
        match &self.state {
            LoadState::Error(e) => Some(e),
            _ => None,
        }
    }

    /// The correlation tag of the update that produced this result
    pub fn correlation_tag(&self) -> Option<&CorrelationTag> {
        self.correlation_tag.as_ref()
    }

    /// The producing provider's comparer
    pub fn comparer(&self) -> Option<&Arc<Comparer<T>>> {
        self.comparer.as_ref()
    }

    /// Consume the result, returning the value when present
    pub fn into_value(self) -> Option<T> {
        match self.state {
            LoadState::Present(v) => Some(v),
            _ => None,
        }
    }
}

impl<T: Clone> Clone for LoadResult<T> {
    fn clone(&self) -> Self {
        LoadResult {
            state: self.state.clone(),
            correlation_tag: self.correlation_tag.clone(),
            comparer: self.comparer.clone(),
        }
    }
}

/// Equality compares presence, error-ness, and, when both are present,
/// the values under the carried comparer. Error identity is deliberately
/// not part of equality.
impl<T: PartialEq> PartialEq for LoadResult<T> {
    fn eq(&self, other: &Self) -> bool {
        if self.is_error() != other.is_error() {
            return false;
        }
        match (self.value(), other.value()) {
            (Some(a), Some(b)) => {
                let comparer = self.comparer.as_ref().or(other.comparer.as_ref());
                values_equal(comparer, a, b)
            }
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for LoadResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            LoadState::Present(v) => f.debug_tuple("LoadResult::Present").field(v).finish(),
            LoadState::Absent => f.write_str("LoadResult::Absent"),
            LoadState::Error(e) => f.debug_tuple("LoadResult::Error").field(e).finish(),
        }
    }
}

/// Outcome of a transactional update
///
/// `previous` is the snapshot handed to the transaction callback; `updated`
/// is the state the update left behind. When nothing was written
/// (`is_updated == false`), `updated` is a clone of `previous`, or, for a
/// failed update, an `Error` result capturing the failure.
pub struct UpdateResult<T> {
    is_updated: bool,
    previous: LoadResult<T>,
    updated: LoadResult<T>,
}

impl<T: Clone> UpdateResult<T> {
    /// An update that left the persisted state untouched
    pub fn unchanged(read: LoadResult<T>) -> Self {
        UpdateResult {
            is_updated: false,
            updated: read.clone(),
            previous: read,
        }
    }

    /// A committed update
    pub fn committed(previous: LoadResult<T>, updated: LoadResult<T>) -> Self {
        UpdateResult {
            is_updated: true,
            previous,
            updated,
        }
    }

    /// Reassemble a result from its parts
    ///
    /// Decorators use this to re-map the halves of an inner result while
    /// keeping its `is_updated` verdict.
    pub fn from_parts(is_updated: bool, previous: LoadResult<T>, updated: LoadResult<T>) -> Self {
        UpdateResult {
            is_updated,
            previous,
            updated,
        }
    }

    /// An update that failed; the failure is surfaced on `updated`
    pub fn failed(previous: LoadResult<T>, error: Error) -> Self {
        let tag = previous.correlation_tag().cloned();
        UpdateResult {
            is_updated: false,
            updated: LoadResult::error(error).with_correlation_tag(tag),
            previous,
        }
    }
}

impl<T> UpdateResult<T> {
    /// True when the persisted state changed
    pub fn is_updated(&self) -> bool {
        self.is_updated
    }

    /// The snapshot read before the update
    pub fn previous(&self) -> &LoadResult<T> {
        &self.previous
    }

    /// The state after the update
    pub fn updated(&self) -> &LoadResult<T> {
        &self.updated
    }

    /// Split into the previous and updated halves
    pub fn into_parts(self) -> (bool, LoadResult<T>, LoadResult<T>) {
        (self.is_updated, self.previous, self.updated)
    }
}

impl<T: Clone> Clone for UpdateResult<T> {
    fn clone(&self) -> Self {
        UpdateResult {
            is_updated: self.is_updated,
            previous: self.previous.clone(),
            updated: self.updated.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for UpdateResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateResult")
            .field("is_updated", &self.is_updated)
            .field("previous", &self.previous)
            .field("updated", &self.updated)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_result_states() {
        let present = LoadResult::present(7);
        assert!(present.is_present());
        assert!(!present.is_absent());
        assert_eq!(present.value(), Some(&7));

        let absent = LoadResult::<i32>::absent();
        assert!(absent.is_absent());
        assert_eq!(absent.value(), None);

        let error = LoadResult::<i32>::error(Error::deserialization("bad bytes"));
        assert!(error.is_error());
        assert!(error.captured_error().is_some());
        assert_eq!(error.value(), None);
    }

    #[test]
    fn test_load_result_equality_ignores_error_identity() {
        let a = LoadResult::<i32>::error(Error::deserialization("one"));
        let b = LoadResult::<i32>::error(Error::callback("another"));
        assert_eq!(a, b);
        assert_ne!(a, LoadResult::<i32>::absent());
    }

    #[test]
    fn test_load_result_equality_uses_comparer() {
        let comparer: Arc<Comparer<String>> =
            Arc::new(|a: &String, b: &String| a.eq_ignore_ascii_case(b));
        let a = LoadResult::present("Hello".to_string()).with_comparer(Some(comparer));
        let b = LoadResult::present("hello".to_string());
        assert_eq!(a, b);
    }

    #[test]
    fn test_load_result_tag_not_part_of_equality() {
        let tag: CorrelationTag = Arc::new("tag");
        let a = LoadResult::present(1).with_correlation_tag(Some(tag));
        let b = LoadResult::present(1);
        assert_eq!(a, b);
    }

    #[test]
    fn test_update_result_unchanged_mirrors_previous() {
        let read = LoadResult::present(5);
        let result = UpdateResult::unchanged(read);
        assert!(!result.is_updated());
        assert_eq!(result.previous(), result.updated());
    }

    #[test]
    fn test_update_result_failed_carries_error() {
        let read = LoadResult::present(5);
        let result = UpdateResult::failed(read, Error::serialization("no space"));
        assert!(!result.is_updated());
        assert!(result.updated().is_error());
        assert!(result.previous().is_present());
    }
}

//! Thread-safe collection of per-item outcomes and the aggregate error view.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::types::{BatchResult, BatchSummary};

/// One failed item
#[derive(Debug)]
pub struct BatchError<E> {
    /// Position of the item in the input collection
    pub index: usize,
    /// Diagnostic label of the item
    pub item_label: String,
    /// Error returned by the processor
    pub cause: Arc<E>,
}

impl<E> Clone for BatchError<E> {
    fn clone(&self) -> Self {
        Self {
            index: self.index,
            item_label: self.item_label.clone(),
            cause: Arc::clone(&self.cause),
        }
    }
}

impl<E: fmt::Display> fmt::Display for BatchError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item {} ({}): {}", self.index, self.item_label, self.cause)
    }
}

impl<E> std::error::Error for BatchError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.cause.as_ref())
    }
}

/// Every failure of a batch, rendered as a single report
#[derive(Debug)]
pub struct BatchErrors<E> {
    errors: Vec<BatchError<E>>,
}

impl<E> Clone for BatchErrors<E> {
    fn clone(&self) -> Self {
        Self {
            errors: self.errors.clone(),
        }
    }
}

impl<E> Default for BatchErrors<E> {
    fn default() -> Self {
        Self { errors: Vec::new() }
    }
}

impl<E> BatchErrors<E> {
    /// Create an empty error collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any error was collected
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Number of errors
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Whether the collection is empty
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Iterate over the collected errors
    pub fn iter(&self) -> std::slice::Iter<'_, BatchError<E>> {
        self.errors.iter()
    }

    /// `Ok(())` when empty, otherwise the collection itself as the error
    pub fn into_result(self) -> Result<(), Self> {
        if self.has_errors() {
            Err(self)
        } else {
            Ok(())
        }
    }
}

impl<E> From<Vec<BatchError<E>>> for BatchErrors<E> {
    fn from(errors: Vec<BatchError<E>>) -> Self {
        Self { errors }
    }
}

impl<E> IntoIterator for BatchErrors<E> {
    type Item = BatchError<E>;
    type IntoIter = std::vec::IntoIter<BatchError<E>>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

impl<'a, E> IntoIterator for &'a BatchErrors<E> {
    type Item = &'a BatchError<E>;
    type IntoIter = std::slice::Iter<'a, BatchError<E>>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

impl<E: fmt::Display> fmt::Display for BatchErrors<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.as_slice() {
            [] => f.write_str("no errors"),
            [single] => write!(f, "{}", single),
            errors => {
                write!(f, "{} errors occurred:", errors.len())?;
                for err in errors {
                    write!(f, "\n  - {}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl<E> std::error::Error for BatchErrors<E> where E: fmt::Debug + fmt::Display {}

/// Outcomes of a batch in arrival order.
///
/// `add` may be called concurrently from any number of workers; each call
/// holds the lock only for the push.
#[derive(Debug)]
pub struct BatchResults<O, E> {
    results: Mutex<Vec<Arc<BatchResult<O, E>>>>,
}

impl<O, E> Default for BatchResults<O, E> {
    fn default() -> Self {
        Self {
            results: Mutex::new(Vec::new()),
        }
    }
}

impl<O, E> BatchResults<O, E> {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty collection sized for `capacity` results
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            results: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    /// Record the outcome of one item
    pub fn add(
        &self,
        index: usize,
        item_label: impl Into<String>,
        outcome: Result<O, E>,
        duration: Duration,
    ) {
        let result = Arc::new(BatchResult::new(index, item_label.into(), outcome, duration));
        self.results.lock().push(result);
    }

    /// Number of recorded results
    pub fn len(&self) -> usize {
        self.results.lock().len()
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.results.lock().is_empty()
    }

    /// All results in arrival order
    pub fn results(&self) -> Vec<Arc<BatchResult<O, E>>> {
        self.results.lock().clone()
    }

    /// All results ordered by input position
    pub fn sorted_by_index(&self) -> Vec<Arc<BatchResult<O, E>>> {
        let mut results = self.results();
        results.sort_by_key(|r| r.index);
        results
    }

    /// Results without an error, in arrival order
    pub fn successful(&self) -> Vec<Arc<BatchResult<O, E>>> {
        self.filtered(BatchResult::is_success)
    }

    /// Results with an error, in arrival order
    pub fn failed(&self) -> Vec<Arc<BatchResult<O, E>>> {
        self.filtered(BatchResult::is_failure)
    }

    /// Whether any recorded result failed
    pub fn has_errors(&self) -> bool {
        self.results.lock().iter().any(|r| r.is_failure())
    }

    /// Snapshot of every failure recorded so far
    pub fn errors(&self) -> BatchErrors<E> {
        self.results
            .lock()
            .iter()
            .filter_map(|r| {
                r.error.as_ref().map(|cause| BatchError {
                    index: r.index,
                    item_label: r.item_label.clone(),
                    cause: Arc::clone(cause),
                })
            })
            .collect::<Vec<_>>()
            .into()
    }

    /// Statistics for a batch over `total_items` inputs that took `elapsed`
    pub fn summary(&self, total_items: usize, elapsed: Duration) -> BatchSummary {
        let results = self.results.lock();
        let failed = results.iter().filter(|r| r.is_failure()).count();

        BatchSummary {
            total_items,
            dispatched: results.len(),
            succeeded: results.len() - failed,
            failed,
            skipped: total_items.saturating_sub(results.len()),
            elapsed,
        }
    }

    /// Move every recorded result into a fresh collection
    pub(crate) fn take(&self) -> Self {
        Self {
            results: Mutex::new(std::mem::take(&mut *self.results.lock())),
        }
    }

    fn filtered(&self, keep: fn(&BatchResult<O, E>) -> bool) -> Vec<Arc<BatchResult<O, E>>> {
        self.results
            .lock()
            .iter()
            .filter(|r| keep(r))
            .cloned()
            .collect()
    }
}

//! Batch Executor Implementation
//!
//! Fans one processor out over every item of a collection:
//! - Concurrency bounded by a counting semaphore
//! - Continue-on-error or stop-on-first-error dispatch policy
//! - Cooperative cancellation through a child [`CancellationToken`]
//! - Every dispatched worker is joined before results are returned

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::results::{BatchErrors, BatchResults};
use super::types::{BatchConfig, ProgressCallback};
use crate::EngineError;

/// Function producing a diagnostic label for an item
pub type LabelFn<I> = Arc<dyn Fn(&I) -> String + Send + Sync>;

/// Remembers the first recorded failure and trips the stop signal.
///
/// Guarded separately from the result list so the dispatch loop never
/// waits on result insertion.
struct FailureLatch {
    first_failure: Mutex<Option<usize>>,
    token: CancellationToken,
    continue_on_error: bool,
}

impl FailureLatch {
    fn new(token: CancellationToken, continue_on_error: bool) -> Self {
        Self {
            first_failure: Mutex::new(None),
            token,
            continue_on_error,
        }
    }

    fn record(&self, index: usize) {
        let mut slot = self.first_failure.lock();
        if slot.is_none() {
            *slot = Some(index);
            if !self.continue_on_error {
                self.token.cancel();
            }
        }
    }

    fn should_stop(&self) -> bool {
        !self.continue_on_error && self.first_failure.lock().is_some()
    }

    fn first_failure(&self) -> Option<usize> {
        *self.first_failure.lock()
    }
}

/// Batch executor applying one processor to every item of a collection
pub struct BatchExecutor<I> {
    config: BatchConfig,
    label_fn: Option<LabelFn<I>>,
    progress_callback: Option<ProgressCallback>,
}

impl<I> fmt::Debug for BatchExecutor<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchExecutor")
            .field("config", &self.config)
            .field("label_fn", &self.label_fn.is_some())
            .field("progress_callback", &self.progress_callback.is_some())
            .finish()
    }
}

impl<I> Default for BatchExecutor<I> {
    fn default() -> Self {
        Self::new(BatchConfig::default())
    }
}

impl<I> BatchExecutor<I> {
    /// Create a new batch executor
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config,
            label_fn: None,
            progress_callback: None,
        }
    }

    /// Set the item label function used in results and error messages
    pub fn with_label<F>(mut self, label_fn: F) -> Self
    where
        F: Fn(&I) -> String + Send + Sync + 'static,
    {
        self.label_fn = Some(Arc::new(label_fn));
        self
    }

    /// Set progress callback, called with `(completed, total)` after each result
    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    /// Configuration this executor runs with
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }
}

impl<I: Send + 'static> BatchExecutor<I> {
    /// Run `processor` over every item.
    ///
    /// The processor receives a token derived from `parent`; it is cancelled
    /// when `parent` is, and on the first failure under stop-on-error.
    /// In-flight processors are never aborted, only awaited. Items that were
    /// never dispatched have no entry in the returned results.
    #[instrument(skip(self, parent, items, processor), fields(item_count = items.len()))]
    pub async fn execute<O, E, F, Fut>(
        &self,
        parent: &CancellationToken,
        items: Vec<I>,
        processor: F,
    ) -> BatchResults<O, E>
    where
        O: Send + Sync + 'static,
        E: fmt::Display + Send + Sync + 'static,
        F: Fn(CancellationToken, usize, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, E>> + Send + 'static,
    {
        if items.is_empty() {
            debug!("No items to process in batch");
            return BatchResults::new();
        }

        let batch_start = Instant::now();
        let total_items = items.len();
        let concurrency = self.config.effective_concurrency(total_items);

        info!(
            total_items,
            concurrency,
            continue_on_error = self.config.continue_on_error,
            "Starting batch execution"
        );

        let token = parent.child_token();
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let latch = Arc::new(FailureLatch::new(
            token.clone(),
            self.config.continue_on_error,
        ));
        let results = Arc::new(BatchResults::with_capacity(total_items));
        let completed = Arc::new(AtomicUsize::new(0));
        let processor = Arc::new(processor);

        let mut workers = JoinSet::new();
        let mut dispatched = 0usize;

        for (index, item) in items.into_iter().enumerate() {
            if token.is_cancelled() {
                debug!(index, "Batch cancelled, stopping dispatch");
                break;
            }
            if latch.should_stop() {
                debug!(index, "Earlier item failed, stopping dispatch");
                break;
            }

            let permit = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(index, "Batch cancelled while waiting for a slot");
                    break;
                }
                acquired = Arc::clone(&semaphore).acquire_owned() => match acquired {
                    Ok(permit) => permit,
                    Err(err) => {
                        error!(index, error = %err, "Concurrency semaphore closed");
                        break;
                    }
                },
            };

            dispatched += 1;
            debug!(index, dispatched, "Dispatching batch item");

            let worker_token = token.clone();
            let label_fn = self.label_fn.clone();
            let processor = Arc::clone(&processor);
            let results = Arc::clone(&results);
            let latch = Arc::clone(&latch);
            let completed = Arc::clone(&completed);
            let progress = self.progress_callback.clone();

            workers.spawn(async move {
                let _permit = permit;

                let item_label = label_fn.map(|label| label(&item)).unwrap_or_default();
                let started = Instant::now();
                let outcome = (*processor)(worker_token, index, item).await;
                let duration = started.elapsed();

                let failed = match &outcome {
                    Ok(_) => {
                        debug!(
                            index,
                            item = %item_label,
                            duration_ms = duration.as_millis(),
                            "Batch item completed"
                        );
                        false
                    }
                    Err(err) => {
                        warn!(
                            index,
                            item = %item_label,
                            duration_ms = duration.as_millis(),
                            error = %err,
                            "Batch item failed"
                        );
                        true
                    }
                };

                results.add(index, item_label, outcome, duration);
                if failed {
                    latch.record(index);
                }

                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(callback) = progress {
                    callback(done, total_items);
                }
            });
        }

        let mut panicked = None;
        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                if err.is_panic() {
                    panicked.get_or_insert(err.into_panic());
                } else {
                    error!(error = %err, "Batch worker did not complete");
                }
            }
        }
        token.cancel();

        if let Some(payload) = panicked {
            std::panic::resume_unwind(payload);
        }

        let results = Arc::try_unwrap(results).unwrap_or_else(|shared| shared.take());
        let summary = results.summary(total_items, batch_start.elapsed());

        if summary.skipped > 0 {
            warn!(
                skipped = summary.skipped,
                first_failure = ?latch.first_failure(),
                parent_cancelled = parent.is_cancelled(),
                "Batch stopped dispatching early"
            );
        }

        info!(
            total_items,
            dispatched = summary.dispatched,
            succeeded = summary.succeeded,
            failed = summary.failed,
            success_rate = format!("{:.2}%", summary.success_rate()),
            elapsed_ms = summary.elapsed.as_millis(),
            "Batch execution completed"
        );

        results
    }
}

/// Run `processor` over `items` with an explicit configuration and label function
pub async fn execute_batch<I, O, E, L, F, Fut>(
    parent: &CancellationToken,
    items: Vec<I>,
    label_fn: Option<L>,
    processor: F,
    config: BatchConfig,
) -> BatchResults<O, E>
where
    I: Send + 'static,
    O: Send + Sync + 'static,
    E: fmt::Display + Send + Sync + 'static,
    L: Fn(&I) -> String + Send + Sync + 'static,
    F: Fn(CancellationToken, usize, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
{
    let mut executor = BatchExecutor::new(config);
    if let Some(label_fn) = label_fn {
        executor = executor.with_label(label_fn);
    }
    executor.execute(parent, items, processor).await
}

/// Run `processor` over `items` with [`BatchConfig::default`] and no labels
pub async fn execute_batch_default<I, O, E, F, Fut>(
    parent: &CancellationToken,
    items: Vec<I>,
    processor: F,
) -> BatchResults<O, E>
where
    I: Send + 'static,
    O: Send + Sync + 'static,
    E: fmt::Display + Send + Sync + 'static,
    F: Fn(CancellationToken, usize, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
{
    BatchExecutor::default()
        .execute(parent, items, processor)
        .await
}

/// Run a side-effect-only processor over `items` and keep only the failures
pub async fn execute_batch_void<I, E, L, F, Fut>(
    parent: &CancellationToken,
    items: Vec<I>,
    label_fn: Option<L>,
    processor: F,
    config: BatchConfig,
) -> BatchErrors<E>
where
    I: Send + 'static,
    E: fmt::Display + Send + Sync + 'static,
    L: Fn(&I) -> String + Send + Sync + 'static,
    F: Fn(CancellationToken, usize, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
{
    execute_batch(parent, items, label_fn, processor, config)
        .await
        .errors()
}

/// Drive `fut` until it finishes or `token` is cancelled, whichever is first.
///
/// Cancellation yields [`EngineError::Cancelled`] converted into the
/// processor's error type.
pub async fn run_cancellable<T, E, Fut>(token: &CancellationToken, fut: Fut) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
    E: From<EngineError>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(EngineError::Cancelled.into()),
        outcome = fut => outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_batch_executor_creation() {
        let executor: BatchExecutor<String> = BatchExecutor::default();
        assert_eq!(*executor.config(), BatchConfig::default());
        assert!(executor.label_fn.is_none());
        assert!(executor.progress_callback.is_none());
    }

    #[test]
    fn test_batch_executor_configuration() {
        let executor: BatchExecutor<String> =
            BatchExecutor::new(BatchConfig::default().with_max_concurrency(4).stop_on_error())
                .with_label(|item: &String| item.to_uppercase())
                .with_progress_callback(|_, _| {});

        assert_eq!(executor.config().max_concurrency, 4);
        assert!(!executor.config().continue_on_error);
        assert!(executor.label_fn.is_some());
        assert!(format!("{:?}", executor).contains("label_fn: true"));
    }

    #[test]
    fn test_failure_latch_keeps_first() {
        let token = CancellationToken::new();
        let latch = FailureLatch::new(token.clone(), true);
        assert!(!latch.should_stop());

        latch.record(3);
        latch.record(1);
        assert_eq!(latch.first_failure(), Some(3));
        assert!(!latch.should_stop());
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_failure_latch_stop_on_error_cancels() {
        let token = CancellationToken::new();
        let latch = FailureLatch::new(token.clone(), false);

        latch.record(2);
        assert!(latch.should_stop());
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_sequential_when_concurrency_is_one() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&order);

        let results = BatchExecutor::new(BatchConfig::default().with_max_concurrency(1))
            .execute(
                &CancellationToken::new(),
                vec![10u64, 1, 5],
                move |_token, index, delay| {
                    let seen = Arc::clone(&seen);
                    async move {
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        seen.lock().push(index);
                        Ok::<_, EngineError>(index)
                    }
                },
            )
            .await;

        assert_eq!(*order.lock(), vec![0, 1, 2]);
        let arrival: Vec<usize> = results.results().iter().map(|r| r.index).collect();
        assert_eq!(arrival, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_labels_applied() {
        let results = BatchExecutor::new(BatchConfig::default())
            .with_label(|item: &String| format!("entity:{}", item))
            .execute(
                &CancellationToken::new(),
                vec!["a".to_string(), "b".to_string()],
                |_token, _index, item| async move {
                    if item == "b" {
                        Err(EngineError::processing("unavailable"))
                    } else {
                        Ok(())
                    }
                },
            )
            .await;

        assert_eq!(results.errors().to_string(), "item 1 (entity:b): unavailable");
        assert_eq!(results.successful()[0].item_label, "entity:a");
    }

    #[tokio::test]
    async fn test_run_cancellable() {
        let token = CancellationToken::new();
        let done: Result<u8, EngineError> = run_cancellable(&token, async { Ok(7) }).await;
        assert_eq!(done, Ok(7));

        token.cancel();
        let cancelled: Result<u8, EngineError> = run_cancellable(&token, async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(1)
        })
        .await;
        assert_eq!(cancelled, Err(EngineError::Cancelled));
    }

    #[tokio::test]
    async fn test_child_token_cancelled_after_batch() {
        let captured = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&captured);
        let parent = CancellationToken::new();

        let _ = execute_batch_default(&parent, vec![()], move |token, _, _| {
            *slot.lock() = Some(token);
            async { Ok::<_, EngineError>(()) }
        })
        .await;

        let token = captured.lock().take().unwrap();
        assert!(token.is_cancelled());
        assert!(!parent.is_cancelled());
    }
}

//! Cooperative cancellation through the caller's token

use batch_engine::batch::{execute_batch_default, run_cancellable, BatchConfig, BatchExecutor};
use batch_engine::utils::logging::init_test_tracing;
use batch_engine::EngineError;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parent_cancellation_stops_dispatch() {
    init_test_tracing();

    let parent = CancellationToken::new();
    let canceller = parent.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let start = Instant::now();
    let results = BatchExecutor::new(BatchConfig::default().with_max_concurrency(2))
        .execute(&parent, (0..10).collect::<Vec<u32>>(), |token, _index, item| async move {
            run_cancellable(&token, async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, EngineError>(item)
            })
            .await
        })
        .await;
    let elapsed = start.elapsed();

    assert!(results.len() < 10, "got {} results", results.len());
    assert!(!results.is_empty());
    assert!(elapsed < Duration::from_secs(1), "batch hung for {:?}", elapsed);

    for failed in results.failed() {
        let cause = failed.error.as_ref().expect("failed result carries an error");
        assert!(cause.is_cancelled());
    }
}

#[tokio::test]
async fn test_already_cancelled_parent_dispatches_nothing() {
    let parent = CancellationToken::new();
    parent.cancel();

    let results = execute_batch_default(&parent, vec!["a", "b", "c"], |_token, _index, _item| async {
        Ok::<_, EngineError>(())
    })
    .await;

    assert!(results.is_empty());
    assert_eq!(results.summary(3, Duration::ZERO).skipped, 3);
}

#[tokio::test]
async fn test_processor_ignoring_cancellation_still_recorded() {
    let parent = CancellationToken::new();
    let canceller = parent.clone();

    let results = BatchExecutor::new(BatchConfig::default().with_max_concurrency(2))
        .execute(&parent, (0..5).collect::<Vec<u32>>(), move |_token, index, _item| {
            let canceller = canceller.clone();
            async move {
                if index == 0 {
                    canceller.cancel();
                }
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok::<_, EngineError>(index)
            }
        })
        .await;

    assert_eq!(results.len(), 2, "both in-flight items finish and are recorded");
    assert!(!results.has_errors());
}

#[tokio::test]
async fn test_processor_token_is_child_of_parent() {
    let parent = CancellationToken::new();
    let observer = parent.clone();

    let results = execute_batch_default(&parent, vec![()], move |token, _index, _item| {
        let observer = observer.clone();
        async move {
            observer.cancel();
            token.cancelled().await;
            Err::<(), _>(EngineError::Cancelled)
        }
    })
    .await;

    assert_eq!(results.len(), 1);
    assert_eq!(results.errors().to_string(), "item 0 (): operation cancelled");
}

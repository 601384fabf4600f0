//! Concurrency properties of the counter store
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use mlogtail_stats::{CounterName, CounterStore};

const TASKS: u64 = 16;
const PER_TASK: u64 = 5_000;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_increments_sum_exactly() {
    let store = Arc::new(CounterStore::new());

    let handles: Vec<_> = (0..TASKS)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                for _ in 0..PER_TASK {
                    store.increment(CounterName::Received, 1);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(store.value(CounterName::Received), TASKS * PER_TASK);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_resets_during_increments_neither_lose_nor_double_count() {
    let store = Arc::new(CounterStore::new());

    let writers: Vec<_> = (0..TASKS)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                for i in 0..PER_TASK {
                    store.increment(CounterName::Delivered, 1);
                    if i % 500 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            })
        })
        .collect();

    let resetter = {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            let mut drained = 0;
            for _ in 0..200 {
                drained += store.reset_all().get(CounterName::Delivered);
                tokio::task::yield_now().await;
            }
            drained
        })
    };

    for writer in writers {
        writer.await.unwrap();
    }
    let drained = resetter.await.unwrap();

    assert_eq!(
        drained + store.value(CounterName::Delivered),
        TASKS * PER_TASK
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_snapshot_never_sees_half_applied_outcome() {
    use mlogtail_stats::Outcome;

    let store = Arc::new(CounterStore::new());
    let outcome = Outcome {
        counter: CounterName::Received,
        size: Some((CounterName::BytesReceived, 10)),
    };

    let writer = {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            for _ in 0..PER_TASK {
                store.apply(&outcome);
            }
        })
    };

    let reader = {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            for _ in 0..PER_TASK {
                let snapshot = store.snapshot();
                assert_eq!(
                    snapshot[CounterName::BytesReceived],
                    snapshot[CounterName::Received] * 10
                );
                tokio::task::yield_now().await;
            }
        })
    };

    writer.await.unwrap();
    reader.await.unwrap();
}

//! Bounded-concurrency batch writes.
//!
//! Batch operations run their per-item futures through a concurrency
//! ceiling of [`MAX_CONCURRENT_OPERATIONS`]. Items are independent:
//! failures are captured per item and never abort the batch, and neither
//! execution order nor the order of the result slices is guaranteed —
//! `index` preserves the original position.

use futures::StreamExt;
use futures::stream;
use mnema_core::{MemoryError, Result};

/// Concurrency ceiling for per-item batch operations.
pub const MAX_CONCURRENT_OPERATIONS: usize = 10;

/// A successfully applied batch item.
#[derive(Debug, Clone)]
pub struct BatchSuccess {
    /// Position of the item in the input.
    pub index: usize,
    /// Affected memory id, when the operation produced or targeted one.
    pub id: Option<i64>,
    /// Content written, for add and update items.
    pub content: Option<String>,
}

/// A failed batch item.
#[derive(Debug)]
pub struct BatchFailure {
    /// Position of the item in the input.
    pub index: usize,
    /// Targeted memory id, when known.
    pub id: Option<i64>,
    /// Content attempted, for add and update items.
    pub content: Option<String>,
    /// What went wrong.
    pub error: MemoryError,
}

/// Aggregate outcome of a batch operation.
///
/// `total == success_count + failure_count` always holds, and the union of
/// success and failure indexes covers the whole input.
#[derive(Debug, Default)]
pub struct BatchResult {
    /// Number of items submitted.
    pub total: usize,
    /// Number of items applied.
    pub success_count: usize,
    /// Number of items that failed (including cancelled items).
    pub failure_count: usize,
    /// Applied items, in completion order.
    pub succeeded: Vec<BatchSuccess>,
    /// Failed items, in completion order.
    pub failed: Vec<BatchFailure>,
}

/// Outcome of one batch item before aggregation.
pub(crate) struct ItemOutcome {
    pub(crate) index: usize,
    pub(crate) id: Option<i64>,
    pub(crate) content: Option<String>,
    pub(crate) result: Result<()>,
}

/// Runs item futures with the batch concurrency ceiling and aggregates
/// outcomes.
pub(crate) async fn run_items<F>(items: Vec<F>) -> BatchResult
where
    F: Future<Output = ItemOutcome>,
{
    let total = items.len();
    let outcomes: Vec<ItemOutcome> = stream::iter(items)
        .buffer_unordered(MAX_CONCURRENT_OPERATIONS)
        .collect()
        .await;

    let mut result = BatchResult {
        total,
        ..BatchResult::default()
    };
    for outcome in outcomes {
        match outcome.result {
            Ok(()) => {
                result.success_count += 1;
                result.succeeded.push(BatchSuccess {
                    index: outcome.index,
                    id: outcome.id,
                    content: outcome.content,
                });
            }
            Err(error) => {
                result.failure_count += 1;
                result.failed.push(BatchFailure {
                    index: outcome.index,
                    id: outcome.id,
                    content: outcome.content,
                    error,
                });
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn aggregates_successes_and_failures() {
        let items: Vec<_> = (0..10)
            .map(|index| async move {
                ItemOutcome {
                    index,
                    id: Some(index as i64),
                    content: None,
                    result: if index % 3 == 0 {
                        Err(MemoryError::storage("batch_add", "boom"))
                    } else {
                        Ok(())
                    },
                }
            })
            .collect();

        let result = run_items(items).await;
        assert_eq!(result.total, 10);
        assert_eq!(result.success_count + result.failure_count, 10);
        assert_eq!(result.failure_count, 4);

        let mut indexes: Vec<usize> = result
            .succeeded
            .iter()
            .map(|s| s.index)
            .chain(result.failed.iter().map(|f| f.index))
            .collect();
        indexes.sort_unstable();
        assert_eq!(indexes, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_the_ceiling() {
        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let items: Vec<_> = (0..100)
            .map(|index| {
                let live = Arc::clone(&live);
                let peak = Arc::clone(&peak);
                async move {
                    let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
                    live.fetch_sub(1, Ordering::SeqCst);
                    ItemOutcome {
                        index,
                        id: None,
                        content: None,
                        result: Ok(()),
                    }
                }
            })
            .collect();

        let result = run_items(items).await;
        assert_eq!(result.total, 100);
        assert_eq!(result.success_count, 100);
        assert!(peak.load(Ordering::SeqCst) <= MAX_CONCURRENT_OPERATIONS);
    }
}

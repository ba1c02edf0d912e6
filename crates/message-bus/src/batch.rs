//! Batch dispatcher - admission-controlled fan-out
//!
//! Runs many independent per-item futures under a concurrency cap. A new
//! item is admitted only when a slot frees up (a race on the executing set,
//! not first-in-first-out). Each outcome is captured independently; a
//! single failure never aborts the batch.
//!
//! Cancellation is cooperative: setting the flag skips every item that has
//! not yet started, while items already running continue to completion.
//! Tearing down their in-flight worker processes is the caller's job, via
//! the controller's live operation-id set and `WorkerSupervisor::abort`.

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Mutex;
use tracing::debug;

use sdv_core::OperationError;

/// Outcome of one batch item, reported in input order
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome<T> {
    Fulfilled(T),
    Rejected(OperationError),
    /// The cancellation flag was set before the item started
    Skipped,
}

impl<T> BatchOutcome<T> {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Self::Fulfilled(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}

/// Shared cancellation flag and live operation-id set for one batch
#[derive(Clone, Default)]
pub struct BatchController {
    cancelled: Arc<AtomicBool>,
    operations: Arc<Mutex<HashSet<String>>>,
}

impl BatchController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop admitting new items; in-flight items run to completion
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Track the operation id of an external request this batch started
    pub async fn register_operation(&self, operation_id: impl Into<String>) {
        self.operations.lock().await.insert(operation_id.into());
    }

    pub async fn clear_operation(&self, operation_id: &str) {
        self.operations.lock().await.remove(operation_id);
    }

    /// Operation ids the caller must abort individually to interrupt
    /// items that are already past the cancellation check
    pub async fn active_operations(&self) -> Vec<String> {
        self.operations.lock().await.iter().cloned().collect()
    }
}

/// Run `per_item` over every item with at most `concurrency_limit` in
/// flight; outcomes come back in input order
pub async fn run_batch<I, T, F, Fut>(
    items: Vec<I>,
    concurrency_limit: usize,
    controller: &BatchController,
    per_item: F,
) -> Vec<BatchOutcome<T>>
where
    F: Fn(I, BatchController) -> Fut,
    Fut: Future<Output = Result<T, OperationError>>,
{
    let limit = concurrency_limit.max(1);
    let total = items.len();
    let mut executing = FuturesUnordered::new();
    let mut finished: Vec<(usize, BatchOutcome<T>)> = Vec::with_capacity(total);

    for (index, item) in items.into_iter().enumerate() {
        // Admission control: wait for any one slot, not the oldest
        while executing.len() >= limit {
            if let Some(done) = executing.next().await {
                finished.push(done);
            }
        }

        if controller.is_cancelled() {
            debug!(index, "batch cancelled, skipping item");
            finished.push((index, BatchOutcome::Skipped));
            continue;
        }

        let future = per_item(item, controller.clone());
        executing.push(async move {
            match future.await {
                Ok(value) => (index, BatchOutcome::Fulfilled(value)),
                Err(error) => (index, BatchOutcome::Rejected(error)),
            }
        });
    }

    while let Some(done) = executing.next().await {
        finished.push(done);
    }

    finished.sort_by_key(|(index, _)| *index);
    finished.into_iter().map(|(_, outcome)| outcome).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn concurrency_never_exceeds_the_limit() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let controller = BatchController::new();

        let items: Vec<usize> = (0..12).collect();
        let outcomes = run_batch(items, 5, &controller, |item, _ctl| {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok::<usize, OperationError>(item * 2)
            }
        })
        .await;

        assert!(peak.load(Ordering::SeqCst) <= 5);
        assert_eq!(outcomes.len(), 12);
        // Input order is preserved regardless of completion order
        for (index, outcome) in outcomes.iter().enumerate() {
            assert_eq!(*outcome, BatchOutcome::Fulfilled(index * 2));
        }
    }

    #[tokio::test]
    async fn one_failure_never_aborts_the_batch() {
        let controller = BatchController::new();
        let outcomes = run_batch(vec![1, 2, 3], 2, &controller, |item, _ctl| async move {
            if item == 2 {
                Err(OperationError::generic("item 2 failed"))
            } else {
                Ok(item)
            }
        })
        .await;

        assert_eq!(outcomes[0], BatchOutcome::Fulfilled(1));
        assert!(matches!(&outcomes[1], BatchOutcome::Rejected(e) if e.message == "item 2 failed"));
        assert_eq!(outcomes[2], BatchOutcome::Fulfilled(3));
    }

    #[tokio::test]
    async fn cancelling_mid_batch_skips_items_not_yet_started() {
        let controller = BatchController::new();
        let started = Arc::new(AtomicUsize::new(0));

        let cancel_after = 3;
        let ctl = controller.clone();
        let started_clone = Arc::clone(&started);
        let outcomes = run_batch((0..12).collect(), 1, &controller, move |item, _c| {
            let ctl = ctl.clone();
            let started = Arc::clone(&started_clone);
            async move {
                started.fetch_add(1, Ordering::SeqCst);
                if item == cancel_after - 1 {
                    ctl.cancel();
                }
                Ok::<usize, OperationError>(item)
            }
        })
        .await;

        for outcome in outcomes.iter().take(cancel_after) {
            assert!(outcome.is_fulfilled());
        }
        for outcome in outcomes.iter().skip(cancel_after) {
            assert!(outcome.is_skipped());
        }
        assert_eq!(started.load(Ordering::SeqCst), cancel_after);
    }

    #[tokio::test]
    async fn cancellation_does_not_interrupt_items_already_started() {
        let controller = BatchController::new();
        let ctl = controller.clone();

        let outcomes = run_batch(vec![0, 1], 2, &controller, move |item, _c| {
            let ctl = ctl.clone();
            async move {
                // Both items are admitted before the flag is set
                ctl.cancel();
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<usize, OperationError>(item)
            }
        })
        .await;

        assert!(outcomes.iter().all(BatchOutcome::is_fulfilled));
    }

    #[tokio::test]
    async fn controller_tracks_live_operation_ids() {
        let controller = BatchController::new();
        controller.register_operation("op-1").await;
        controller.register_operation("op-2").await;
        controller.clear_operation("op-1").await;

        assert_eq!(controller.active_operations().await, vec!["op-2".to_string()]);
    }

    #[tokio::test]
    async fn zero_concurrency_limit_still_makes_progress() {
        let controller = BatchController::new();
        let outcomes = run_batch(vec![7], 0, &controller, |item, _c| async move {
            Ok::<usize, OperationError>(item)
        })
        .await;
        assert_eq!(outcomes, vec![BatchOutcome::Fulfilled(7)]);
    }
}

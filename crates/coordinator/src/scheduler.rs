//! Single-flight FIFO for calculation jobs.

use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use reprsim_protocol::{CalcSimilarities, Outcome};

use crate::bridge::{PendingOutcome, WorkerBridge};
use crate::generation::Generation;
use crate::lock;

/// Chains calculation submissions so at most one is in flight at the worker.
///
/// Each submission becomes a link that waits for the previous link to settle,
/// then either dispatches through the bridge or, if [`Generation`] moved since
/// the submission was made, resolves to [`Outcome::outdated`] without touching
/// the worker. Links always settle because bridge outcomes never fail, so a
/// failed job cannot stall the links behind it.
#[derive(Debug)]
pub struct SerializedScheduler {
    bridge: Arc<WorkerBridge>,
    generation: Generation,
    /// Settles when the most recently appended link has finished.
    tail: Mutex<oneshot::Receiver<()>>,
}

impl SerializedScheduler {
    pub fn new(bridge: Arc<WorkerBridge>, generation: Generation) -> Self {
        let (settled, tail) = oneshot::channel();
        let _ = settled.send(());

        Self {
            bridge,
            generation,
            tail: Mutex::new(tail),
        }
    }

    pub fn generation(&self) -> &Generation {
        &self.generation
    }

    /// Append a calculation to the chain.
    ///
    /// The generation is snapshotted now; the returned future resolves with
    /// this submission's outcome only, not the whole chain.
    pub fn submit_calculation(&self, request: CalcSimilarities) -> PendingOutcome {
        let stamp = self.generation.current();
        let (done, next_tail) = oneshot::channel();
        let previous = std::mem::replace(&mut *lock(&self.tail), next_tail);
        let (outcome_tx, outcome_rx) = oneshot::channel();

        let bridge = self.bridge.clone();
        let generation = self.generation.clone();
        tokio::spawn(async move {
            // A dropped sender means the previous link is gone, which is as good as settled.
            let _ = previous.await;

            let outcome = if generation.is_current(stamp) {
                bridge.submit(request).await
            } else {
                tracing::debug!(row = request.row, col = request.col, "calculation outdated before dispatch");
                Outcome::outdated()
            };

            let _ = outcome_tx.send(outcome);
            let _ = done.send(());
        });

        PendingOutcome::new(outcome_rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use reprsim_protocol::{FailureReason, SimilarityMeasure, Task};
    use reprsim_worker::{WorkerEndpoint, link};

    use crate::config::CoordinatorConfig;

    fn calc(row: u32, col: u32) -> CalcSimilarities {
        CalcSimilarities {
            func: SimilarityMeasure::Cosine,
            repr1_str: "base.bin".to_string(),
            repr2_str: "other.bin".to_string(),
            row,
            col,
        }
    }

    fn scheduler() -> (SerializedScheduler, WorkerEndpoint) {
        let (link, endpoint) = link();
        let config = CoordinatorConfig::default().with_calc_timeout(None);
        let bridge = Arc::new(WorkerBridge::new(link, &config));
        (SerializedScheduler::new(bridge, Generation::new()), endpoint)
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn one_calculation_in_flight_in_submission_order() {
        let (scheduler, mut endpoint) = scheduler();

        let first = scheduler.submit_calculation(calc(0, 0));
        let second = scheduler.submit_calculation(calc(0, 1));
        let third = scheduler.submit_calculation(calc(0, 2));

        let a = endpoint.recv().await.unwrap();
        assert_eq!(a.task, Task::from(calc(0, 0)));
        settle().await;
        assert!(endpoint.try_recv().is_none(), "second job dispatched while first in flight");

        endpoint.respond(a.id, Outcome::error("boom"));
        let b = endpoint.recv().await.unwrap();
        assert_eq!(b.task, Task::from(calc(0, 1)));
        settle().await;
        assert!(endpoint.try_recv().is_none());

        endpoint.respond(b.id, Outcome::similarities(vec![1.0]));
        let c = endpoint.recv().await.unwrap();
        assert_eq!(c.task, Task::from(calc(0, 2)));
        endpoint.respond(c.id, Outcome::similarities(vec![2.0]));

        assert_eq!(first.await, Outcome::error("boom"));
        assert_eq!(second.await, Outcome::similarities(vec![1.0]));
        assert_eq!(third.await, Outcome::similarities(vec![2.0]));
    }

    #[tokio::test]
    async fn stale_submission_resolves_outdated_without_dispatch() {
        let (scheduler, mut endpoint) = scheduler();

        scheduler.generation().bump();
        let stale = scheduler.submit_calculation(calc(1, 1));
        scheduler.generation().bump();
        let fresh = scheduler.submit_calculation(calc(2, 2));

        assert_eq!(stale.await.failure(), Some(&FailureReason::Outdated));

        let request = endpoint.recv().await.unwrap();
        assert_eq!(request.task, Task::from(calc(2, 2)));
        assert!(endpoint.try_recv().is_none());

        endpoint.respond(request.id, Outcome::similarities(vec![0.5; 16]));
        assert_eq!(fresh.await, Outcome::similarities(vec![0.5; 16]));
    }

    #[tokio::test]
    async fn stale_backlog_never_reaches_the_worker() {
        let (scheduler, mut endpoint) = scheduler();

        let stale: Vec<_> = (0..20).map(|i| scheduler.submit_calculation(calc(i, i))).collect();
        scheduler.generation().bump();

        for pending in stale {
            assert_eq!(pending.await, Outcome::outdated());
        }
        assert!(endpoint.try_recv().is_none());
    }

    #[tokio::test]
    async fn bump_after_dispatch_does_not_recall_the_job() {
        let (scheduler, mut endpoint) = scheduler();

        let pending = scheduler.submit_calculation(calc(3, 3));
        let request = endpoint.recv().await.unwrap();
        scheduler.generation().bump();

        endpoint.respond(request.id, Outcome::similarities(vec![0.0; 4]));
        assert_eq!(pending.await, Outcome::similarities(vec![0.0; 4]));
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_job_releases_the_chain() {
        let (link, mut endpoint) = link();
        let config = CoordinatorConfig::default().with_calc_timeout(Some(Duration::from_secs(1)));
        let bridge = Arc::new(WorkerBridge::new(link, &config));
        let scheduler = SerializedScheduler::new(bridge, Generation::new());

        let stuck = scheduler.submit_calculation(calc(0, 0));
        let next = scheduler.submit_calculation(calc(1, 1));

        let _ignored = endpoint.recv().await.unwrap();
        assert_eq!(stuck.await.failure(), Some(&FailureReason::Timeout));

        let request = endpoint.recv().await.unwrap();
        assert_eq!(request.task, Task::from(calc(1, 1)));
        endpoint.respond(request.id, Outcome::similarities(vec![1.0]));
        assert_eq!(next.await, Outcome::similarities(vec![1.0]));
    }
}

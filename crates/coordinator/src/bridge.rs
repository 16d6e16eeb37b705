//! Bridge between callers and the background worker.
//!
//! The bridge owns the request channel and the table of outstanding jobs.
//! Every submitted job resolves exactly once, always to an [`Outcome`]:
//!
//! - a matching worker response delivers its outcome and deregisters the job
//! - a configured timeout delivers [`FailureReason::Timeout`]
//! - a worker that can no longer answer (request or event channel closed)
//!   delivers a "worker unavailable" error
//! - tearing the bridge down delivers a "shut down" error to every waiter
//!
//! Whichever of these removes the job from the table first wins; the others
//! find nothing to resolve. Responses for ids that are not in the table are
//! logged and dropped.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::{AbortHandle, JoinHandle};

use reprsim_core::JobId;
use reprsim_protocol::{FailureReason, Outcome, Task, TaskKind, WorkerRequest, WorkerResponse};
use reprsim_worker::{WorkerEvent, WorkerLink};

use crate::config::CoordinatorConfig;
use crate::lock;

pub const WORKER_UNAVAILABLE: &str = "worker unavailable";
pub const BRIDGE_SHUT_DOWN: &str = "worker bridge shut down";

#[derive(Debug)]
struct PendingJob {
    waiter: oneshot::Sender<Outcome>,
    /// Timeout task, aborted as soon as the job resolves another way.
    timer: Option<AbortHandle>,
}

#[derive(Debug, Default)]
struct PendingTable {
    jobs: HashMap<JobId, PendingJob>,
    /// Set once the worker can no longer answer; later jobs fail at once.
    closed: bool,
}

impl PendingTable {
    fn take(&mut self, id: JobId) -> Option<oneshot::Sender<Outcome>> {
        let job = self.jobs.remove(&id)?;
        if let Some(timer) = job.timer {
            timer.abort();
        }
        Some(job.waiter)
    }

    /// Close the table and hand back every waiter still registered.
    fn close(&mut self) -> Vec<(JobId, oneshot::Sender<Outcome>)> {
        self.closed = true;
        let ids: Vec<JobId> = self.jobs.keys().copied().collect();
        ids.into_iter()
            .filter_map(|id| self.take(id).map(|waiter| (id, waiter)))
            .collect()
    }
}

/// Owner of the worker channel and its job-id space.
#[derive(Debug)]
pub struct WorkerBridge {
    requests: mpsc::UnboundedSender<WorkerRequest>,
    pending: Arc<Mutex<PendingTable>>,
    config: CoordinatorConfig,
    listener: JoinHandle<()>,
}

impl WorkerBridge {
    /// Take ownership of `link` and start listening for worker events.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(link: WorkerLink, config: &CoordinatorConfig) -> Self {
        let (requests, events) = link.into_parts();
        let pending = Arc::new(Mutex::new(PendingTable::default()));
        let listener = tokio::spawn(listen(events, pending.clone()));

        Self {
            requests,
            pending,
            config: config.clone(),
            listener,
        }
    }

    /// Send `task` to the worker and return its outcome-to-be.
    ///
    /// The request is sent before this returns; awaiting the returned future
    /// only waits for the answer. Dropping it does not cancel the job.
    pub fn submit(&self, task: impl Into<Task>) -> PendingOutcome {
        let task = task.into();
        let kind = task.kind();
        let id = JobId::new();
        let (tx, rx) = oneshot::channel();

        {
            let mut table = lock(&self.pending);
            if table.closed {
                drop(table);
                tracing::error!(job_id = %id, task = ?kind, "worker stopped answering; job not sent");
                let _ = tx.send(Outcome::error(WORKER_UNAVAILABLE));
                return PendingOutcome::new(rx);
            }
            // Armed under the lock so the timer cannot look for the job before it is registered.
            let timer = self
                .config
                .timeout_for(kind)
                .map(|timeout| spawn_timeout(Arc::downgrade(&self.pending), id, kind, timeout));
            table.jobs.insert(id, PendingJob { waiter: tx, timer });
        }

        if self.requests.send(WorkerRequest::new(id, task)).is_err() {
            tracing::error!(job_id = %id, task = ?kind, "worker channel closed; job not sent");
            resolve(&self.pending, id, Outcome::error(WORKER_UNAVAILABLE));
            return PendingOutcome::new(rx);
        }
        tracing::debug!(job_id = %id, task = ?kind, "job sent to worker");

        PendingOutcome::new(rx)
    }

    /// Number of jobs sent but not yet resolved.
    pub fn outstanding(&self) -> usize {
        lock(&self.pending).jobs.len()
    }
}

impl Drop for WorkerBridge {
    fn drop(&mut self) {
        self.listener.abort();
        // Dropping the waiters resolves them as shut down.
        drop(lock(&self.pending).close());
    }
}

fn spawn_timeout(
    pending: Weak<Mutex<PendingTable>>,
    id: JobId,
    kind: TaskKind,
    timeout: Duration,
) -> AbortHandle {
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        let Some(pending) = pending.upgrade() else {
            return;
        };
        if resolve(&pending, id, Outcome::error(FailureReason::Timeout)) {
            tracing::warn!(job_id = %id, task = ?kind, ?timeout, "worker job timed out");
        }
    })
    .abort_handle()
}

/// Deliver `outcome` to job `id` if it is still outstanding.
fn resolve(pending: &Mutex<PendingTable>, id: JobId, outcome: Outcome) -> bool {
    let Some(waiter) = lock(pending).take(id) else {
        return false;
    };
    if waiter.send(outcome).is_err() {
        tracing::debug!(job_id = %id, "outcome arrived after its waiter was dropped");
    }
    true
}

async fn listen(mut events: mpsc::UnboundedReceiver<WorkerEvent>, pending: Arc<Mutex<PendingTable>>) {
    while let Some(event) = events.recv().await {
        match event {
            WorkerEvent::Message(WorkerResponse { id, data }) => {
                if !resolve(&pending, id, data) {
                    tracing::warn!(job_id = %id, "received message from worker for unknown job");
                }
            }
            WorkerEvent::Failure(reason) => {
                tracing::error!(reason = %reason, outstanding = lock(&pending).jobs.len(), "error in worker");
            }
        }
    }

    // No answer can arrive any more.
    let orphaned = lock(&pending).close();
    tracing::error!(orphaned = orphaned.len(), "worker event channel closed");
    for (id, waiter) in orphaned {
        if waiter.send(Outcome::error(WORKER_UNAVAILABLE)).is_err() {
            tracing::debug!(job_id = %id, "outcome arrived after its waiter was dropped");
        }
    }
}

/// Future resolving to the [`Outcome`] of one job.
///
/// Never fails: if the producing side disappears without answering, it
/// resolves to an error outcome instead.
#[derive(Debug)]
pub struct PendingOutcome {
    rx: oneshot::Receiver<Outcome>,
}

impl PendingOutcome {
    pub(crate) fn new(rx: oneshot::Receiver<Outcome>) -> Self {
        Self { rx }
    }
}

impl Future for PendingOutcome {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Outcome::error(BRIDGE_SHUT_DOWN)))
    }
}

//! In-process worker host.

use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use reprsim_protocol::{Outcome, Task, WorkerRequest};

use crate::handler::TaskHandler;
use crate::link::{Responder, WorkerEndpoint, WorkerLink, link};

const WORKER_NAME: &str = "repr-worker";

/// Runs a [`TaskHandler`] behind a [`WorkerEndpoint`].
///
/// Requests are taken in arrival order. Calculations are executed one at a
/// time; fetches are started as they arrive and may finish in any order.
pub struct WorkerHost<H: TaskHandler> {
    handler: Arc<H>,
}

/// Handle to a running host.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: Arc<Notify>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the host loop to exit.
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        let _ = self.join.await;
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

impl<H: TaskHandler> WorkerHost<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }

    /// Create a fresh link and run the host on its worker end.
    pub fn start(self) -> (WorkerLink, WorkerHandle) {
        let (link, endpoint) = link();
        (link, self.spawn(endpoint))
    }

    /// Run the host on `endpoint` until shutdown or until the bridge side
    /// hangs up.
    pub fn spawn(self, endpoint: WorkerEndpoint) -> WorkerHandle {
        let shutdown = Arc::new(Notify::new());
        let signal = shutdown.clone();
        let handler = self.handler;
        let (mut requests, responder) = endpoint.into_parts();

        let join = tokio::spawn(async move {
            tracing::info!(worker = WORKER_NAME, "worker started");

            if let Err(e) = handler.ready().await {
                let reason = format!("worker failed to initialise: {e:#}");
                tracing::error!(worker = WORKER_NAME, error = %reason, "worker is unusable");
                responder.fail(reason);
                return;
            }

            loop {
                tokio::select! {
                    _ = signal.notified() => {
                        tracing::info!(worker = WORKER_NAME, "worker received shutdown signal");
                        break;
                    }
                    request = requests.recv() => {
                        let Some(request) = request else {
                            tracing::debug!(worker = WORKER_NAME, "request channel closed");
                            break;
                        };
                        handle_request(&handler, &responder, request).await;
                    }
                }
            }

            tracing::info!(worker = WORKER_NAME, "worker stopped");
        });

        WorkerHandle { shutdown, join }
    }
}

async fn handle_request<H: TaskHandler>(
    handler: &Arc<H>,
    responder: &Responder,
    request: WorkerRequest,
) {
    let WorkerRequest { id, task } = request;
    tracing::debug!(job_id = %id, task = ?task.kind(), "worker received job");

    match task {
        Task::FetchRepr(fetch) => {
            let handler = handler.clone();
            let responder = responder.clone();
            tokio::spawn(async move {
                let outcome = match handler.fetch_repr(&fetch).await {
                    Ok(()) => Outcome::done(),
                    Err(e) => failed(e),
                };
                responder.respond(id, outcome);
            });
        }
        Task::CalcSimilarities(calc) => {
            let worker = handler.clone();
            let outcome = match tokio::task::spawn_blocking(move || worker.calc_similarities(&calc)).await {
                Ok(Ok(similarities)) => Outcome::similarities(similarities),
                Ok(Err(e)) => failed(e),
                Err(join) => Outcome::error(format!("calculation aborted: {join}")),
            };
            responder.respond(id, outcome);
        }
    }
}

fn failed(error: anyhow::Error) -> Outcome {
    Outcome::error(format!("{error:#}"))
}

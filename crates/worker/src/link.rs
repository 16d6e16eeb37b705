//! Channel pair between the bridge side and the worker side.

use tokio::sync::mpsc;

use reprsim_core::JobId;
use reprsim_protocol::{Outcome, WorkerRequest, WorkerResponse};

/// Anything the worker side reports back.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// A response for a previously sent request.
    Message(WorkerResponse),
    /// The worker failed as a whole (crashed, exited, failed to start).
    ///
    /// Carries no job id: no particular job is resolved by it.
    Failure(String),
}

/// Bridge-side end: send requests, receive events.
#[derive(Debug)]
pub struct WorkerLink {
    requests: mpsc::UnboundedSender<WorkerRequest>,
    events: mpsc::UnboundedReceiver<WorkerEvent>,
}

impl WorkerLink {
    pub fn into_parts(
        self,
    ) -> (
        mpsc::UnboundedSender<WorkerRequest>,
        mpsc::UnboundedReceiver<WorkerEvent>,
    ) {
        (self.requests, self.events)
    }
}

/// Cloneable handle for posting events back to the bridge.
#[derive(Debug, Clone)]
pub struct Responder {
    events: mpsc::UnboundedSender<WorkerEvent>,
}

impl Responder {
    /// Post a response. Returns `false` if the bridge side is gone.
    pub fn respond(&self, id: JobId, outcome: Outcome) -> bool {
        self.deliver(WorkerResponse::new(id, outcome))
    }

    pub fn deliver(&self, response: WorkerResponse) -> bool {
        self.events.send(WorkerEvent::Message(response)).is_ok()
    }

    /// Report a worker-level failure.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.events.send(WorkerEvent::Failure(reason.into())).is_ok()
    }
}

/// Worker-side end: receive requests, post events.
#[derive(Debug)]
pub struct WorkerEndpoint {
    requests: mpsc::UnboundedReceiver<WorkerRequest>,
    responder: Responder,
}

impl WorkerEndpoint {
    /// Next request; `None` once the bridge side is dropped.
    pub async fn recv(&mut self) -> Option<WorkerRequest> {
        self.requests.recv().await
    }

    /// Next already-queued request, without waiting.
    pub fn try_recv(&mut self) -> Option<WorkerRequest> {
        self.requests.try_recv().ok()
    }

    pub fn responder(&self) -> Responder {
        self.responder.clone()
    }

    pub fn respond(&self, id: JobId, outcome: Outcome) -> bool {
        self.responder.respond(id, outcome)
    }

    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.responder.fail(reason)
    }

    pub fn into_parts(self) -> (mpsc::UnboundedReceiver<WorkerRequest>, Responder) {
        (self.requests, self.responder)
    }
}

/// Create a connected pair.
pub fn link() -> (WorkerLink, WorkerEndpoint) {
    let (req_tx, req_rx) = mpsc::unbounded_channel();
    let (ev_tx, ev_rx) = mpsc::unbounded_channel();
    (
        WorkerLink {
            requests: req_tx,
            events: ev_rx,
        },
        WorkerEndpoint {
            requests: req_rx,
            responder: Responder { events: ev_tx },
        },
    )
}

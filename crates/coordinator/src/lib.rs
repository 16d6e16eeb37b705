//! `reprsim-coordinator`
//!
//! **Responsibility:** turn rapid pointer input into a bounded, ordered stream
//! of worker jobs whose stale results never reach the screen.
//!
//! - [`WorkerBridge`]: job ids, pending outcomes, exactly-once resolution
//! - [`SerializedScheduler`]: one calculation in flight, FIFO, pre-dispatch
//!   staleness check against [`Generation`]
//! - [`RetryScheduler`]: leading + trailing throttle for not-ready targets
//! - [`TriggerGate`]: drops repeated [`WorkItemKey`](reprsim_core::WorkItemKey)s
//! - [`ComparisonSession`]: the pipeline wiring them to a [`RenderSink`]
//!
//! Everything here resolves failures into [`Outcome`](reprsim_protocol::Outcome)
//! values; nothing in this crate terminates the process.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod bridge;
pub mod config;
pub mod generation;
pub mod render;
pub mod retry;
pub mod scheduler;
pub mod session;
pub mod trigger;

pub use bridge::{PendingOutcome, WorkerBridge};
pub use config::{ConfigError, CoordinatorConfig};
pub use generation::{Generation, GenerationStamp};
pub use render::{RenderSink, SimilarityFrame, SimilarityStats, StatusMessage};
pub use retry::RetryScheduler;
pub use scheduler::SerializedScheduler;
pub use session::{ComparisonSession, ReprLocator};
pub use trigger::TriggerGate;

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

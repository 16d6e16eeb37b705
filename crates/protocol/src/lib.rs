//! Worker wire contract.
//!
//! Requests and responses exchanged with the background worker, plus the
//! tagged [`Outcome`] every job resolves to.

pub mod address;
pub mod envelope;
pub mod error;
pub mod outcome;
pub mod task;

pub use address::ReprAddress;
pub use envelope::{WorkerRequest, WorkerResponse};
pub use error::ProtocolError;
pub use outcome::{FailureReason, Outcome};
pub use task::{CalcSimilarities, FetchRepr, SimilarityMeasure, Task, TaskKind};

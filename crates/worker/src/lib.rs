//! `reprsim-worker`
//!
//! **Responsibility:** the channel to the background worker and the ways to
//! run one.
//!
//! This crate provides:
//! - [`link`]: the request/event channel pair between a bridge and a worker
//! - [`WorkerHost`]: runs a [`TaskHandler`] on a tokio task
//! - [`ProcessWorker`]: talks JSON lines to a worker child process
//!
//! The similarity computation itself lives behind [`TaskHandler`].

pub mod error;
pub mod handler;
pub mod host;
pub mod link;
pub mod process;

pub use error::WorkerError;
pub use handler::TaskHandler;
pub use host::{WorkerHandle, WorkerHost};
pub use link::{Responder, WorkerEndpoint, WorkerEvent, WorkerLink, link};
pub use process::ProcessWorker;

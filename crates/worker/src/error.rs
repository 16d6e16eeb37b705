use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to start worker process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("worker process has no {0} pipe")]
    MissingPipe(&'static str),
}

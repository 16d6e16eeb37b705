use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown similarity measure: {0}")]
    UnknownMeasure(String),

    /// A message could not be encoded or decoded.
    #[error("malformed worker message: {0}")]
    Malformed(#[from] serde_json::Error),
}

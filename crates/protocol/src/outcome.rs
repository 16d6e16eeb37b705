//! Job outcomes.
//!
//! Every job resolves to exactly one [`Outcome`]. Failures are values, not
//! errors: a job that fails still *resolves*, carrying `status: error`.

use serde::{Deserialize, Serialize};

/// Tagged result of a worker job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success {
        /// Present for `calc_similarities`; `n * n` values, row-major.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        similarities: Option<Vec<f32>>,
    },
    Error {
        #[serde(alias = "msg")]
        reason: FailureReason,
    },
}

impl Outcome {
    pub fn done() -> Self {
        Outcome::Success { similarities: None }
    }

    pub fn similarities(values: Vec<f32>) -> Self {
        Outcome::Success {
            similarities: Some(values),
        }
    }

    pub fn error(reason: impl Into<FailureReason>) -> Self {
        Outcome::Error {
            reason: reason.into(),
        }
    }

    pub fn outdated() -> Self {
        Self::error(FailureReason::Outdated)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            Outcome::Success { .. } => None,
            Outcome::Error { reason } => Some(reason),
        }
    }
}

/// Why a job did not succeed.
///
/// On the wire this is a plain string; `"loading"`, `"outdated"` and
/// `"timeout"` are reserved, anything else is free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FailureReason {
    /// A required representation is not cached in the worker yet.
    Loading,
    /// The request was superseded before it was dispatched.
    Outdated,
    /// No response arrived within the configured timeout.
    Timeout,
    Other(String),
}

impl FailureReason {
    pub const LOADING: &'static str = "loading";
    pub const OUTDATED: &'static str = "outdated";
    pub const TIMEOUT: &'static str = "timeout";

    pub fn other(msg: impl Into<String>) -> Self {
        Self::from(msg.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            FailureReason::Loading => Self::LOADING,
            FailureReason::Outdated => Self::OUTDATED,
            FailureReason::Timeout => Self::TIMEOUT,
            FailureReason::Other(msg) => msg,
        }
    }
}

impl From<String> for FailureReason {
    fn from(value: String) -> Self {
        match value.as_str() {
            Self::LOADING => FailureReason::Loading,
            Self::OUTDATED => FailureReason::Outdated,
            Self::TIMEOUT => FailureReason::Timeout,
            _ => FailureReason::Other(value),
        }
    }
}

impl From<&str> for FailureReason {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<FailureReason> for String {
    fn from(value: FailureReason) -> Self {
        match value {
            FailureReason::Other(msg) => msg,
            reserved => reserved.as_str().to_string(),
        }
    }
}

impl core::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

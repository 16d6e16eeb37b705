//! Messages crossing the worker channel.

use serde::{Deserialize, Serialize};

use reprsim_core::JobId;

use crate::error::ProtocolError;
use crate::outcome::Outcome;
use crate::task::Task;

/// Request sent to the worker: `{ id, task, data }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub id: JobId,
    #[serde(flatten)]
    pub task: Task,
}

impl WorkerRequest {
    pub fn new(id: JobId, task: Task) -> Self {
        Self { id, task }
    }

    /// Encode as a single JSON line (no trailing newline).
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(line: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(line)?)
    }
}

/// Response from the worker: `{ id, data }`, `id` matching a prior request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub id: JobId,
    pub data: Outcome,
}

impl WorkerResponse {
    pub fn new(id: JobId, data: Outcome) -> Self {
        Self { id, data }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(line: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(line)?)
    }
}

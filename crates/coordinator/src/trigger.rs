//! Trigger-level idempotence.

use reprsim_core::WorkItemKey;

/// Admits a [`WorkItemKey`] only if it differs from the previous one.
///
/// Pointer-move events fire many times per tile; only the first one per tile
/// should start work.
#[derive(Debug, Default)]
pub struct TriggerGate {
    last: Option<WorkItemKey>,
}

impl TriggerGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `key` is new and records it.
    pub fn admit(&mut self, key: WorkItemKey) -> bool {
        if self.last == Some(key) {
            return false;
        }
        self.last = Some(key);
        true
    }

    /// Forget the last key so the next call is admitted.
    pub fn reset(&mut self) {
        self.last = None;
    }

    pub fn last(&self) -> Option<WorkItemKey> {
        self.last
    }
}

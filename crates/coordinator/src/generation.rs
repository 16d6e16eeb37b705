//! Staleness generation counter.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counter bumped on every selection change.
///
/// Clones share the same counter. Starts at 0 and never decreases.
#[derive(Debug, Clone, Default)]
pub struct Generation {
    value: Arc<AtomicU64>,
}

/// A snapshot of [`Generation`]; only meaningful for equality checks.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct GenerationStamp(u64);

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the generation, invalidating every earlier stamp.
    pub fn bump(&self) -> GenerationStamp {
        GenerationStamp(self.value.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn current(&self) -> GenerationStamp {
        GenerationStamp(self.value.load(Ordering::SeqCst))
    }

    pub fn is_current(&self, stamp: GenerationStamp) -> bool {
        self.current() == stamp
    }
}

//! Tracing/logging setup shared by binaries and tests.

/// Initialize process-wide logging (JSON, filter from `RUST_LOG`).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Initialize human-readable logging routed through the test harness.
///
/// Safe to call from every test.
pub fn init_for_tests() {
    tracing::init_for_tests();
}

/// Tracing configuration (filters, layers).
pub mod tracing;

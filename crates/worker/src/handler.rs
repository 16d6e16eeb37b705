//! The opaque computation behind the worker.

use async_trait::async_trait;

use reprsim_protocol::{CalcSimilarities, FetchRepr};

/// Executes worker tasks.
///
/// Errors are free text for the caller: the message (with its context chain)
/// becomes the failure reason of the job. Return an error reading exactly
/// `loading` when a required representation is not cached yet.
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    /// Awaited once before the first request is handled.
    async fn ready(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Fetch the representation at `request.url` and cache it.
    ///
    /// Already cached URLs should succeed immediately.
    async fn fetch_repr(&self, request: &FetchRepr) -> anyhow::Result<()>;

    /// Compare one tile against every tile; `n * n` values, row-major.
    ///
    /// Runs on the blocking pool, one call at a time.
    fn calc_similarities(&self, request: &CalcSimilarities) -> anyhow::Result<Vec<f32>>;
}

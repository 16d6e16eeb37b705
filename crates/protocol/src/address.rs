//! Location of a stored representation on the server.

use serde::{Deserialize, Serialize};

/// Coordinates of one representation file:
/// `{origin}/representations/{subject}/{model}/{step}/{position}.bin`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReprAddress {
    pub origin: String,
    pub subject: String,
    /// Short model name, e.g. `SD15`.
    pub model: String,
    /// Noise step the representation was extracted at.
    pub step: u32,
    /// Extraction position inside the network, e.g. `up_blocks[1]`.
    pub position: String,
}

impl ReprAddress {
    pub fn url(&self) -> String {
        format!(
            "{}/representations/{}/{}/{}/{}.bin",
            self.origin.trim_end_matches('/'),
            self.subject,
            self.model,
            self.step,
            self.position
        )
    }
}

impl core::fmt::Display for ReprAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.url())
    }
}

use serde::{Deserialize, Serialize};

/// Bounds applied when compiling caller-supplied expressions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateLimits {
    /// Longest accepted source string, in bytes.
    pub max_source_len: usize,
    /// Deepest accepted nesting of sub-expressions.
    pub max_depth: usize,
}

impl Default for GateLimits {
    fn default() -> Self {
        Self {
            max_source_len: 4096,
            max_depth: 64,
        }
    }
}

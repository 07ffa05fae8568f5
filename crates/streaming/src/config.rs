use serde::{Deserialize, Serialize};

/// Scheduling knobs for tile streaming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Maximum simultaneously in-flight tile fetches.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_concurrency() -> usize {
    4
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

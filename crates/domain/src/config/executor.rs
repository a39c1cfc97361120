use serde::{Deserialize, Serialize};

/// Shared tool-execution resource bounds, read by both `sa-security`'s
/// executor guard and `sa-tools`'s reference implementations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Max bytes of combined stdout/stderr retained per tool session.
    #[serde(default = "d_max_output_bytes")]
    pub max_output_bytes: usize,
    /// How long a finished/killed process session is kept before
    /// cleanup, in milliseconds.
    #[serde(default = "d_retain_ms")]
    pub retain_finished_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_output_bytes: d_max_output_bytes(),
            retain_finished_ms: d_retain_ms(),
        }
    }
}

fn d_max_output_bytes() -> usize {
    1_000_000
}
fn d_retain_ms() -> u64 {
    1_800_000
}

use serde::{Deserialize, Serialize};

/// Agent loop configuration: iteration bound, the overall per-turn
/// deadline, and the system prompt every request carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Hard cap on model<->tool round trips within a single `run()`.
    #[serde(default = "d_max_iterations")]
    pub max_iterations: usize,
    /// Wall-clock deadline for one whole user turn, in milliseconds.
    /// On expiry the loop appends an apology turn and returns.
    #[serde(default = "d_user_turn_deadline_ms")]
    pub user_turn_deadline_ms: u64,
    #[serde(default = "d_system_prompt")]
    pub system_prompt: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: d_max_iterations(),
            user_turn_deadline_ms: d_user_turn_deadline_ms(),
            system_prompt: d_system_prompt(),
        }
    }
}

fn d_max_iterations() -> usize {
    10
}
fn d_user_turn_deadline_ms() -> u64 {
    120_000
}
fn d_system_prompt() -> String {
    "You are a helpful assistant. Use the available tools when they help you answer.".into()
}

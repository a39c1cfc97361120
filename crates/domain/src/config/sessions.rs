use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Session manager configuration: durable storage location, write-behind
/// flush thresholds, and the idle-eviction policy. Sessions are keyed
/// directly by the caller-supplied user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Directory the session store persists to (one file per user id).
    #[serde(default = "d_state_dir")]
    pub state_dir: PathBuf,
    /// Flush a session's pending turns to persistence after this many
    /// unflushed turns accumulate.
    #[serde(default = "d_flush_threshold")]
    pub flush_threshold: u32,
    /// Flush a session if it has been idle this many milliseconds,
    /// even below `flush_threshold`.
    #[serde(default = "d_flush_idle_ms")]
    pub flush_idle_ms: u64,
    /// Evict a session's in-memory state (after flushing) once idle
    /// beyond this many milliseconds.
    #[serde(default = "d_evict_idle_ms")]
    pub evict_idle_ms: u64,
    /// How often the idle-eviction sweep runs.
    #[serde(default = "d_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    /// Soft cap on the number of most-recent turns included when
    /// building an LLM request. The full history stays in the store.
    #[serde(default = "d_history_cap")]
    pub history_cap: usize,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            state_dir: d_state_dir(),
            flush_threshold: d_flush_threshold(),
            flush_idle_ms: d_flush_idle_ms(),
            evict_idle_ms: d_evict_idle_ms(),
            sweep_interval_ms: d_sweep_interval_ms(),
            history_cap: d_history_cap(),
        }
    }
}

fn d_state_dir() -> PathBuf {
    PathBuf::from("state/sessions")
}
fn d_history_cap() -> usize {
    100
}
fn d_flush_threshold() -> u32 {
    5
}
fn d_flush_idle_ms() -> u64 {
    10_000
}
fn d_evict_idle_ms() -> u64 {
    1_800_000
}
fn d_sweep_interval_ms() -> u64 {
    60_000
}

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the built-in exec/process/file reference tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub exec: ExecConfig,
    /// Root directory the file tools are sandboxed to.
    #[serde(default = "d_workspace_root")]
    pub workspace_root: PathBuf,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            exec: ExecConfig::default(),
            workspace_root: d_workspace_root(),
        }
    }
}

fn d_workspace_root() -> PathBuf {
    PathBuf::from(".")
}

/// Exec tool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecConfig {
    /// Default yield time in ms before auto-backgrounding (0 = always foreground).
    #[serde(default = "d_10000")]
    pub background_ms: u64,
    /// Hard timeout for foreground commands (seconds).
    #[serde(default = "d_1800")]
    pub timeout_sec: u64,
    /// TTL for finished process sessions before cleanup (ms).
    #[serde(default = "d_1800000")]
    pub cleanup_ms: u64,
    /// Max output chars kept per process session.
    #[serde(default = "d_1000000")]
    pub max_output_chars: usize,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            background_ms: d_10000(),
            timeout_sec: d_1800(),
            cleanup_ms: d_1800000(),
            max_output_chars: d_1000000(),
        }
    }
}

fn d_10000() -> u64 {
    10_000
}
fn d_1800() -> u64 {
    1800
}
fn d_1800000() -> u64 {
    1_800_000
}
fn d_1000000() -> usize {
    1_000_000
}

use serde::{Deserialize, Serialize};

/// Security pipeline configuration: pattern lists for the sanitizer and
/// pattern vetter, and the executor guard's concurrency cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Regex patterns that cause the sanitizer to flag free text as a
    /// prompt-injection / role-override attempt.
    #[serde(default = "d_sanitizer_patterns")]
    pub sanitizer_patterns: Vec<String>,
    /// Regex patterns that deny a tool call outright (pattern vetter).
    #[serde(default = "d_denied_patterns")]
    pub denied_patterns: Vec<String>,
    /// Tool names denied regardless of pattern (tool gate blocklist).
    #[serde(default)]
    pub denied_tools: Vec<String>,
    /// When set, only these tool names are allowed (tool gate
    /// allowlist); empty means "allow all except `denied_tools`".
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    /// Enable the semantic vetter (LLM risk verdict) for `medium`/`high`
    /// risk tools.
    #[serde(default)]
    pub semantic_vetting_enabled: bool,
    /// Max concurrent tool executions per user (executor guard).
    #[serde(default = "d_max_concurrent_per_user")]
    pub max_concurrent_per_user: usize,
    /// Per-tool execution deadline, in milliseconds.
    #[serde(default = "d_tool_deadline_ms")]
    pub tool_deadline_ms: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            sanitizer_patterns: d_sanitizer_patterns(),
            denied_patterns: d_denied_patterns(),
            denied_tools: Vec::new(),
            allowed_tools: Vec::new(),
            semantic_vetting_enabled: false,
            max_concurrent_per_user: d_max_concurrent_per_user(),
            tool_deadline_ms: d_tool_deadline_ms(),
        }
    }
}

fn d_sanitizer_patterns() -> Vec<String> {
    vec![
        r"(?i)ignore (all )?(previous|prior|above) instructions".into(),
        r"(?i)you are now (in )?(developer|dan|jailbreak) mode".into(),
        r"(?i)disregard (your|the) system prompt".into(),
    ]
}

fn d_denied_patterns() -> Vec<String> {
    vec![
        r"rm\s+-rf\s+/".into(),
        r"mkfs\.".into(),
        r"dd\s+if=.+of=/dev/".into(),
    ]
}

fn d_max_concurrent_per_user() -> usize {
    4
}

fn d_tool_deadline_ms() -> u64 {
    30_000
}

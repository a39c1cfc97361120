use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// LLM router configuration: provider registry, per-task-class routing,
/// and pricing for cost estimation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default = "d_timeout_ms")]
    pub default_timeout_ms: u64,
    #[serde(default = "d_retries")]
    pub max_retries: u32,
    /// Startup policy for LLM providers.
    #[serde(default)]
    pub startup_policy: LlmStartupPolicy,
    /// Routing table: task class name -> model + fallbacks.
    #[serde(default)]
    pub classes: HashMap<String, TaskClassConfig>,
    /// Registered LLM providers.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    /// Per-model pricing, keyed `"provider/model"`, used to estimate
    /// request cost for quota accounting.
    #[serde(default)]
    pub pricing: HashMap<String, ModelPricing>,
    /// Token-count threshold above which a request is classified
    /// `large_context` regardless of other heuristics.
    #[serde(default = "d_large_context_tokens")]
    pub large_context_tokens: u32,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: d_timeout_ms(),
            max_retries: d_retries(),
            startup_policy: LlmStartupPolicy::default(),
            classes: HashMap::new(),
            providers: Vec::new(),
            pricing: HashMap::new(),
            large_context_tokens: d_large_context_tokens(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LlmStartupPolicy {
    #[default]
    AllowNone,
    RequireOne,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskClassConfig {
    /// Format: `"provider_id/model_name"`.
    pub model: String,
    #[serde(default)]
    pub require_tools: bool,
    #[serde(default)]
    pub require_json: bool,
    #[serde(default)]
    pub fallbacks: Vec<FallbackConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    pub model: String,
    #[serde(default)]
    pub require_tools: bool,
    #[serde(default)]
    pub require_json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub kind: ProviderKind,
    pub base_url: String,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenaiCompat,
    Anthropic,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    #[serde(default)]
    pub header: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub env: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub account: Option<String>,
    /// Env var names for multiple rotating keys; when non-empty takes
    /// precedence over the single `env`/`key` fields.
    #[serde(default)]
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    #[default]
    ApiKey,
    Keychain,
    None,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_1m: f64,
    pub output_per_1m: f64,
}

impl ModelPricing {
    pub fn estimate_cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (input_tokens as f64 / 1_000_000.0) * self.input_per_1m
            + (output_tokens as f64 / 1_000_000.0) * self.output_per_1m
    }
}

fn d_timeout_ms() -> u64 {
    20_000
}
fn d_retries() -> u32 {
    2
}
fn d_large_context_tokens() -> u32 {
    8_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_cost_scales_with_tokens() {
        let pricing = ModelPricing {
            input_per_1m: 3.0,
            output_per_1m: 15.0,
        };
        let cost = pricing.estimate_cost(1_000_000, 1_000_000);
        assert!((cost - 18.0).abs() < 1e-9);
    }

    #[test]
    fn default_startup_policy_allows_none() {
        assert_eq!(LlmStartupPolicy::default(), LlmStartupPolicy::AllowNone);
    }
}

use semver::Version;
use serde::{Deserialize, Serialize};

/// Static metadata describing a tool available to the agent loop.
///
/// A registry keys on `name` alone: invariant 3 requires exactly one
/// *enabled* version of a given name at a time, so callers never see
/// two competing schemas for the same tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub version: Version,
    pub description: String,
    /// JSON Schema for the tool's input.
    pub input_schema: serde_json::Value,
    /// JSON Schema for the tool's output, when known ahead of time.
    #[serde(default)]
    pub output_schema: Option<serde_json::Value>,
    pub category: String,
    pub risk: RiskLevel,
    /// Whether repeated calls with the same input are safe to run
    /// concurrently with other idempotent calls in the same turn.
    pub idempotent: bool,
    pub default_policy: AllowDeny,
    pub concurrency_class: ConcurrencyClass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowDeny {
    Allow,
    Deny,
}

/// Tools sharing a concurrency class may run in parallel within one
/// assistant turn, provided they're also all `idempotent`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConcurrencyClass(pub String);

impl ConcurrencyClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_level_orders_low_to_critical() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Critical);
    }

    #[test]
    fn descriptor_round_trips_through_json() {
        let d = ToolDescriptor {
            name: "exec".into(),
            version: Version::new(1, 0, 0),
            description: "run a shell command".into(),
            input_schema: serde_json::json!({"type": "object"}),
            output_schema: None,
            category: "system".into(),
            risk: RiskLevel::High,
            idempotent: false,
            default_policy: AllowDeny::Allow,
            concurrency_class: ConcurrencyClass::new("exec"),
        };
        let json = serde_json::to_string(&d).unwrap();
        let back: ToolDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, "exec");
        assert_eq!(back.risk, RiskLevel::High);
    }
}

use crate::context::ToolCallContext;
use crate::pipeline::{FilterVerdict, SecurityFilter};
use async_trait::async_trait;
use regex::RegexSet;
use sa_domain::error::Result;

/// Dangerous environment variable names that, if set as an argument
/// value, are denied even when no other pattern matches.
const DANGEROUS_ENV_VARS: &[&str] = &["LD_PRELOAD", "LD_LIBRARY_PATH", "DYLD_INSERT_LIBRARIES"];

fn is_dangerous_env_var(name: &str) -> bool {
    DANGEROUS_ENV_VARS.iter().any(|d| d.eq_ignore_ascii_case(name))
}

/// Walks a JSON value looking for any object key that names a
/// dangerous environment variable, regardless of nesting depth (tool
/// argument schemas commonly nest an `env` map under the top level).
fn contains_dangerous_env_var(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Object(map) => map.iter().any(|(k, v)| {
            is_dangerous_env_var(k) || contains_dangerous_env_var(v)
        }),
        serde_json::Value::Array(items) => items.iter().any(contains_dangerous_env_var),
        _ => false,
    }
}

/// Scans a tool call's stringified arguments against a set of denied
/// command patterns, plus a fixed deny-list of dangerous environment
/// variable names.
pub struct PatternVetter {
    patterns: RegexSet,
}

impl PatternVetter {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let set = RegexSet::new(patterns)
            .map_err(|e| sa_domain::error::Error::Config(format!("invalid denied pattern: {e}")))?;
        Ok(Self { patterns: set })
    }
}

#[async_trait]
impl SecurityFilter for PatternVetter {
    fn name(&self) -> &'static str {
        "pattern_vetter"
    }

    async fn check(&self, ctx: &ToolCallContext) -> Result<FilterVerdict> {
        if contains_dangerous_env_var(&ctx.arguments) {
            return Ok(FilterVerdict::Block(
                "arguments set a dangerous environment variable".into(),
            ));
        }
        let rendered = ctx.arguments.to_string();
        if self.patterns.is_match(&rendered) {
            return Ok(FilterVerdict::Block(
                "arguments matched a denied command pattern".into(),
            ));
        }
        Ok(FilterVerdict::Allow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(arguments: serde_json::Value) -> ToolCallContext {
        ToolCallContext {
            user_id: "u1".into(),
            tool_name: "exec".into(),
            arguments,
            descriptor: None,
            source_text: None,
        }
    }

    fn vetter() -> PatternVetter {
        PatternVetter::new(&[r"rm\s+-rf\s+/".into()]).unwrap()
    }

    #[tokio::test]
    async fn benign_command_allowed() {
        let v = vetter()
            .check(&ctx(serde_json::json!({"command": "ls -la"})))
            .await
            .unwrap();
        assert_eq!(v, FilterVerdict::Allow);
    }

    #[tokio::test]
    async fn denied_command_blocked() {
        let v = vetter()
            .check(&ctx(serde_json::json!({"command": "rm -rf /"})))
            .await
            .unwrap();
        assert!(matches!(v, FilterVerdict::Block(_)));
    }

    #[tokio::test]
    async fn dangerous_env_var_blocked() {
        let v = vetter()
            .check(&ctx(serde_json::json!({"env": {"LD_PRELOAD": "/tmp/x.so"}})))
            .await
            .unwrap();
        assert!(matches!(v, FilterVerdict::Block(_)));
    }
}

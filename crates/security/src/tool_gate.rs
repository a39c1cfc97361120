use crate::context::ToolCallContext;
use crate::pipeline::{FilterVerdict, SecurityFilter};
use async_trait::async_trait;
use sa_domain::descriptor::AllowDeny;
use sa_domain::error::Result;

/// Blocklist/allowlist check on the tool name itself, before any
/// argument inspection. An empty `allowed` list means "allow anything
/// not explicitly denied"; a non-empty list means "allow only these".
/// A descriptor whose own `default_policy` is `Deny` is blocked
/// regardless of the lists.
pub struct ToolGate {
    denied: Vec<String>,
    allowed: Vec<String>,
}

impl ToolGate {
    pub fn new(denied: Vec<String>, allowed: Vec<String>) -> Self {
        Self { denied, allowed }
    }
}

#[async_trait]
impl SecurityFilter for ToolGate {
    fn name(&self) -> &'static str {
        "tool_gate"
    }

    async fn check(&self, ctx: &ToolCallContext) -> Result<FilterVerdict> {
        let Some(descriptor) = &ctx.descriptor else {
            return Ok(FilterVerdict::Block(format!(
                "unknown tool \"{}\"",
                ctx.tool_name
            )));
        };
        if descriptor.default_policy == AllowDeny::Deny {
            return Ok(FilterVerdict::Block(format!(
                "tool \"{}\" is disabled by default policy",
                ctx.tool_name
            )));
        }
        if self.denied.iter().any(|n| n == &ctx.tool_name) {
            return Ok(FilterVerdict::Block(format!(
                "tool \"{}\" is denylisted",
                ctx.tool_name
            )));
        }
        if !self.allowed.is_empty() && !self.allowed.iter().any(|n| n == &ctx.tool_name) {
            return Ok(FilterVerdict::Block(format!(
                "tool \"{}\" is not in the allowlist",
                ctx.tool_name
            )));
        }
        Ok(FilterVerdict::Allow)
    }
}

use crate::context::ToolCallContext;
use crate::pipeline::{FilterVerdict, SecurityFilter};
use async_trait::async_trait;
use sa_domain::descriptor::RiskLevel;
use sa_domain::error::Result;
use sa_domain::tool::Message;
use sa_providers::{ChatRequest, LlmProvider};
use std::sync::Arc;

/// Asks a cheap model to judge whether a medium/high risk tool call
/// looks safe, in place of the human-in-the-loop approval the risk
/// level alone can't substitute for. Only consulted when enabled and
/// the descriptor's risk warrants it; low-risk calls never pay for a
/// model round trip.
pub struct SemanticVetter {
    provider: Option<Arc<dyn LlmProvider>>,
    model: Option<String>,
    enabled: bool,
}

impl SemanticVetter {
    pub fn new(provider: Arc<dyn LlmProvider>, model: Option<String>, enabled: bool) -> Self {
        Self {
            provider: Some(provider),
            model,
            enabled,
        }
    }

    /// A vetter with no provider configured; always allows. Used when
    /// the security config doesn't enable semantic vetting at all.
    pub fn disabled() -> Self {
        Self {
            provider: None,
            model: None,
            enabled: false,
        }
    }

    fn prompt(ctx: &ToolCallContext) -> String {
        format!(
            "A tool call is about to run. Tool: {}\nArguments: {}\n\
             Answer with exactly one word: SAFE or UNSAFE.",
            ctx.tool_name, ctx.arguments
        )
    }
}

#[async_trait]
impl SecurityFilter for SemanticVetter {
    fn name(&self) -> &'static str {
        "semantic_vetter"
    }

    async fn check(&self, ctx: &ToolCallContext) -> Result<FilterVerdict> {
        let Some(provider) = (if self.enabled { self.provider.as_ref() } else { None }) else {
            return Ok(FilterVerdict::Allow);
        };
        let risk = ctx.descriptor.as_ref().map(|d| d.risk).unwrap_or(RiskLevel::Low);
        if risk < RiskLevel::Medium {
            return Ok(FilterVerdict::Allow);
        }

        let req = ChatRequest {
            messages: vec![Message::user(Self::prompt(ctx))],
            model: self.model.clone(),
            ..ChatRequest::default()
        };
        let response = provider.chat(req).await?;
        if response.content.to_uppercase().contains("UNSAFE") {
            return Ok(FilterVerdict::Block(
                "semantic vetter judged this call unsafe".into(),
            ));
        }
        Ok(FilterVerdict::Allow)
    }
}

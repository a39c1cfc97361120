use crate::context::ToolCallContext;
use async_trait::async_trait;
use sa_domain::error::{Error, Result};
use sa_domain::trace::TraceEvent;

/// One stage of the security pipeline. A filter either allows the call
/// through or blocks it with a human-readable reason; an `Err` result
/// counts as a block (fail closed) rather than propagating.
#[async_trait]
pub trait SecurityFilter: Send + Sync {
    fn name(&self) -> &'static str;
    async fn check(&self, ctx: &ToolCallContext) -> Result<FilterVerdict>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterVerdict {
    Allow,
    Block(String),
}

/// An ordered, fail-closed chain of [`SecurityFilter`]s. The first
/// filter to block short-circuits the rest.
pub struct SecurityPipeline {
    filters: Vec<Box<dyn SecurityFilter>>,
}

impl SecurityPipeline {
    pub fn new(filters: Vec<Box<dyn SecurityFilter>>) -> Self {
        Self { filters }
    }

    /// Run every filter in order. Returns `Ok(())` only if every filter
    /// allowed the call; otherwise returns the blocking filter's name
    /// and reason.
    pub async fn run(&self, ctx: &ToolCallContext) -> std::result::Result<(), (&'static str, String)> {
        for filter in &self.filters {
            let verdict = filter.check(ctx).await.unwrap_or_else(|e| {
                FilterVerdict::Block(format!("filter error, failing closed: {e}"))
            });
            let (allowed, reason) = match &verdict {
                FilterVerdict::Allow => (true, None),
                FilterVerdict::Block(reason) => (false, Some(reason.clone())),
            };
            TraceEvent::FilterDecision {
                filter: filter.name(),
                tool_name: ctx.tool_name.clone(),
                allowed,
                reason: reason.clone(),
            }
            .emit();
            if let FilterVerdict::Block(reason) = verdict {
                return Err((filter.name(), reason));
            }
        }
        Ok(())
    }
}

pub(crate) fn blocked(reason: impl Into<String>) -> Error {
    Error::Blocked(reason.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ToolCallContext;

    struct AlwaysAllow;
    #[async_trait]
    impl SecurityFilter for AlwaysAllow {
        fn name(&self) -> &'static str {
            "always_allow"
        }
        async fn check(&self, _ctx: &ToolCallContext) -> Result<FilterVerdict> {
            Ok(FilterVerdict::Allow)
        }
    }

    struct AlwaysBlock;
    #[async_trait]
    impl SecurityFilter for AlwaysBlock {
        fn name(&self) -> &'static str {
            "always_block"
        }
        async fn check(&self, _ctx: &ToolCallContext) -> Result<FilterVerdict> {
            Ok(FilterVerdict::Block("nope".into()))
        }
    }

    struct AlwaysErr;
    #[async_trait]
    impl SecurityFilter for AlwaysErr {
        fn name(&self) -> &'static str {
            "always_err"
        }
        async fn check(&self, _ctx: &ToolCallContext) -> Result<FilterVerdict> {
            Err(blocked("boom"))
        }
    }

    fn ctx() -> ToolCallContext {
        ToolCallContext {
            user_id: "u1".into(),
            tool_name: "exec".into(),
            arguments: serde_json::json!({}),
            descriptor: None,
            source_text: None,
        }
    }

    #[tokio::test]
    async fn all_allow_passes() {
        let pipeline = SecurityPipeline::new(vec![Box::new(AlwaysAllow), Box::new(AlwaysAllow)]);
        assert!(pipeline.run(&ctx()).await.is_ok());
    }

    #[tokio::test]
    async fn one_block_short_circuits() {
        let pipeline = SecurityPipeline::new(vec![
            Box::new(AlwaysAllow),
            Box::new(AlwaysBlock),
            Box::new(AlwaysAllow),
        ]);
        let (name, reason) = pipeline.run(&ctx()).await.unwrap_err();
        assert_eq!(name, "always_block");
        assert_eq!(reason, "nope");
    }

    #[tokio::test]
    async fn filter_error_fails_closed() {
        let pipeline = SecurityPipeline::new(vec![Box::new(AlwaysErr)]);
        assert!(pipeline.run(&ctx()).await.is_err());
    }
}

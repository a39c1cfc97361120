pub mod context;
pub mod executor_guard;
pub mod pattern_vetter;
pub mod pipeline;
pub mod sanitizer;
pub mod semantic_vetter;
pub mod tool_gate;

pub use context::ToolCallContext;
pub use executor_guard::ExecutorGuard;
pub use pattern_vetter::PatternVetter;
pub use pipeline::{FilterVerdict, SecurityFilter, SecurityPipeline};
pub use sanitizer::Sanitizer;
pub use semantic_vetter::SemanticVetter;
pub use tool_gate::ToolGate;

use sa_domain::config::SecurityConfig;
use sa_domain::error::Result;
use sa_providers::LlmProvider;
use std::sync::Arc;

/// Builds the standard five-stage pipeline in the order sanitizer, tool
/// gate, pattern vetter, semantic vetter, executor guard. The executor
/// guard's `check` only reports whether a permit is currently
/// obtainable; callers still need to call [`ExecutorGuard::acquire`]
/// themselves around the actual tool dispatch, so a reference to the
/// constructed guard is returned alongside the pipeline.
pub fn build_pipeline(
    config: &SecurityConfig,
    semantic_provider: Option<Arc<dyn LlmProvider>>,
    semantic_model: Option<String>,
) -> Result<(SecurityPipeline, Arc<ExecutorGuard>)> {
    let guard = Arc::new(ExecutorGuard::new(
        config.max_concurrent_per_user,
        config.tool_deadline_ms,
    ));

    let semantic_vetter: Box<dyn SecurityFilter> = match semantic_provider {
        Some(provider) => Box::new(SemanticVetter::new(
            provider,
            semantic_model,
            config.semantic_vetting_enabled,
        )),
        None => Box::new(SemanticVetter::disabled()),
    };

    let filters: Vec<Box<dyn SecurityFilter>> = vec![
        Box::new(Sanitizer::new(&config.sanitizer_patterns)?),
        Box::new(ToolGate::new(
            config.denied_tools.clone(),
            config.allowed_tools.clone(),
        )),
        Box::new(PatternVetter::new(&config.denied_patterns)?),
        semantic_vetter,
        Box::new(ExecutorGuardFilter(guard.clone())),
    ];

    Ok((SecurityPipeline::new(filters), guard))
}

/// Adapts `ExecutorGuard`'s `check`-only half into a [`SecurityFilter`]
/// without exposing `acquire` through the trait object, since `acquire`
/// must be called by the dispatcher that holds the permit.
struct ExecutorGuardFilter(Arc<ExecutorGuard>);

#[async_trait::async_trait]
impl SecurityFilter for ExecutorGuardFilter {
    fn name(&self) -> &'static str {
        "executor_guard"
    }

    async fn check(&self, ctx: &ToolCallContext) -> Result<FilterVerdict> {
        self.0.check(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::descriptor::{AllowDeny, ConcurrencyClass, RiskLevel, ToolDescriptor};

    fn descriptor() -> Arc<ToolDescriptor> {
        Arc::new(ToolDescriptor {
            name: "read_file".into(),
            version: semver::Version::new(1, 0, 0),
            description: "read a file".into(),
            input_schema: serde_json::json!({}),
            output_schema: None,
            category: "fs".into(),
            risk: RiskLevel::Low,
            idempotent: true,
            default_policy: AllowDeny::Allow,
            concurrency_class: ConcurrencyClass::new("fs"),
        })
    }

    #[tokio::test]
    async fn default_config_allows_benign_call() {
        let config = SecurityConfig::default();
        let (pipeline, _guard) = build_pipeline(&config, None, None).unwrap();
        let ctx = ToolCallContext {
            user_id: "u1".into(),
            tool_name: "read_file".into(),
            arguments: serde_json::json!({"path": "README.md"}),
            descriptor: Some(descriptor()),
            source_text: Some("please read the readme".into()),
        };
        assert!(pipeline.run(&ctx).await.is_ok());
    }

    #[tokio::test]
    async fn denied_pattern_in_arguments_blocks() {
        let config = SecurityConfig::default();
        let (pipeline, _guard) = build_pipeline(&config, None, None).unwrap();
        let ctx = ToolCallContext {
            user_id: "u1".into(),
            tool_name: "read_file".into(),
            arguments: serde_json::json!({"command": "rm -rf /"}),
            descriptor: Some(descriptor()),
            source_text: None,
        };
        assert!(pipeline.run(&ctx).await.is_err());
    }
}

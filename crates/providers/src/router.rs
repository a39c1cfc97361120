//! Capability-driven LLM router.
//!
//! The router classifies each request into a [`TaskClass`] and selects a
//! provider/model pair configured for that class. A candidate that
//! fails with a timeout or 5xx error is retried once with a short
//! back-off before the router advances to the next configured fallback.

use crate::classifier::{classify, TaskClass};
use crate::registry::ProviderRegistry;
use crate::traits::{ChatRequest, ChatResponse, LlmProvider};
use sa_domain::capability::{LlmCapabilities, ToolSupport};
use sa_domain::config::{ModelPricing, RouterConfig, TaskClassConfig};
use sa_domain::error::{Error, Result};
use sa_domain::trace::TraceEvent;
use sa_domain::usage::Usage;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Pause before the single retry of a transient provider failure.
const RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// A capability-driven router that selects providers per task class and
/// handles fallback on transient failures.
pub struct LlmRouter {
    registry: ProviderRegistry,
    classes: HashMap<String, TaskClassConfig>,
    pricing: HashMap<String, ModelPricing>,
    default_timeout_ms: u64,
    large_context_tokens: u32,
}

impl LlmRouter {
    /// Construct the router from the full router config.
    pub fn from_config(config: &RouterConfig) -> Result<Self> {
        let registry = ProviderRegistry::from_config(config)?;
        Ok(Self {
            registry,
            classes: config.classes.clone(),
            pricing: config.pricing.clone(),
            default_timeout_ms: config.default_timeout_ms,
            large_context_tokens: config.large_context_tokens,
        })
    }

    /// Build from an already-constructed registry (useful for testing).
    pub fn new(
        registry: ProviderRegistry,
        classes: HashMap<String, TaskClassConfig>,
        default_timeout_ms: u64,
        large_context_tokens: u32,
    ) -> Self {
        Self {
            registry,
            classes,
            pricing: HashMap::new(),
            default_timeout_ms,
            large_context_tokens,
        }
    }

    /// USD estimate for one response, from the configured per-model
    /// pricing table. `None` when the model isn't priced or the
    /// provider returned no usage numbers.
    fn estimated_cost(&self, provider_id: &str, model: &str, usage: Option<&Usage>) -> Option<f64> {
        let pricing = self.pricing.get(&format!("{provider_id}/{model}"))?;
        let usage = usage?;
        Some(pricing.estimate_cost(usage.prompt_tokens, usage.completion_tokens))
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Classify `req` and route it, with `reasoning_hint` forwarded
    /// verbatim to [`crate::classifier::classify`].
    pub async fn route(&self, req: ChatRequest, reasoning_hint: bool) -> Result<ChatResponse> {
        let class = classify(&req, reasoning_hint, self.large_context_tokens);
        self.chat_for_class(class, req).await
    }

    /// The `provider/model` this request would be routed to first,
    /// without sending anything. Deterministic for a given config, so
    /// callers that key caches by model can resolve the model before
    /// the cache is consulted.
    pub fn primary_model_for(&self, req: &ChatRequest, reasoning_hint: bool) -> Option<String> {
        let class = classify(req, reasoning_hint, self.large_context_tokens);
        self.classes.get(class.as_str()).map(|c| c.model.clone())
    }

    /// Send a chat request for a specific [`TaskClass`], bypassing
    /// classification (used when a caller already knows the class it
    /// wants, e.g. a fixed-tier summarizer call).
    pub async fn chat_for_class(&self, class: TaskClass, mut req: ChatRequest) -> Result<ChatResponse> {
        let class_str = class.as_str().to_string();
        let class_cfg = self
            .classes
            .get(&class_str)
            .ok_or_else(|| Error::Config(format!("no routing config for task class '{}'", class_str)))?;

        let (provider_id, model_name) = resolve_model(&class_cfg.model);
        if let Some(provider) = self.registry.get(provider_id) {
            if Self::check_capabilities(provider.capabilities(), class_cfg.require_tools, class_cfg.require_json) {
                req.model = Some(model_name.to_string());

                let start = Instant::now();
                let result = self.try_chat(&provider, &req).await;
                let duration_ms = start.elapsed().as_millis() as u64;

                match &result {
                    Ok(resp) => {
                        TraceEvent::ProviderSelected {
                            provider: provider_id.to_string(),
                            model: model_name.to_string(),
                            task_class: class_str.clone(),
                            duration_ms,
                            prompt_tokens: resp.usage.as_ref().map(|u| u.prompt_tokens),
                            completion_tokens: resp.usage.as_ref().map(|u| u.completion_tokens),
                            estimated_cost_usd: self.estimated_cost(provider_id, model_name, resp.usage.as_ref()),
                        }
                        .emit();
                        return result;
                    }
                    Err(e) if Self::is_retriable(e) => {
                        tracing::warn!(
                            provider = %provider_id,
                            model = %model_name,
                            error = %e,
                            "primary model failed, trying fallbacks"
                        );
                    }
                    Err(_) => {
                        TraceEvent::ProviderSelected {
                            provider: provider_id.to_string(),
                            model: model_name.to_string(),
                            task_class: class_str.clone(),
                            duration_ms,
                            prompt_tokens: None,
                            completion_tokens: None,
                            estimated_cost_usd: None,
                        }
                        .emit();
                        return result;
                    }
                }
            } else {
                tracing::warn!(
                    provider = %provider_id,
                    model = %model_name,
                    "primary model does not satisfy required capabilities, trying fallbacks"
                );
            }
        } else {
            tracing::warn!(provider = %provider_id, "primary provider not found in registry, trying fallbacks");
        }

        for (idx, fallback) in class_cfg.fallbacks.iter().enumerate() {
            let (fb_provider_id, fb_model_name) = resolve_model(&fallback.model);
            let fb_provider = match self.registry.get(fb_provider_id) {
                Some(p) => p,
                None => {
                    tracing::warn!(provider = %fb_provider_id, "fallback provider not found, skipping");
                    continue;
                }
            };

            if !Self::check_capabilities(fb_provider.capabilities(), fallback.require_tools, fallback.require_json) {
                tracing::warn!(provider = %fb_provider_id, "fallback does not satisfy required capabilities, skipping");
                continue;
            }

            TraceEvent::ProviderFallback {
                from_provider: provider_id.to_string(),
                from_model: model_name.to_string(),
                to_provider: fb_provider_id.to_string(),
                to_model: fb_model_name.to_string(),
                reason: "primary model failed or unavailable".to_string(),
            }
            .emit();

            req.model = Some(fb_model_name.to_string());
            let start = Instant::now();
            let result = self.try_chat(&fb_provider, &req).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            match &result {
                Ok(resp) => {
                    TraceEvent::ProviderSelected {
                        provider: fb_provider_id.to_string(),
                        model: fb_model_name.to_string(),
                        task_class: class_str.clone(),
                        duration_ms,
                        prompt_tokens: resp.usage.as_ref().map(|u| u.prompt_tokens),
                        completion_tokens: resp.usage.as_ref().map(|u| u.completion_tokens),
                        estimated_cost_usd: self.estimated_cost(fb_provider_id, fb_model_name, resp.usage.as_ref()),
                    }
                    .emit();
                    return result;
                }
                Err(e) if Self::is_retriable(e) => {
                    tracing::warn!(
                        provider = %fb_provider_id,
                        model = %fb_model_name,
                        error = %e,
                        fallback_index = %idx,
                        "fallback model failed, trying next"
                    );
                    continue;
                }
                Err(_) => {
                    TraceEvent::ProviderSelected {
                        provider: fb_provider_id.to_string(),
                        model: fb_model_name.to_string(),
                        task_class: class_str.clone(),
                        duration_ms,
                        prompt_tokens: None,
                        completion_tokens: None,
                        estimated_cost_usd: None,
                    }
                    .emit();
                    return result;
                }
            }
        }

        Err(Error::Provider {
            provider: "router".into(),
            message: format!("all models for task class '{}' failed or were unavailable", class_str),
        })
    }

    /// One attempt against a candidate, plus a single backed-off retry
    /// when the first try fails with a retriable error. Only after the
    /// retry also fails does the caller advance to the next fallback.
    async fn try_chat(&self, provider: &Arc<dyn LlmProvider>, req: &ChatRequest) -> Result<ChatResponse> {
        match self.try_chat_once(provider, req).await {
            Err(e) if Self::is_retriable(&e) => {
                tracing::warn!(
                    provider = %provider.provider_id(),
                    error = %e,
                    "transient provider error, retrying once"
                );
                tokio::time::sleep(RETRY_BACKOFF).await;
                self.try_chat_once(provider, req).await
            }
            result => result,
        }
    }

    async fn try_chat_once(&self, provider: &Arc<dyn LlmProvider>, req: &ChatRequest) -> Result<ChatResponse> {
        let timeout = std::time::Duration::from_millis(self.default_timeout_ms);
        match tokio::time::timeout(timeout, provider.chat(req.clone())).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "provider '{}' timed out after {}ms",
                provider.provider_id(),
                self.default_timeout_ms
            ))),
        }
    }

    fn check_capabilities(cap: &LlmCapabilities, require_tools: bool, require_json: bool) -> bool {
        if require_tools && cap.supports_tools == ToolSupport::None {
            return false;
        }
        if require_json && !cap.supports_json_mode {
            return false;
        }
        true
    }

    fn is_retriable(err: &Error) -> bool {
        match err {
            Error::Timeout(_) => true,
            Error::Http(_) => true,
            Error::Provider { message, .. } => {
                message.contains("HTTP 5")
                    || message.contains("HTTP 502")
                    || message.contains("HTTP 503")
                    || message.contains("HTTP 504")
                    || message.contains("HTTP 500")
                    || message.contains("HTTP 529")
            }
            _ => false,
        }
    }
}

/// Split a `"provider_id/model_name"` string into its two components.
pub fn resolve_model(model_str: &str) -> (&str, &str) {
    match model_str.split_once('/') {
        Some((provider, model)) => (provider, model),
        None => (model_str, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_model_splits_on_slash() {
        assert_eq!(resolve_model("openai/gpt-4o"), ("openai", "gpt-4o"));
    }

    #[test]
    fn resolve_model_without_slash_has_empty_model() {
        assert_eq!(resolve_model("openai"), ("openai", ""));
    }

    #[test]
    fn primary_model_for_reflects_the_classified_class() {
        let mut classes = HashMap::new();
        classes.insert(
            "trivial".to_string(),
            TaskClassConfig {
                model: "cheap/cheap-model".into(),
                require_tools: false,
                require_json: false,
                fallbacks: vec![],
            },
        );
        let router = LlmRouter::new(
            ProviderRegistry::with_providers(HashMap::new()),
            classes,
            1_000,
            8_000,
        );
        let req = ChatRequest {
            messages: vec![sa_domain::tool::Message::user("hi")],
            ..ChatRequest::default()
        };
        assert_eq!(router.primary_model_for(&req, false).as_deref(), Some("cheap/cheap-model"));
        assert_eq!(router.primary_model_for(&req, true), None);
    }
}

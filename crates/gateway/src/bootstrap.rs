//! Builds the full runtime from a loaded [`Config`]: provider registry,
//! tool catalog, security pipeline, session store, agent loop, and the
//! HTTP pump — shared by `serve`, `chat`, and `run`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use sa_agent::{AgentLoop, CancelMap};
use sa_cache::ResponseCache;
use sa_domain::config::Config;
use sa_providers::router::resolve_model;
use sa_providers::{LlmProvider, LlmRouter};
use sa_ratelimit::RateLimiter;
use sa_sessions::{JsonFilePersistence, SessionPersistence, SessionStore};
use sa_tools::build_default_registry;

use crate::pump::PlatformPump;
use crate::state::AppState;

pub async fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── LLM router + provider registry ───────────────────────────────
    let router = Arc::new(LlmRouter::from_config(&config.router).context("initializing LLM providers")?);
    if router.registry().is_empty() {
        tracing::warn!("no LLM providers initialized; chat requests will fail until auth is configured");
    } else {
        tracing::info!(providers = router.registry().len(), "LLM provider registry ready");
    }

    // ── Tool registry + reference tools ──────────────────────────────
    let (tools, jobs) = build_default_registry(&config.tools).context("registering builtin tools")?;
    let tools = Arc::new(tools);
    tracing::info!(tools = tools.len(), "tool registry ready");

    // ── Security pipeline ────────────────────────────────────────────
    // The semantic vetter borrows the trivial-class model when one is
    // configured; risk verdicts don't need a frontier tier.
    let (semantic_provider, semantic_model) = semantic_vetter_target(&config, &router);
    let (pipeline, executor_guard) =
        sa_security::build_pipeline(&config.security, semantic_provider, semantic_model)
            .context("building security pipeline")?;
    tracing::info!(
        semantic_vetting = config.security.semantic_vetting_enabled,
        "security pipeline ready"
    );

    // ── Session store ────────────────────────────────────────────────
    let persistence: Arc<dyn SessionPersistence> =
        Arc::new(JsonFilePersistence::new(config.sessions.state_dir.clone()));
    let sessions = Arc::new(
        SessionStore::new(persistence, config.sessions.clone())
            .await
            .context("initializing session store")?,
    );
    tracing::info!(path = %config.sessions.state_dir.display(), "session store ready");

    // ── Cache, rate limiter, cancellation ────────────────────────────
    let cache = Arc::new(ResponseCache::new(&config.cache));
    let ratelimiter = Arc::new(RateLimiter::new(config.ratelimit.clone()));
    let cancel_map = Arc::new(CancelMap::new());

    // ── Agent loop ───────────────────────────────────────────────────
    let agent = Arc::new(AgentLoop::new(
        router.clone(),
        tools.clone(),
        Arc::new(pipeline),
        executor_guard,
        cache.clone(),
        ratelimiter.clone(),
        sessions.clone(),
        cancel_map,
        config.agent.clone(),
    ));

    // ── HTTP pump ────────────────────────────────────────────────────
    let pump = Arc::new(
        PlatformPump::new(
            "http",
            agent.clone(),
            ratelimiter.clone(),
            &config.security,
            &config.server,
            4_000,
        )
        .context("building HTTP pump")?,
    );

    Ok(AppState {
        config,
        router,
        agent,
        sessions,
        ratelimiter,
        cache,
        tools,
        jobs,
        pump,
    })
}

/// Provider + model the semantic vetter should consult, resolved from
/// the trivial task class. `None` (vetter disabled or no usable
/// provider) leaves the pipeline running without the semantic stage.
fn semantic_vetter_target(
    config: &Config,
    router: &LlmRouter,
) -> (Option<Arc<dyn LlmProvider>>, Option<String>) {
    if !config.security.semantic_vetting_enabled {
        return (None, None);
    }
    let Some(class) = config.router.classes.get("trivial") else {
        tracing::warn!("semantic vetting enabled but no 'trivial' task class is configured; disabling");
        return (None, None);
    };
    let (provider_id, model) = resolve_model(&class.model);
    match router.registry().get(provider_id) {
        Some(provider) => (Some(provider), Some(model.to_string())),
        None => {
            tracing::warn!(provider = %provider_id, "semantic vetter provider not in registry; disabling");
            (None, None)
        }
    }
}

/// Periodic maintenance: session idle flush/eviction, rate-limit bucket
/// reclamation, and stale job cleanup.
pub fn spawn_background_tasks(state: &AppState) {
    {
        let sessions = state.sessions.clone();
        let interval_ms = state.config.sessions.sweep_interval_ms;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(interval_ms.max(1_000)));
            loop {
                interval.tick().await;
                if let Err(e) = sessions.sweep().await {
                    tracing::warn!(error = %e, "session sweep failed");
                }
            }
        });
    }

    {
        let ratelimiter = state.ratelimiter.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                ratelimiter.sweep_idle();
            }
        });
    }

    {
        let jobs = state.jobs.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                jobs.cleanup_stale();
            }
        });
    }
}

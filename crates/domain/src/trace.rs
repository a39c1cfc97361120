use serde::Serialize;

/// Structured trace events emitted across all agent runtime crates at
/// their decision points: cache hit/miss, admission allow/block,
/// filter pass/block, provider selection/fallback, session
/// flush/evict, loop iteration, pump admit/reject.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    CacheLookup {
        fingerprint: String,
        hit: bool,
        tier: &'static str,
    },
    AdmissionDecision {
        key: String,
        route: String,
        tier: Option<String>,
        allowed: bool,
        tokens_remaining: f64,
    },
    FilterDecision {
        filter: &'static str,
        tool_name: String,
        allowed: bool,
        reason: Option<String>,
    },
    ProviderSelected {
        provider: String,
        model: String,
        task_class: String,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
        estimated_cost_usd: Option<f64>,
    },
    ProviderFallback {
        from_provider: String,
        from_model: String,
        to_provider: String,
        to_model: String,
        reason: String,
    },
    SessionResolved {
        session_key: String,
        is_new: bool,
    },
    SessionFlushed {
        session_key: String,
        turns: usize,
    },
    SessionEvicted {
        session_key: String,
        idle_secs: i64,
    },
    LoopIteration {
        session_key: String,
        iteration: usize,
        tool_calls: usize,
    },
    PumpDecision {
        transport: String,
        session_key: String,
        admitted: bool,
        reason: Option<String>,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "sa_event");
    }
}

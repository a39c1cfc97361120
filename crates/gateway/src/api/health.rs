//! Lightweight health probe.

use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

// GET /v1/health — public, no auth.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "providers": state.router.registry().list_providers(),
        "tools": state.tools.len(),
        "resident_sessions": state.sessions.resident_count(),
        "ratelimit_buckets": state.ratelimiter.bucket_count(),
    }))
}

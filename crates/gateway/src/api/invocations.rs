//! Tool-invocation log endpoint.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RecentParams {
    #[serde(default = "d_limit")]
    pub limit: usize,
}

fn d_limit() -> usize {
    50
}

// GET /v1/invocations?limit=N — newest last.
pub async fn recent(
    State(state): State<AppState>,
    Query(params): Query<RecentParams>,
) -> impl IntoResponse {
    let entries = state.agent.invocations().recent(params.limit.min(500));
    Json(serde_json::json!({
        "total": state.agent.invocations().len(),
        "invocations": entries,
    }))
}

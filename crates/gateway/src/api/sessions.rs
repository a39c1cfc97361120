//! Session observation endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

// GET /v1/sessions/:user_id/history
pub async fn history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    match state.sessions.open(&user_id).await {
        Ok(handle) => {
            let turns = state.sessions.history(&handle).await;
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "user_id": user_id,
                    "turns": turns,
                })),
            )
        }
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "failed to open session for history");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "failed to load session"})),
            )
        }
    }
}

// POST /v1/sessions/:user_id/cancel — flag a running turn to stop.
pub async fn cancel(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    let found = state.agent.cancel(&user_id);
    let status = if found { StatusCode::OK } else { StatusCode::NOT_FOUND };
    (status, Json(serde_json::json!({"cancelled": found})))
}

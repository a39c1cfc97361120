//! Webhook chat endpoint — the HTTP transport's inbound edge.
//!
//! Accepts a normalized `{user_id, message}` envelope and runs it
//! through the pump like any other transport event. The reply comes
//! back in the same response, already split to the transport limit.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use crate::pump::PumpOutcome;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub user_id: String,
    pub message: String,
}

// POST /v1/chat
pub async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> impl IntoResponse {
    if body.user_id.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "user_id must not be empty"})),
        );
    }

    match state.pump.handle_event(&body.user_id, &body.message).await {
        PumpOutcome::Reply(chunks) => (
            StatusCode::OK,
            Json(serde_json::json!({"replies": chunks})),
        ),
        PumpOutcome::Rejected(message) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": message})),
        ),
        PumpOutcome::Denied(message) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({"error": message})),
        ),
        PumpOutcome::Busy(message) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"error": message})),
        ),
        PumpOutcome::Failed(message) => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({"error": message})),
        ),
    }
}

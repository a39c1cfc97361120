//! Cache administration endpoint.

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct InvalidateBody {
    /// Hex fingerprint prefix; empty clears the whole cache.
    #[serde(default)]
    pub prefix: String,
}

// POST /v1/cache/invalidate
pub async fn invalidate(
    State(state): State<AppState>,
    Json(body): Json<InvalidateBody>,
) -> impl IntoResponse {
    state.cache.invalidate(&body.prefix).await;
    Json(serde_json::json!({"invalidated": true, "prefix": body.prefix}))
}

//! HTTP surface: the webhook chat transport plus a small set of
//! observation endpoints over the running core.

pub mod cache;
pub mod chat;
pub mod health;
pub mod invocations;
pub mod sessions;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/health", get(health::health))
        .route("/v1/chat", post(chat::chat))
        .route("/v1/sessions/:user_id/history", get(sessions::history))
        .route("/v1/sessions/:user_id/cancel", post(sessions::cancel))
        .route("/v1/invocations", get(invocations::recent))
        .route("/v1/cache/invalidate", post(cache::invalidate))
        .with_state(state)
}

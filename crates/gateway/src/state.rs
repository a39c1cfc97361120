//! Shared application state handed to every HTTP handler.

use std::sync::Arc;

use sa_agent::AgentLoop;
use sa_cache::ResponseCache;
use sa_domain::config::Config;
use sa_providers::LlmRouter;
use sa_ratelimit::RateLimiter;
use sa_sessions::SessionStore;
use sa_tools::{JobTable, ToolRegistry};

use crate::pump::PlatformPump;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub router: Arc<LlmRouter>,
    pub agent: Arc<AgentLoop>,
    pub sessions: Arc<SessionStore>,
    pub ratelimiter: Arc<RateLimiter>,
    pub cache: Arc<ResponseCache>,
    pub tools: Arc<ToolRegistry>,
    pub jobs: Arc<JobTable>,
    /// The pump serving the HTTP webhook transport.
    pub pump: Arc<PlatformPump>,
}

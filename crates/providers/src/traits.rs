//! The provider contract: one blocking `chat` call per generation.
//!
//! Streaming deltas are a provider-SDK concern this runtime doesn't
//! surface — responses are always reassembled before they reach the
//! cache or a session, so the fingerprint -> payload mapping stays
//! one-to-one.

use sa_domain::capability::LlmCapabilities;
use sa_domain::error::Result;
use sa_domain::tool::{Message, ToolCall, ToolDefinition};
use sa_domain::usage::Usage;

/// A provider-agnostic chat completion request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    /// Tool definitions the model may invoke.
    pub tools: Vec<ToolDefinition>,
    /// Sampling temperature; `None` lets the provider choose.
    pub temperature: Option<f32>,
    /// Response token cap; `None` lets the provider choose.
    pub max_tokens: Option<u32>,
    /// Ask the model for valid JSON only.
    pub json_mode: bool,
    /// Model override; `None` uses the provider's default.
    pub model: Option<String>,
}

/// A provider-agnostic chat completion response.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
    /// The model that actually produced the response.
    pub model: String,
    /// Why generation stopped (e.g. "stop", "tool_calls", "length").
    pub finish_reason: Option<String>,
}

/// Implemented once per wire protocol; adapters translate between the
/// internal types above and each provider's HTTP API.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat completion request and wait for the full response.
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse>;

    /// The advertised capabilities of this provider/model combination.
    fn capabilities(&self) -> &LlmCapabilities;

    /// A unique identifier for this provider instance.
    fn provider_id(&self) -> &str;
}

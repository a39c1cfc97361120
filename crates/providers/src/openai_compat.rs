//! Adapter for OpenAI-compatible chat completion endpoints (OpenAI,
//! Ollama, vLLM, LM Studio, Together, ...).
//!
//! Auth goes through a [`KeyPool`]: each request leases a key, and a
//! 401/403/429 puts that key into cooldown before the error surfaces,
//! so multi-key deployments rotate away from throttled credentials.

use std::sync::Arc;

use serde_json::Value;

use sa_domain::capability::{LlmCapabilities, ToolSupport};
use sa_domain::config::ProviderConfig;
use sa_domain::error::{Error, Result};
use sa_domain::tool::{ContentPart, Message, MessageContent, Role, ToolCall, ToolDefinition};
use sa_domain::usage::Usage;

use crate::auth::KeyPool;
use crate::traits::{ChatRequest, ChatResponse, LlmProvider};
use crate::util::http_error;

pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    keys: Arc<KeyPool>,
    auth_header: String,
    auth_prefix: String,
    default_model: String,
    capabilities: LlmCapabilities,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn from_config(cfg: &ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(http_error)?;

        Ok(Self {
            id: cfg.id.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            keys: Arc::new(KeyPool::from_auth_config(&cfg.auth)?),
            auth_header: cfg.auth.header.clone().unwrap_or_else(|| "Authorization".into()),
            auth_prefix: cfg.auth.prefix.clone().unwrap_or_else(|| "Bearer ".into()),
            default_model: cfg.default_model.clone().unwrap_or_else(|| "gpt-4o".into()),
            capabilities: LlmCapabilities {
                supports_tools: ToolSupport::StrictJson,
                supports_json_mode: true,
                supports_vision: true,
                context_window_tokens: Some(128_000),
                max_output_tokens: Some(16_384),
            },
            client,
        })
    }

    fn request_body(&self, req: &ChatRequest) -> Value {
        let mut body = serde_json::json!({
            "model": req.model.clone().unwrap_or_else(|| self.default_model.clone()),
            "messages": req.messages.iter().map(encode_message).collect::<Vec<_>>(),
        });
        if !req.tools.is_empty() {
            body["tools"] = req.tools.iter().map(encode_tool).collect();
        }
        if let Some(temperature) = req.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        if let Some(max_tokens) = req.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if req.json_mode {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }
        body
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(&req);
        let lease = self.keys.lease();
        tracing::debug!(provider = %self.id, url = %url, "openai_compat chat request");

        let resp = self
            .client
            .post(&url)
            .header(&self.auth_header, format!("{}{}", self.auth_prefix, lease.key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(http_error)?;

        let status = resp.status();
        let text = resp.text().await.map_err(http_error)?;
        if !status.is_success() {
            if matches!(status.as_u16(), 401 | 403 | 429) {
                self.keys.mark_failed(lease.index);
            }
            return Err(Error::Provider {
                provider: self.id.clone(),
                message: format!("HTTP {} - {}", status.as_u16(), text),
            });
        }

        decode_response(&serde_json::from_str(&text)?, &self.id)
    }

    fn capabilities(&self) -> &LlmCapabilities {
        &self.capabilities
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

// ── Wire encoding ──────────────────────────────────────────────────

fn encode_message(msg: &Message) -> Value {
    match msg.role {
        Role::Assistant => encode_assistant(msg),
        Role::Tool => encode_tool_result(msg),
        Role::System => serde_json::json!({
            "role": "system",
            "content": msg.content.extract_all_text(),
        }),
        Role::User => serde_json::json!({
            "role": "user",
            "content": msg.content.extract_all_text(),
        }),
    }
}

fn encode_assistant(msg: &Message) -> Value {
    let mut text = Vec::new();
    let mut tool_calls = Vec::new();

    match &msg.content {
        MessageContent::Text(t) => text.push(t.clone()),
        MessageContent::Parts(parts) => {
            for part in parts {
                match part {
                    ContentPart::Text { text: t } => text.push(t.clone()),
                    ContentPart::ToolUse { id, name, input } => {
                        // Arguments travel as a JSON-encoded string.
                        tool_calls.push(serde_json::json!({
                            "id": id,
                            "type": "function",
                            "function": {"name": name, "arguments": input.to_string()},
                        }));
                    }
                    _ => {}
                }
            }
        }
    }

    let mut encoded = serde_json::json!({"role": "assistant"});
    encoded["content"] = if text.is_empty() {
        Value::Null
    } else {
        Value::String(text.join("\n"))
    };
    if !tool_calls.is_empty() {
        encoded["tool_calls"] = Value::Array(tool_calls);
    }
    encoded
}

fn encode_tool_result(msg: &Message) -> Value {
    if let MessageContent::Parts(parts) = &msg.content {
        for part in parts {
            if let ContentPart::ToolResult {
                tool_use_id,
                content,
                ..
            } = part
            {
                return serde_json::json!({
                    "role": "tool",
                    "tool_call_id": tool_use_id,
                    "content": content,
                });
            }
        }
    }
    serde_json::json!({
        "role": "tool",
        "tool_call_id": "",
        "content": msg.content.extract_all_text(),
    })
}

fn encode_tool(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

// ── Wire decoding ──────────────────────────────────────────────────

fn decode_response(body: &Value, provider_id: &str) -> Result<ChatResponse> {
    let message = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| Error::Provider {
            provider: provider_id.to_string(),
            message: "response carries no choices".into(),
        })?;

    let tool_calls = message
        .get("tool_calls")
        .and_then(|v| v.as_array())
        .map(|calls| calls.iter().filter_map(decode_tool_call).collect())
        .unwrap_or_default();

    let usage = body.get("usage").and_then(|u| {
        Some(Usage::new(
            u.get("prompt_tokens")?.as_u64()? as u32,
            u.get("completion_tokens")?.as_u64()? as u32,
        ))
    });

    Ok(ChatResponse {
        content: message
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        tool_calls,
        usage,
        model: body
            .get("model")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string(),
        finish_reason: body["choices"][0]
            .get("finish_reason")
            .and_then(|v| v.as_str())
            .map(String::from),
    })
}

fn decode_tool_call(call: &Value) -> Option<ToolCall> {
    let function = call.get("function")?;
    let raw_args = function.get("arguments")?.as_str().unwrap_or("{}");
    Some(ToolCall {
        call_id: call.get("id")?.as_str()?.to_string(),
        tool_name: function.get("name")?.as_str()?.to_string(),
        arguments: serde_json::from_str(raw_args)
            .unwrap_or_else(|_| Value::Object(Default::default())),
    })
}

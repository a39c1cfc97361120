//! Adapter for the Anthropic Messages API.
//!
//! Translates the internal chat types into the Messages wire format:
//! system turns are lifted into the top-level `system` field, tool
//! results travel as user-role `tool_result` blocks, and tool-use
//! blocks round-trip by id.

use serde_json::Value;

use sa_domain::capability::{LlmCapabilities, ToolSupport};
use sa_domain::config::ProviderConfig;
use sa_domain::error::{Error, Result};
use sa_domain::tool::{ContentPart, Message, MessageContent, Role, ToolCall, ToolDefinition};
use sa_domain::usage::Usage;

use crate::traits::{ChatRequest, ChatResponse, LlmProvider};
use crate::util::{http_error, resolve_api_key};

const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicProvider {
    id: String,
    base_url: String,
    api_key: String,
    default_model: String,
    capabilities: LlmCapabilities,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn from_config(cfg: &ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(http_error)?;

        Ok(Self {
            id: cfg.id.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: resolve_api_key(&cfg.auth)?,
            default_model: cfg
                .default_model
                .clone()
                .unwrap_or_else(|| "claude-sonnet-4-20250514".into()),
            capabilities: LlmCapabilities {
                supports_tools: ToolSupport::StrictJson,
                supports_json_mode: false,
                supports_vision: true,
                context_window_tokens: Some(200_000),
                max_output_tokens: Some(8_192),
            },
            client,
        })
    }

    fn request_body(&self, req: &ChatRequest) -> Value {
        let mut system = Vec::new();
        let mut messages = Vec::new();
        for msg in &req.messages {
            match msg.role {
                Role::System => system.push(msg.content.extract_all_text()),
                Role::User => messages.push(encode_user(msg)),
                Role::Assistant => messages.push(encode_assistant(msg)),
                // Tool results are user-role tool_result blocks on this API.
                Role::Tool => messages.push(encode_tool_result(msg)),
            }
        }

        let mut body = serde_json::json!({
            "model": req.model.clone().unwrap_or_else(|| self.default_model.clone()),
            "messages": messages,
            "max_tokens": req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        });
        if !system.is_empty() {
            body["system"] = Value::String(system.join("\n\n"));
        }
        if !req.tools.is_empty() {
            body["tools"] = req.tools.iter().map(encode_tool).collect();
        }
        if let Some(temperature) = req.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        body
    }
}

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.request_body(&req);
        tracing::debug!(provider = %self.id, url = %url, "anthropic chat request");

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(http_error)?;

        let status = resp.status();
        let text = resp.text().await.map_err(http_error)?;
        if !status.is_success() {
            return Err(Error::Provider {
                provider: self.id.clone(),
                message: format!("HTTP {} - {}", status.as_u16(), text),
            });
        }

        decode_response(&serde_json::from_str(&text)?)
    }

    fn capabilities(&self) -> &LlmCapabilities {
        &self.capabilities
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

// ── Wire encoding ──────────────────────────────────────────────────

fn encode_user(msg: &Message) -> Value {
    let content = match &msg.content {
        MessageContent::Text(t) => Value::String(t.clone()),
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => {
                    Some(serde_json::json!({"type": "text", "text": text}))
                }
                ContentPart::Image { url, media_type } => Some(serde_json::json!({
                    "type": "image",
                    "source": {
                        "type": "base64",
                        "media_type": media_type.as_deref().unwrap_or("image/png"),
                        "data": url,
                    }
                })),
                _ => None,
            })
            .collect(),
    };
    serde_json::json!({"role": "user", "content": content})
}

fn encode_assistant(msg: &Message) -> Value {
    let content: Vec<Value> = match &msg.content {
        MessageContent::Text(t) => vec![serde_json::json!({"type": "text", "text": t})],
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => {
                    Some(serde_json::json!({"type": "text", "text": text}))
                }
                ContentPart::ToolUse { id, name, input } => Some(serde_json::json!({
                    "type": "tool_use",
                    "id": id,
                    "name": name,
                    "input": input,
                })),
                _ => None,
            })
            .collect(),
    };
    serde_json::json!({"role": "assistant", "content": content})
}

fn encode_tool_result(msg: &Message) -> Value {
    let content: Vec<Value> = match &msg.content {
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => Some(serde_json::json!({
                    "type": "tool_result",
                    "tool_use_id": tool_use_id,
                    "content": content,
                    "is_error": is_error,
                })),
                _ => None,
            })
            .collect(),
        MessageContent::Text(t) => vec![serde_json::json!({
            "type": "tool_result",
            "tool_use_id": "",
            "content": t,
        })],
    };
    serde_json::json!({"role": "user", "content": content})
}

fn encode_tool(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "name": tool.name,
        "description": tool.description,
        "input_schema": tool.parameters,
    })
}

// ── Wire decoding ──────────────────────────────────────────────────

fn decode_response(body: &Value) -> Result<ChatResponse> {
    let empty = Vec::new();
    let blocks = body
        .get("content")
        .and_then(|v| v.as_array())
        .unwrap_or(&empty);

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for block in blocks {
        match block.get("type").and_then(|v| v.as_str()) {
            Some("text") => {
                if let Some(t) = block.get("text").and_then(|v| v.as_str()) {
                    text.push_str(t);
                }
            }
            Some("tool_use") => tool_calls.push(ToolCall {
                call_id: str_field(block, "id"),
                tool_name: str_field(block, "name"),
                arguments: block.get("input").cloned().unwrap_or_else(|| {
                    Value::Object(Default::default())
                }),
            }),
            _ => {}
        }
    }

    // Normalize stop reasons to the OpenAI-style vocabulary the rest of
    // the runtime matches on.
    let finish_reason = body
        .get("stop_reason")
        .and_then(|v| v.as_str())
        .map(|s| match s {
            "end_turn" => "stop".to_string(),
            "tool_use" => "tool_calls".to_string(),
            other => other.to_string(),
        });

    let usage = body.get("usage").and_then(|u| {
        Some(Usage::new(
            u.get("input_tokens")?.as_u64()? as u32,
            u.get("output_tokens")?.as_u64()? as u32,
        ))
    });

    Ok(ChatResponse {
        content: text,
        tool_calls,
        usage,
        model: str_field(body, "model"),
        finish_reason,
    })
}

fn str_field(v: &Value, key: &str) -> String {
    v.get(key).and_then(|v| v.as_str()).unwrap_or("").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_results_become_user_role_blocks() {
        let msg = Message::tool_result("call-7", "listing done");
        let encoded = encode_tool_result(&msg);
        assert_eq!(encoded["role"], "user");
        assert_eq!(encoded["content"][0]["type"], "tool_result");
        assert_eq!(encoded["content"][0]["tool_use_id"], "call-7");
    }

    #[test]
    fn assistant_tool_use_round_trips_id_and_input() {
        let msg = Message {
            role: Role::Assistant,
            content: MessageContent::Parts(vec![ContentPart::ToolUse {
                id: "call-1".into(),
                name: "exec".into(),
                input: serde_json::json!({"command": "ls"}),
            }]),
        };
        let encoded = encode_assistant(&msg);
        assert_eq!(encoded["content"][0]["type"], "tool_use");
        assert_eq!(encoded["content"][0]["id"], "call-1");
        assert_eq!(encoded["content"][0]["input"]["command"], "ls");
    }

    #[test]
    fn decode_maps_stop_reasons_to_common_vocabulary() {
        let body = serde_json::json!({
            "model": "claude-test",
            "stop_reason": "end_turn",
            "content": [{"type": "text", "text": "hi"}],
            "usage": {"input_tokens": 10, "output_tokens": 2},
        });
        let resp = decode_response(&body).unwrap();
        assert_eq!(resp.finish_reason.as_deref(), Some("stop"));
        assert_eq!(resp.content, "hi");
        assert_eq!(resp.usage.unwrap().total_tokens, 12);
    }

    #[test]
    fn decode_collects_tool_use_blocks() {
        let body = serde_json::json!({
            "model": "claude-test",
            "stop_reason": "tool_use",
            "content": [
                {"type": "text", "text": "let me check"},
                {"type": "tool_use", "id": "c1", "name": "file_list", "input": {"path": "."}},
            ],
        });
        let resp = decode_response(&body).unwrap();
        assert_eq!(resp.finish_reason.as_deref(), Some("tool_calls"));
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].tool_name, "file_list");
    }
}

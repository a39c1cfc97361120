//! Turns a session's history plus the enabled tool catalog into a
//! provider-agnostic [`ChatRequest`], and a provider response back into
//! a [`Turn`] ready to append.

use sa_domain::tool::{ContentPart, Message, MessageContent, Role, ToolDefinition, Turn};
use sa_providers::ChatResponse;
use sa_tools::ToolRegistry;

/// Build the message list for one LLM call: a system message followed
/// by the session's ordered history. The caller's current-turn user
/// message must already be appended to `history` before calling this —
/// there is no separate "pending user text" slot.
pub fn build_messages(system_prompt: &str, history: &[Turn]) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(Message::system(system_prompt));
    messages.extend(history.iter().map(|turn| turn.message.clone()));
    messages
}

/// Soft cap on request size: keep only the most recent `cap` turns.
/// The window start then skips forward past any tool-result turns whose
/// originating assistant turn fell outside the window, so a request
/// never opens mid-tool-exchange. The full history stays in the store.
pub fn trim_history(history: &[Turn], cap: usize) -> &[Turn] {
    if cap == 0 || history.len() <= cap {
        return history;
    }
    let mut start = history.len() - cap;
    while start < history.len() && history[start].message.role == Role::Tool {
        start += 1;
    }
    &history[start..]
}

/// Tool-use ids from assistant turns that no later tool-result turn
/// answers. Non-empty only after a crash or eviction mid-dispatch; the
/// loop settles these with synthetic timeout results before its next
/// model call so the history is well formed again.
pub fn unresolved_tool_use_ids(history: &[Turn]) -> Vec<String> {
    let mut pending: Vec<String> = Vec::new();
    for turn in history {
        if let MessageContent::Parts(parts) = &turn.message.content {
            for part in parts {
                match part {
                    ContentPart::ToolUse { id, .. } if turn.message.role == Role::Assistant => {
                        pending.push(id.clone());
                    }
                    ContentPart::ToolResult { tool_use_id, .. } => {
                        pending.retain(|id| id != tool_use_id);
                    }
                    _ => {}
                }
            }
        }
    }
    pending
}

/// Tool definitions for every tool currently enabled in `registry`, in
/// the shape an [`sa_providers::LlmProvider`] expects.
pub fn tool_definitions(registry: &ToolRegistry) -> Vec<ToolDefinition> {
    registry
        .list_descriptors()
        .into_iter()
        .map(|d| ToolDefinition {
            name: d.name.clone(),
            description: d.description.clone(),
            parameters: d.input_schema.clone(),
        })
        .collect()
}

/// Convert a model response into the assistant [`Turn`] to append.
/// A text-only response becomes a plain text message; a response
/// carrying tool calls becomes a parts message so the tool-use blocks
/// round-trip back into a later request exactly as the model emitted
/// them.
pub fn assistant_turn(response: &ChatResponse) -> Turn {
    if response.tool_calls.is_empty() {
        return Turn::new(Message::assistant(response.content.clone()));
    }

    let mut parts = Vec::with_capacity(response.tool_calls.len() + 1);
    if !response.content.is_empty() {
        parts.push(ContentPart::Text {
            text: response.content.clone(),
        });
    }
    for call in &response.tool_calls {
        parts.push(ContentPart::ToolUse {
            id: call.call_id.clone(),
            name: call.tool_name.clone(),
            input: call.arguments.clone(),
        });
    }

    Turn::new(Message {
        role: Role::Assistant,
        content: MessageContent::Parts(parts),
    })
}

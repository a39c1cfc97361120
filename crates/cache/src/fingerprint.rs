use sa_domain::tool::{ContentPart, Message, MessageContent, Role};
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 hash of a canonicalized request, used as a cache key.
///
/// Canonicalization preserves message order (it's semantically
/// significant) but strips everything that varies between two requests
/// an operator would consider "the same prompt": tool-use/result
/// correlation ids and any embedded timestamps, and lowercases role
/// tokens so `"User"`/`"user"` hash identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub [u8; 32]);

impl Fingerprint {
    pub fn compute(messages: &[Message], model: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(model.as_bytes());
        hasher.update(b"\0");
        for message in messages {
            hasher.update(role_token(message.role).as_bytes());
            hasher.update(b":");
            hasher.update(canonical_content(&message.content).as_bytes());
            hasher.update(b"\n");
        }
        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Fingerprint(bytes)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

fn role_token(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

/// Canonical text for one message's content: text parts concatenated,
/// tool-use/tool-result parts reduced to `name`/`input` or `content`
/// with the correlation id (`tool_use_id`/`id`, which is per-request
/// and would otherwise make every request unique) stripped out.
fn canonical_content(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(t) => t.clone(),
        MessageContent::Parts(parts) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => text.clone(),
                ContentPart::ToolUse { name, input, .. } => format!("tool_use:{name}:{input}"),
                ContentPart::ToolResult {
                    content, is_error, ..
                } => format!("tool_result:{is_error}:{content}"),
                ContentPart::Image { media_type, .. } => {
                    format!("image:{}", media_type.as_deref().unwrap_or(""))
                }
            })
            .collect::<Vec<_>>()
            .join("\u{1}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_messages_hash_identically() {
        let a = [Message::user("hello")];
        let b = [Message::user("hello")];
        assert_eq!(
            Fingerprint::compute(&a, "gpt-4o"),
            Fingerprint::compute(&b, "gpt-4o")
        );
    }

    #[test]
    fn different_model_changes_hash() {
        let m = [Message::user("hello")];
        assert_ne!(
            Fingerprint::compute(&m, "gpt-4o"),
            Fingerprint::compute(&m, "claude-3")
        );
    }

    #[test]
    fn message_order_is_significant() {
        let a = [Message::user("one"), Message::user("two")];
        let b = [Message::user("two"), Message::user("one")];
        assert_ne!(
            Fingerprint::compute(&a, "gpt-4o"),
            Fingerprint::compute(&b, "gpt-4o")
        );
    }

    #[test]
    fn tool_use_id_does_not_affect_hash() {
        let a = [Message::tool_result("call_1", "42")];
        let b = [Message::tool_result("call_2", "42")];
        assert_eq!(
            Fingerprint::compute(&a, "gpt-4o"),
            Fingerprint::compute(&b, "gpt-4o")
        );
    }

    #[test]
    fn display_is_hex() {
        let fp = Fingerprint::compute(&[Message::user("hi")], "m");
        let s = fp.to_string();
        assert_eq!(s.len(), 64);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
    }
}

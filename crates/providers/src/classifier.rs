//! Synchronous heuristic task classifier for LLM routing.
//!
//! Maps a [`ChatRequest`] to a [`TaskClass`] using cheap, local signals
//! (message count/length, tool definitions, code-fence density, an
//! explicit reasoning hint) instead of the embedding-endpoint + cosine
//! similarity scheme this replaces: the same role (map request -> tier)
//! is kept, the mechanism is inlined so routing never depends on an
//! external embedding service being reachable.

use crate::traits::ChatRequest;

/// Coarse bucket a chat request is routed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
    /// Very short, single-turn, no tools — cheapest model.
    Trivial,
    /// Ordinary conversation.
    Chat,
    /// Looks like a coding task (code fences, file paths, stack traces).
    Code,
    /// Explicitly flagged as needing a reasoning-tier model.
    Reasoning,
    /// Request carries tool definitions the model may invoke.
    ToolUse,
    /// Prompt is large enough to need a large-context model.
    LargeContext,
}

impl TaskClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskClass::Trivial => "trivial",
            TaskClass::Chat => "chat",
            TaskClass::Code => "code",
            TaskClass::Reasoning => "reasoning",
            TaskClass::ToolUse => "tool_use",
            TaskClass::LargeContext => "large_context",
        }
    }
}

const CHARS_PER_TOKEN: usize = 4;
const TRIVIAL_CHAR_THRESHOLD: usize = 120;
const CODE_MARKERS: &[&str] = &["```", "fn ", "def ", "class ", "import ", "SyntaxError", "Traceback"];

/// Classify a request. `reasoning_hint` lets a caller force the
/// `Reasoning` class (e.g. an explicit "think step by step" directive)
/// without the classifier having to parse it out of free text.
/// `large_context_tokens` is the configured threshold above which a
/// request is always `LargeContext` regardless of other signals.
pub fn classify(req: &ChatRequest, reasoning_hint: bool, large_context_tokens: u32) -> TaskClass {
    let total_chars: usize = req.messages.iter().map(|m| m.content.extract_all_text().len()).sum();
    let estimated_tokens = (total_chars / CHARS_PER_TOKEN) as u32;

    if estimated_tokens >= large_context_tokens {
        return TaskClass::LargeContext;
    }
    if reasoning_hint {
        return TaskClass::Reasoning;
    }
    if !req.tools.is_empty() {
        return TaskClass::ToolUse;
    }

    let combined: String = req
        .messages
        .iter()
        .map(|m| m.content.extract_all_text())
        .collect::<Vec<_>>()
        .join("\n");
    if CODE_MARKERS.iter().any(|marker| combined.contains(marker)) {
        return TaskClass::Code;
    }

    if req.messages.len() <= 1 && total_chars <= TRIVIAL_CHAR_THRESHOLD {
        TaskClass::Trivial
    } else {
        TaskClass::Chat
    }
}

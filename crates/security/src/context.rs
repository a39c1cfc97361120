use sa_domain::descriptor::ToolDescriptor;
use std::sync::Arc;

/// Everything a [`crate::SecurityFilter`] needs to judge one tool call.
pub struct ToolCallContext {
    pub user_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
    /// `None` when the tool name doesn't resolve in the registry — the
    /// tool gate filter is responsible for blocking that case, filters
    /// after it should treat a missing descriptor as "unknown, deny".
    pub descriptor: Option<Arc<ToolDescriptor>>,
    /// The user-authored text that led to this tool call, when
    /// available, for the sanitizer's injection scan.
    pub source_text: Option<String>,
}

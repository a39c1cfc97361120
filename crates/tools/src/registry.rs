//! In-memory tool catalog + dispatch table.
//!
//! Mirrors the shape of a skills catalog: an `RwLock`-guarded map from
//! name to metadata, plus a separate map from name to the handler that
//! actually executes a call. The two are kept in lockstep by `register`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use sa_domain::descriptor::ToolDescriptor;
use sa_domain::error::{Error, Result};

/// Executes one tool's calls. Implementors own whatever state the tool
/// needs (a process manager, a workspace root, ...).
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the tool against already-validated JSON input, returning the
    /// JSON result or a human-readable error string. Security filtering
    /// and outcome bookkeeping happen above this layer.
    async fn invoke(&self, input: serde_json::Value) -> std::result::Result<serde_json::Value, String>;
}

struct ToolEntry {
    descriptor: Arc<ToolDescriptor>,
    handler: Arc<dyn ToolHandler>,
}

/// Catalog of tools available to the agent loop.
///
/// Registration enforces exactly one enabled version per name: a second
/// `register` call for a name already present fails unless the existing
/// entry is retired first.
pub struct ToolRegistry {
    entries: RwLock<HashMap<String, ToolEntry>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Register a tool. Fails if a tool with the same name is already
    /// registered and not retired.
    pub fn register(&self, descriptor: ToolDescriptor, handler: Arc<dyn ToolHandler>) -> Result<()> {
        let mut entries = self.entries.write();
        if entries.contains_key(&descriptor.name) {
            return Err(Error::Config(format!(
                "tool '{}' is already registered; retire it before re-registering",
                descriptor.name
            )));
        }
        entries.insert(
            descriptor.name.clone(),
            ToolEntry {
                descriptor: Arc::new(descriptor),
                handler,
            },
        );
        Ok(())
    }

    /// Remove a tool from the catalog, freeing its name for re-registration.
    pub fn retire(&self, name: &str) -> bool {
        self.entries.write().remove(name).is_some()
    }

    pub fn descriptor(&self, name: &str) -> Option<Arc<ToolDescriptor>> {
        self.entries.read().get(name).map(|e| e.descriptor.clone())
    }

    /// All registered descriptors, sorted by name, for presenting to the LLM.
    pub fn list_descriptors(&self) -> Vec<Arc<ToolDescriptor>> {
        let entries = self.entries.read();
        let mut list: Vec<Arc<ToolDescriptor>> = entries.values().map(|e| e.descriptor.clone()).collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    /// Dispatch a call by name. Errors if the name isn't registered or
    /// the input fails the descriptor's schema; otherwise forwards to
    /// the handler and surfaces its result/error verbatim.
    pub async fn dispatch(&self, name: &str, input: serde_json::Value) -> std::result::Result<serde_json::Value, String> {
        let (descriptor, handler) = {
            let entries = self.entries.read();
            match entries.get(name) {
                Some(e) => (e.descriptor.clone(), e.handler.clone()),
                None => return Err(format!("tool '{name}' is not registered")),
            }
        };
        validate_input(&descriptor, &input)?;
        handler.invoke(input).await
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Shallow check of `input` against the descriptor's input schema:
/// object-typed schemas require an object payload carrying every
/// `required` field. Deeper constraints are left to the handler.
fn validate_input(
    descriptor: &ToolDescriptor,
    input: &serde_json::Value,
) -> std::result::Result<(), String> {
    let schema = &descriptor.input_schema;
    if schema.get("type").and_then(|t| t.as_str()) != Some("object") {
        return Ok(());
    }
    let Some(obj) = input.as_object() else {
        return Err(format!(
            "validation: tool '{}' expects a JSON object input",
            descriptor.name
        ));
    };
    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for field in required.iter().filter_map(|f| f.as_str()) {
            if !obj.contains_key(field) {
                return Err(format!(
                    "validation: tool '{}' input is missing required field '{field}'",
                    descriptor.name
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::descriptor::{AllowDeny, ConcurrencyClass, RiskLevel};
    use semver::Version;

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        async fn invoke(&self, input: serde_json::Value) -> std::result::Result<serde_json::Value, String> {
            Ok(input)
        }
    }

    fn descriptor(name: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: name.into(),
            version: Version::new(1, 0, 0),
            description: "echoes its input".into(),
            input_schema: serde_json::json!({"type": "object"}),
            output_schema: None,
            category: "test".into(),
            risk: RiskLevel::Low,
            idempotent: true,
            default_policy: AllowDeny::Allow,
            concurrency_class: ConcurrencyClass::new("test"),
        }
    }

    #[test]
    fn register_then_lookup_descriptor() {
        let reg = ToolRegistry::new();
        reg.register(descriptor("echo"), Arc::new(Echo)).unwrap();
        assert!(reg.descriptor("echo").is_some());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn duplicate_register_without_retire_fails() {
        let reg = ToolRegistry::new();
        reg.register(descriptor("echo"), Arc::new(Echo)).unwrap();
        let err = reg.register(descriptor("echo"), Arc::new(Echo)).unwrap_err();
        assert!(err.to_string().contains("already registered"));
    }

    #[test]
    fn retire_then_reregister_succeeds() {
        let reg = ToolRegistry::new();
        reg.register(descriptor("echo"), Arc::new(Echo)).unwrap();
        assert!(reg.retire("echo"));
        reg.register(descriptor("echo"), Arc::new(Echo)).unwrap();
        assert_eq!(reg.len(), 1);
    }

    #[tokio::test]
    async fn dispatch_unknown_tool_errors() {
        let reg = ToolRegistry::new();
        let result = reg.dispatch("missing", serde_json::json!({})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn dispatch_known_tool_runs_handler() {
        let reg = ToolRegistry::new();
        reg.register(descriptor("echo"), Arc::new(Echo)).unwrap();
        let result = reg.dispatch("echo", serde_json::json!({"x": 1})).await.unwrap();
        assert_eq!(result, serde_json::json!({"x": 1}));
    }

    fn descriptor_with_required(name: &str) -> ToolDescriptor {
        let mut d = descriptor(name);
        d.input_schema = serde_json::json!({
            "type": "object",
            "properties": {"path": {"type": "string"}},
            "required": ["path"]
        });
        d
    }

    #[tokio::test]
    async fn dispatch_missing_required_field_is_validation_error() {
        let reg = ToolRegistry::new();
        reg.register(descriptor_with_required("read"), Arc::new(Echo)).unwrap();
        let err = reg.dispatch("read", serde_json::json!({})).await.unwrap_err();
        assert!(err.contains("validation"), "got: {err}");
        assert!(err.contains("path"));
    }

    #[tokio::test]
    async fn dispatch_non_object_input_is_validation_error() {
        let reg = ToolRegistry::new();
        reg.register(descriptor_with_required("read"), Arc::new(Echo)).unwrap();
        let err = reg.dispatch("read", serde_json::json!("just a string")).await.unwrap_err();
        assert!(err.contains("validation"), "got: {err}");
    }
}

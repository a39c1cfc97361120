//! Builds a [`ToolRegistry`] pre-populated with the reference tool set:
//! `exec`, `jobs`, and the six file operations.

use std::sync::Arc;

use semver::Version;

use sa_domain::config::ToolsConfig;
use sa_domain::descriptor::{AllowDeny, ConcurrencyClass, RiskLevel, ToolDescriptor};
use sa_domain::error::Result;

use crate::file_ops::Workspace;
use crate::handlers::{
    FileAppendHandler, FileDeleteHandler, FileListHandler, FileMoveHandler, FileReadHandler,
    FileWriteHandler, JobsHandler, ShellHandler,
};
use crate::registry::ToolRegistry;
use crate::shell::JobTable;

fn descriptor(
    name: &str,
    description: &str,
    input_schema: serde_json::Value,
    risk: RiskLevel,
    idempotent: bool,
    concurrency_class: &str,
) -> ToolDescriptor {
    ToolDescriptor {
        name: name.into(),
        version: Version::new(1, 0, 0),
        description: description.into(),
        input_schema,
        output_schema: None,
        category: "builtin".into(),
        risk,
        idempotent,
        default_policy: AllowDeny::Allow,
        concurrency_class: ConcurrencyClass::new(concurrency_class),
    }
}

/// Register the reference tools against `config` and return both the
/// registry and the shared [`JobTable`] (the gateway's maintenance
/// sweep needs direct access to the latter).
pub fn build_default_registry(config: &ToolsConfig) -> Result<(ToolRegistry, Arc<JobTable>)> {
    let jobs = Arc::new(JobTable::new(config.exec.clone()));
    let registry = ToolRegistry::new();

    registry.register(
        descriptor(
            "exec",
            "Run a shell command, foreground or backgrounded as a job",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string"},
                    "background": {"type": "boolean"},
                    "yield_ms": {"type": "integer"},
                    "timeout_sec": {"type": "integer"},
                    "workdir": {"type": "string"},
                    "env": {"type": "object"}
                },
                "required": ["command"]
            }),
            RiskLevel::High,
            false,
            "exec",
        ),
        Arc::new(ShellHandler::new(jobs.clone())),
    )?;

    registry.register(
        descriptor(
            "jobs",
            "Inspect and manage background jobs started by exec",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "action": {"type": "string", "enum": ["list", "poll", "log", "kill", "clear", "remove"]},
                    "job_id": {"type": "string"},
                    "offset": {"type": "integer"},
                    "limit": {"type": "integer"},
                    "tail_lines": {"type": "integer"}
                },
                "required": ["action"]
            }),
            RiskLevel::Medium,
            false,
            "exec",
        ),
        Arc::new(JobsHandler::new(jobs.clone())),
    )?;

    let workspace = Arc::new(Workspace::new(config.workspace_root.clone()));

    registry.register(
        descriptor(
            "file_read",
            "Read a file within the workspace",
            serde_json::json!({
                "type": "object",
                "properties": {"path": {"type": "string"}, "offset": {"type": "integer"}, "limit": {"type": "integer"}},
                "required": ["path"]
            }),
            RiskLevel::Low,
            true,
            "file_io",
        ),
        Arc::new(FileReadHandler::new(workspace.clone())),
    )?;

    registry.register(
        descriptor(
            "file_write",
            "Write (create or overwrite) a file within the workspace",
            serde_json::json!({
                "type": "object",
                "properties": {"path": {"type": "string"}, "content": {"type": "string"}},
                "required": ["path", "content"]
            }),
            RiskLevel::Medium,
            false,
            "file_io",
        ),
        Arc::new(FileWriteHandler::new(workspace.clone())),
    )?;

    registry.register(
        descriptor(
            "file_append",
            "Append content to a file within the workspace",
            serde_json::json!({
                "type": "object",
                "properties": {"path": {"type": "string"}, "content": {"type": "string"}},
                "required": ["path", "content"]
            }),
            RiskLevel::Medium,
            false,
            "file_io",
        ),
        Arc::new(FileAppendHandler::new(workspace.clone())),
    )?;

    registry.register(
        descriptor(
            "file_move",
            "Move or rename a file within the workspace",
            serde_json::json!({
                "type": "object",
                "properties": {"source": {"type": "string"}, "destination": {"type": "string"}},
                "required": ["source", "destination"]
            }),
            RiskLevel::Medium,
            false,
            "file_io",
        ),
        Arc::new(FileMoveHandler::new(workspace.clone())),
    )?;

    registry.register(
        descriptor(
            "file_delete",
            "Delete a file or empty directory within the workspace",
            serde_json::json!({
                "type": "object",
                "properties": {"path": {"type": "string"}},
                "required": ["path"]
            }),
            RiskLevel::High,
            false,
            "file_io",
        ),
        Arc::new(FileDeleteHandler::new(workspace.clone())),
    )?;

    registry.register(
        descriptor(
            "file_list",
            "List directory contents within the workspace",
            serde_json::json!({
                "type": "object",
                "properties": {"path": {"type": "string"}}
            }),
            RiskLevel::Low,
            true,
            "file_io",
        ),
        Arc::new(FileListHandler::new(workspace)),
    )?;

    Ok((registry, jobs))
}

//! Reference tool implementations and the registry that dispatches them.
//!
//! `shell`/`jobs` implement a command runner with auto-backgrounding
//! and job management; `file_ops` implements a workspace-sandboxed file
//! toolkit. [`registry::ToolRegistry`] holds the catalog the agent loop
//! presents to the LLM and dispatches calls through.

pub mod builtin;
pub mod file_ops;
pub mod handlers;
pub mod jobs;
pub mod registry;
pub mod shell;

pub use builtin::build_default_registry;
pub use file_ops::Workspace;
pub use registry::{ToolHandler, ToolRegistry};
pub use shell::JobTable;

//! [`ToolHandler`] adapters wiring the shell/jobs/file tools into the
//! registry's dispatch-by-name interface.

use std::sync::Arc;

use async_trait::async_trait;

use crate::file_ops::{DeleteArgs, ListArgs, ReadArgs, RenameArgs, Workspace, WriteArgs};
use crate::jobs::{manage_jobs, JobsArgs};
use crate::registry::ToolHandler;
use crate::shell::{run_shell, JobTable, ShellArgs};

pub struct ShellHandler {
    table: Arc<JobTable>,
}

impl ShellHandler {
    pub fn new(table: Arc<JobTable>) -> Self {
        Self { table }
    }
}

#[async_trait]
impl ToolHandler for ShellHandler {
    async fn invoke(&self, input: serde_json::Value) -> Result<serde_json::Value, String> {
        let args: ShellArgs = serde_json::from_value(input).map_err(|e| e.to_string())?;
        run_shell(&self.table, args).await
    }
}

pub struct JobsHandler {
    table: Arc<JobTable>,
}

impl JobsHandler {
    pub fn new(table: Arc<JobTable>) -> Self {
        Self { table }
    }
}

#[async_trait]
impl ToolHandler for JobsHandler {
    async fn invoke(&self, input: serde_json::Value) -> Result<serde_json::Value, String> {
        let args: JobsArgs = serde_json::from_value(input).map_err(|e| e.to_string())?;
        manage_jobs(&self.table, args).await
    }
}

macro_rules! workspace_handler {
    ($name:ident, $args:ty, $method:ident) => {
        pub struct $name {
            workspace: Arc<Workspace>,
        }

        impl $name {
            pub fn new(workspace: Arc<Workspace>) -> Self {
                Self { workspace }
            }
        }

        #[async_trait]
        impl ToolHandler for $name {
            async fn invoke(&self, input: serde_json::Value) -> Result<serde_json::Value, String> {
                let args: $args = serde_json::from_value(input).map_err(|e| e.to_string())?;
                self.workspace.$method(args).await
            }
        }
    };
}

workspace_handler!(FileReadHandler, ReadArgs, read);
workspace_handler!(FileWriteHandler, WriteArgs, write);
workspace_handler!(FileAppendHandler, WriteArgs, append);
workspace_handler!(FileMoveHandler, RenameArgs, rename);
workspace_handler!(FileDeleteHandler, DeleteArgs, delete);
workspace_handler!(FileListHandler, ListArgs, list);

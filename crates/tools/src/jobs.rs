//! Jobs tool: inspect and manage background jobs started by the shell
//! tool. Actions: list, poll, log, kill, clear, remove.

use serde::Deserialize;
use serde_json::Value;

use crate::shell::JobTable;

#[derive(Debug, Clone, Deserialize)]
pub struct JobsArgs {
    pub action: JobsAction,
    /// Required for everything except `list` and `clear`.
    #[serde(default)]
    pub job_id: Option<String>,
    /// For `poll`/`log`: byte offset to read from.
    #[serde(default)]
    pub offset: Option<usize>,
    /// For `log`: byte limit.
    #[serde(default)]
    pub limit: Option<usize>,
    /// For `log`: number of tail lines (default 200).
    #[serde(default)]
    pub tail_lines: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobsAction {
    List,
    Poll,
    Log,
    Kill,
    Clear,
    Remove,
}

fn require_id(args: &JobsArgs) -> Result<&str, String> {
    args.job_id
        .as_deref()
        .ok_or_else(|| format!("job_id is required for {:?}", args.action).to_lowercase())
}

pub async fn manage_jobs(table: &JobTable, args: JobsArgs) -> Result<Value, String> {
    match args.action {
        JobsAction::List => {
            let jobs = table.overview();
            Ok(serde_json::json!({"jobs": jobs, "count": jobs.len()}))
        }
        JobsAction::Poll => {
            let id = require_id(&args)?;
            let poll = table
                .poll(id, args.offset.unwrap_or(0))
                .ok_or_else(|| format!("no job with id '{id}'"))?;
            serde_json::to_value(poll).map_err(|e| e.to_string())
        }
        JobsAction::Log => {
            let id = require_id(&args)?;
            let log = table
                .read_log(id, args.offset, args.limit, args.tail_lines)
                .ok_or_else(|| format!("no job with id '{id}'"))?;
            Ok(serde_json::json!({"log": log}))
        }
        JobsAction::Kill => {
            let id = require_id(&args)?;
            if table.kill(id) {
                Ok(serde_json::json!({"killed": true}))
            } else {
                Err(format!("job '{id}' not found or not running"))
            }
        }
        JobsAction::Clear => {
            Ok(serde_json::json!({"cleared": table.clear_finished()}))
        }
        JobsAction::Remove => {
            let id = require_id(&args)?;
            if table.remove(id) {
                Ok(serde_json::json!({"removed": true}))
            } else {
                Err(format!("no job with id '{id}'"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::{run_shell, ShellArgs};
    use sa_domain::config::ExecConfig;

    fn table() -> JobTable {
        JobTable::new(ExecConfig::default())
    }

    async fn background_echo(table: &JobTable, text: &str) -> String {
        let result = run_shell(
            table,
            ShellArgs {
                command: format!("echo {text}"),
                background: true,
                yield_ms: None,
                timeout_sec: None,
                workdir: None,
                env: None,
            },
        )
        .await
        .unwrap();
        result["job_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn list_shows_started_jobs() {
        let table = table();
        background_echo(&table, "one").await;
        let result = manage_jobs(
            &table,
            JobsArgs {
                action: JobsAction::List,
                job_id: None,
                offset: None,
                limit: None,
                tail_lines: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(result["count"], 1);
    }

    #[tokio::test]
    async fn poll_without_job_id_is_an_error() {
        let table = table();
        let err = manage_jobs(
            &table,
            JobsArgs {
                action: JobsAction::Poll,
                job_id: None,
                offset: None,
                limit: None,
                tail_lines: None,
            },
        )
        .await
        .unwrap_err();
        assert!(err.contains("job_id"));
    }

    #[tokio::test]
    async fn log_returns_job_output() {
        let table = table();
        let id = background_echo(&table, "captured").await;
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        let result = manage_jobs(
            &table,
            JobsArgs {
                action: JobsAction::Log,
                job_id: Some(id),
                offset: None,
                limit: None,
                tail_lines: None,
            },
        )
        .await
        .unwrap();
        assert!(result["log"].as_str().unwrap().contains("captured"));
    }

    #[tokio::test]
    async fn unknown_job_id_errors() {
        let table = table();
        let err = manage_jobs(
            &table,
            JobsArgs {
                action: JobsAction::Remove,
                job_id: Some("no-such-job".into()),
                offset: None,
                limit: None,
                tail_lines: None,
            },
        )
        .await
        .unwrap_err();
        assert!(err.contains("no-such-job"));
    }
}

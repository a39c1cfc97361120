//! Shell tool: run a command in the foreground, or as a background job
//! the model can poll later.
//!
//! A foreground run waits up to `yield_ms`; if the command is still
//! going, it is promoted to a background job and the caller gets the
//! job id plus the output so far. Background jobs live in a [`JobTable`]
//! until cleared, removed, or aged out.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, Notify};

use sa_domain::config::ExecConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Exited,
    Killed,
    TimedOut,
    SpawnFailed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

/// Combined stdout+stderr of one job, byte-capped. Overflow drops the
/// oldest quarter at a char boundary so the tail stays readable.
pub struct JobLog {
    buf: String,
    cap: usize,
}

impl JobLog {
    pub fn new(cap: usize) -> Self {
        Self {
            buf: String::new(),
            cap,
        }
    }

    pub fn push(&mut self, text: &str) {
        self.buf.push_str(text);
        if self.buf.len() > self.cap {
            let mut cut = self.buf.len() - self.cap * 3 / 4;
            while cut < self.buf.len() && !self.buf.is_char_boundary(cut) {
                cut += 1;
            }
            self.buf.drain(..cut);
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Everything appended after byte `offset` (clamped).
    pub fn since(&self, offset: usize) -> &str {
        &self.buf[offset.min(self.buf.len())..]
    }

    /// A byte window, for paged log reads.
    pub fn window(&self, offset: usize, limit: Option<usize>) -> &str {
        let start = offset.min(self.buf.len());
        let end = limit.map_or(self.buf.len(), |l| (start + l).min(self.buf.len()));
        &self.buf[start..end]
    }

    /// The last `lines` lines.
    pub fn tail(&self, lines: usize) -> String {
        let all: Vec<&str> = self.buf.lines().collect();
        if all.len() <= lines {
            self.buf.clone()
        } else {
            all[all.len() - lines..].join("\n")
        }
    }
}

/// One tracked command: live while running, kept after exit so its
/// output can still be read.
pub struct Job {
    pub id: String,
    pub command: String,
    pub workdir: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub exit_code: Option<i32>,
    pub log: JobLog,
    kill: Option<mpsc::Sender<()>>,
}

/// Summary row for job listings.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub id: String,
    pub command: String,
    pub status: JobStatus,
    pub exit_code: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub log_bytes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobPoll {
    pub status: JobStatus,
    pub exit_code: Option<i32>,
    pub new_output: String,
    pub next_offset: usize,
}

/// All live and recently-finished jobs, keyed by id.
pub struct JobTable {
    jobs: RwLock<HashMap<String, Arc<RwLock<Job>>>>,
    config: ExecConfig,
}

impl JobTable {
    pub fn new(config: ExecConfig) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &ExecConfig {
        &self.config
    }

    fn insert(&self, job: Job) -> Arc<RwLock<Job>> {
        let id = job.id.clone();
        let shared = Arc::new(RwLock::new(job));
        self.jobs.write().insert(id, shared.clone());
        shared
    }

    pub fn get(&self, id: &str) -> Option<Arc<RwLock<Job>>> {
        self.jobs.read().get(id).cloned()
    }

    pub fn overview(&self) -> Vec<JobSummary> {
        let mut rows: Vec<JobSummary> = self
            .jobs
            .read()
            .values()
            .map(|j| {
                let j = j.read();
                JobSummary {
                    id: j.id.clone(),
                    command: j.command.clone(),
                    status: j.status,
                    exit_code: j.exit_code,
                    started_at: j.started_at,
                    finished_at: j.finished_at,
                    log_bytes: j.log.len(),
                }
            })
            .collect();
        rows.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        rows
    }

    /// Output appended since `offset`, plus current status.
    pub fn poll(&self, id: &str, offset: usize) -> Option<JobPoll> {
        let job = self.get(id)?;
        let j = job.read();
        Some(JobPoll {
            status: j.status,
            exit_code: j.exit_code,
            new_output: j.log.since(offset).to_owned(),
            next_offset: j.log.len(),
        })
    }

    pub fn read_log(
        &self,
        id: &str,
        offset: Option<usize>,
        limit: Option<usize>,
        tail_lines: Option<usize>,
    ) -> Option<String> {
        let job = self.get(id)?;
        let j = job.read();
        Some(match offset {
            Some(off) => j.log.window(off, limit).to_owned(),
            None => j.log.tail(tail_lines.unwrap_or(200)),
        })
    }

    /// Signal a running job to die. Returns `false` for unknown ids and
    /// jobs that already finished.
    pub fn kill(&self, id: &str) -> bool {
        let Some(job) = self.get(id) else {
            return false;
        };
        let j = job.read();
        match (&j.status, &j.kill) {
            (JobStatus::Running, Some(tx)) => tx.try_send(()).is_ok(),
            _ => false,
        }
    }

    /// Drop every job that has finished. Returns how many were dropped.
    pub fn clear_finished(&self) -> usize {
        let mut jobs = self.jobs.write();
        let before = jobs.len();
        jobs.retain(|_, j| !j.read().status.is_terminal());
        before - jobs.len()
    }

    /// Kill (if needed) and forget one job.
    pub fn remove(&self, id: &str) -> bool {
        self.kill(id);
        self.jobs.write().remove(id).is_some()
    }

    /// Drop finished jobs older than `config.cleanup_ms`. Running jobs
    /// are never touched.
    pub fn cleanup_stale(&self) {
        let cutoff = self.config.cleanup_ms as i64;
        let now = Utc::now();
        self.jobs.write().retain(|_, j| {
            let j = j.read();
            match j.finished_at {
                Some(done) => now.signed_duration_since(done).num_milliseconds() < cutoff,
                None => true,
            }
        });
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }
}

// ── The shell tool itself ──────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ShellArgs {
    pub command: String,
    #[serde(default)]
    pub background: bool,
    /// Foreground wait budget in ms before promoting to a job.
    pub yield_ms: Option<u64>,
    /// Hard kill deadline in seconds.
    pub timeout_sec: Option<u64>,
    #[serde(default)]
    pub workdir: Option<String>,
    #[serde(default)]
    pub env: Option<HashMap<String, String>>,
}

/// Env vars a tool call may never override: loader hooks, interpreter
/// startup files, and the lookup paths that decide what actually runs.
pub fn is_protected_env_var(name: &str) -> bool {
    const PROTECTED: &[&str] = &[
        "LD_PRELOAD", "LD_LIBRARY_PATH", "LD_AUDIT",
        "DYLD_INSERT_LIBRARIES", "DYLD_LIBRARY_PATH", "DYLD_FRAMEWORK_PATH",
        "PATH", "HOME", "USER", "SHELL",
        "SSH_AUTH_SOCK", "SSH_AGENT_PID",
        "PYTHONPATH", "PYTHONSTARTUP", "PYTHONHOME",
        "NODE_PATH", "NODE_OPTIONS",
        "RUBYLIB", "RUBYOPT",
        "PERL5LIB", "PERL5OPT",
        "CLASSPATH",
        "BASH_ENV", "ENV", "CDPATH",
        "IFS",
    ];
    PROTECTED.contains(&name.to_ascii_uppercase().as_str())
}

/// Run a command. Foreground completions return the full output;
/// backgrounded (explicit or promoted) runs return the job id and the
/// output collected so far.
pub async fn run_shell(table: &JobTable, args: ShellArgs) -> Result<serde_json::Value, String> {
    let cfg = table.config();
    let timeout_sec = args.timeout_sec.unwrap_or(cfg.timeout_sec);
    let yield_ms = match (args.background, args.yield_ms) {
        (true, _) => 0,
        (false, Some(ms)) => ms,
        (false, None) => cfg.background_ms,
    };

    if let Some(env) = &args.env {
        if let Some(bad) = env.keys().find(|k| is_protected_env_var(k)) {
            return Err(format!("environment variable '{bad}' may not be overridden"));
        }
    }

    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(&args.command);
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.stdin(std::process::Stdio::null());
    if let Some(dir) = &args.workdir {
        cmd.current_dir(dir);
    }
    if let Some(env) = &args.env {
        cmd.envs(env);
    }

    let child = cmd.spawn().map_err(|e| format!("failed to spawn: {e}"))?;

    let (kill_tx, kill_rx) = mpsc::channel::<()>(1);
    let job = table.insert(Job {
        id: uuid::Uuid::new_v4().to_string(),
        command: args.command.clone(),
        workdir: args.workdir.clone(),
        started_at: Utc::now(),
        finished_at: None,
        status: JobStatus::Running,
        exit_code: None,
        log: JobLog::new(cfg.max_output_chars),
        kill: Some(kill_tx),
    });
    let job_id = job.read().id.clone();

    let done = Arc::new(Notify::new());
    tokio::spawn(supervise(child, job.clone(), kill_rx, timeout_sec, done.clone()));

    if args.background {
        return Ok(serde_json::json!({
            "status": JobStatus::Running,
            "job_id": job_id,
        }));
    }

    let wait = if yield_ms > 0 {
        std::time::Duration::from_millis(yield_ms)
    } else {
        std::time::Duration::from_secs(timeout_sec)
    };

    let notified = done.notified();
    tokio::select! {
        _ = notified => Ok(completed_response(&job)),
        _ = tokio::time::sleep(wait) => {
            // Re-check under the lock: the job may have finished right
            // as the yield deadline fired.
            let j = job.read();
            if j.status.is_terminal() {
                drop(j);
                Ok(completed_response(&job))
            } else {
                Ok(serde_json::json!({
                    "status": JobStatus::Running,
                    "job_id": job_id,
                    "tail": j.log.tail(20),
                }))
            }
        }
    }
}

fn completed_response(job: &Arc<RwLock<Job>>) -> serde_json::Value {
    let j = job.read();
    serde_json::json!({
        "status": j.status,
        "exit_code": j.exit_code,
        "output": j.log.since(0),
    })
}

/// Owns the child process from spawn to the grave: drains output,
/// applies the hard timeout, honors kill requests, and writes the
/// final state back into the job exactly once.
async fn supervise(
    mut child: tokio::process::Child,
    job: Arc<RwLock<Job>>,
    mut kill_rx: mpsc::Receiver<()>,
    timeout_sec: u64,
    done: Arc<Notify>,
) {
    let out_reader = child.stdout.take().map(|s| tokio::spawn(drain(s, job.clone())));
    let err_reader = child.stderr.take().map(|s| tokio::spawn(drain(s, job.clone())));

    let (status, exit_code, note) = tokio::select! {
        result = child.wait() => match result {
            Ok(exit) => (JobStatus::Exited, exit.code(), None),
            Err(e) => (JobStatus::SpawnFailed, None, Some(format!("\n[process error: {e}]"))),
        },
        _ = kill_rx.recv() => {
            let _ = child.kill().await;
            (JobStatus::Killed, None, Some("\n[killed]".to_owned()))
        }
        _ = tokio::time::sleep(std::time::Duration::from_secs(timeout_sec)) => {
            let _ = child.kill().await;
            (JobStatus::TimedOut, None, Some("\n[timed out]".to_owned()))
        }
    };

    // Let the pipe readers observe EOF before the final state lands.
    if let Some(t) = out_reader {
        let _ = t.await;
    }
    if let Some(t) = err_reader {
        let _ = t.await;
    }

    {
        let mut j = job.write();
        if let Some(note) = note {
            j.log.push(&note);
        }
        j.status = status;
        j.exit_code = exit_code;
        j.finished_at = Some(Utc::now());
        j.kill = None;
    }
    done.notify_waiters();

    tracing::debug!(job_id = %job.read().id, status = ?status, "job finished");
}

async fn drain<R>(stream: R, job: Arc<RwLock<Job>>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let mut j = job.write();
        j.log.push(&line);
        j.log.push("\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> JobTable {
        JobTable::new(ExecConfig::default())
    }

    fn args(command: &str) -> ShellArgs {
        ShellArgs {
            command: command.into(),
            background: false,
            yield_ms: None,
            timeout_sec: None,
            workdir: None,
            env: None,
        }
    }

    #[test]
    fn job_log_caps_and_keeps_the_tail() {
        let mut log = JobLog::new(100);
        for i in 0..50 {
            log.push(&format!("line {i}\n"));
        }
        assert!(log.len() <= 100);
        assert!(log.since(0).contains("line 49"));
        assert!(!log.since(0).contains("line 0\n"));
    }

    #[test]
    fn job_log_tail_returns_last_lines() {
        let mut log = JobLog::new(10_000);
        log.push("one\ntwo\nthree\n");
        assert_eq!(log.tail(2), "two\nthree");
    }

    #[test]
    fn protected_env_vars_are_case_insensitive() {
        assert!(is_protected_env_var("ld_preload"));
        assert!(is_protected_env_var("PATH"));
        assert!(!is_protected_env_var("MY_APP_FLAG"));
    }

    #[tokio::test]
    async fn foreground_command_returns_output() {
        let table = table();
        let result = run_shell(&table, args("echo hello")).await.unwrap();
        assert_eq!(result["status"], "exited");
        assert_eq!(result["exit_code"], 0);
        assert!(result["output"].as_str().unwrap().contains("hello"));
    }

    #[tokio::test]
    async fn protected_env_override_is_refused() {
        let table = table();
        let mut a = args("echo hi");
        a.env = Some(HashMap::from([("LD_PRELOAD".to_string(), "/evil.so".to_string())]));
        let err = run_shell(&table, a).await.unwrap_err();
        assert!(err.contains("LD_PRELOAD"));
    }

    #[tokio::test]
    async fn slow_command_is_promoted_to_background_job() {
        let table = table();
        let mut a = args("sleep 5");
        a.yield_ms = Some(50);
        let result = run_shell(&table, a).await.unwrap();
        assert_eq!(result["status"], "running");
        let job_id = result["job_id"].as_str().unwrap();

        assert!(table.kill(job_id));
        // The supervisor needs a moment to reap the child.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        let poll = table.poll(job_id, 0).unwrap();
        assert_eq!(poll.status, JobStatus::Killed);
    }

    #[tokio::test]
    async fn background_job_output_is_pollable() {
        let table = table();
        let mut a = args("echo from-background");
        a.background = true;
        let result = run_shell(&table, a).await.unwrap();
        let job_id = result["job_id"].as_str().unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        let poll = table.poll(job_id, 0).unwrap();
        assert_eq!(poll.status, JobStatus::Exited);
        assert!(poll.new_output.contains("from-background"));
        assert_eq!(poll.next_offset, poll.new_output.len());
    }

    #[tokio::test]
    async fn clear_finished_keeps_running_jobs() {
        let table = table();
        let mut bg = args("sleep 5");
        bg.background = true;
        let running = run_shell(&table, bg).await.unwrap();
        let running_id = running["job_id"].as_str().unwrap().to_string();

        let mut quick = args("true");
        quick.background = true;
        run_shell(&table, quick).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        assert_eq!(table.clear_finished(), 1);
        assert!(table.get(&running_id).is_some());
        table.remove(&running_id);
    }
}

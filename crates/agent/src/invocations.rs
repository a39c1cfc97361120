//! Append-only record of tool invocations.
//!
//! Every dispatched tool call lands here with its final outcome, so an
//! operator can answer "what ran, for whom, and how did it end" without
//! grepping logs. Records are also emitted as structured tracing lines
//! at record time.

use parking_lot::Mutex;

use sa_domain::invocation::{Outcome, ToolInvocation};

pub struct InvocationLog {
    entries: Mutex<Vec<ToolInvocation>>,
}

impl InvocationLog {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Record a finished invocation. The invocation must already have
    /// its outcome set.
    pub fn record(&self, invocation: ToolInvocation) {
        debug_assert!(invocation.is_finished(), "recording an unfinished invocation");
        let outcome = match &invocation.outcome {
            Some(Outcome::Ok { .. }) => "ok",
            Some(Outcome::Blocked { .. }) => "blocked",
            Some(Outcome::Timeout) => "timeout",
            Some(Outcome::Error { .. }) => "error",
            None => "unset",
        };
        tracing::info!(
            tool = %invocation.descriptor_name,
            user = %invocation.user_id,
            outcome = %outcome,
            invocation_id = %invocation.id,
            "tool invocation finished"
        );
        self.entries.lock().push(invocation);
    }

    /// The most recent `n` invocations, newest last.
    pub fn recent(&self, n: usize) -> Vec<ToolInvocation> {
        let entries = self.entries.lock();
        let start = entries.len().saturating_sub(n);
        entries[start..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for InvocationLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn finished(name: &str) -> ToolInvocation {
        let mut inv = ToolInvocation::start(name, serde_json::json!({}), "u1", Uuid::new_v4());
        inv.finish(Outcome::Ok {
            output: serde_json::json!(null),
        });
        inv
    }

    #[test]
    fn record_then_recent_returns_newest_last() {
        let log = InvocationLog::new();
        log.record(finished("first"));
        log.record(finished("second"));
        let recent = log.recent(1);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].descriptor_name, "second");
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn recent_larger_than_log_returns_all() {
        let log = InvocationLog::new();
        log.record(finished("only"));
        assert_eq!(log.recent(50).len(), 1);
    }
}

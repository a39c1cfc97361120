use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of a tool invocation, recorded exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Ok { output: serde_json::Value },
    Blocked { reason: String },
    Timeout,
    Error { message: String },
}

/// A single tool call's lifecycle: created at dispatch time, finished
/// exactly once. Invariant 4 requires the outcome never change after
/// `finish` — calling it twice panics in debug builds so the violation
/// surfaces in tests rather than silently overwriting history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: Uuid,
    pub descriptor_name: String,
    pub input: serde_json::Value,
    pub user_id: String,
    pub correlation_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub outcome: Option<Outcome>,
}

impl ToolInvocation {
    pub fn start(
        descriptor_name: impl Into<String>,
        input: serde_json::Value,
        user_id: impl Into<String>,
        correlation_id: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            descriptor_name: descriptor_name.into(),
            input,
            user_id: user_id.into(),
            correlation_id,
            started_at: Utc::now(),
            finished_at: None,
            outcome: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn finish(&mut self, outcome: Outcome) {
        debug_assert!(
            self.outcome.is_none(),
            "ToolInvocation {} finished twice",
            self.id
        );
        self.finished_at = Some(Utc::now());
        self.outcome = Some(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_sets_outcome_and_finished_at() {
        let mut inv = ToolInvocation::start("exec", serde_json::json!({}), "u1", Uuid::new_v4());
        assert!(!inv.is_finished());
        inv.finish(Outcome::Ok {
            output: serde_json::json!("done"),
        });
        assert!(inv.is_finished());
        assert!(inv.finished_at.is_some());
    }

    #[test]
    #[should_panic(expected = "finished twice")]
    fn finish_twice_panics_in_debug() {
        let mut inv = ToolInvocation::start("exec", serde_json::json!({}), "u1", Uuid::new_v4());
        inv.finish(Outcome::Timeout);
        inv.finish(Outcome::Timeout);
    }
}

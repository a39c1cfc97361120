use crate::context::ToolCallContext;
use crate::pipeline::{FilterVerdict, SecurityFilter};
use async_trait::async_trait;
use parking_lot::RwLock;
use sa_domain::error::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Caps the number of tool executions a single user may have in flight
/// at once, generalized from a one-permit-per-session lock to N permits
/// per user, and carries the per-tool execution deadline used to wrap
/// the actual dispatch.
///
/// Unlike the other filters, `ExecutorGuard` isn't a pure yes/no check:
/// `check` only verifies a permit is obtainable without blocking
/// (acquiring and immediately dropping it), since the pipeline runs
/// before dispatch and the caller, not this filter, holds the permit
/// for the lifetime of the actual tool run via [`ExecutorGuard::acquire`].
pub struct ExecutorGuard {
    max_concurrent_per_user: usize,
    deadline: Duration,
    semaphores: RwLock<HashMap<String, Arc<Semaphore>>>,
}

impl ExecutorGuard {
    pub fn new(max_concurrent_per_user: usize, tool_deadline_ms: u64) -> Self {
        Self {
            max_concurrent_per_user,
            deadline: Duration::from_millis(tool_deadline_ms),
            semaphores: RwLock::new(HashMap::new()),
        }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    fn semaphore_for(&self, user_id: &str) -> Arc<Semaphore> {
        if let Some(sem) = self.semaphores.read().get(user_id) {
            return sem.clone();
        }
        self.semaphores
            .write()
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.max_concurrent_per_user)))
            .clone()
    }

    /// Acquire a permit for the duration of one tool execution. Held by
    /// the caller (agent loop / tool dispatcher), not by this filter.
    pub async fn acquire(&self, user_id: &str) -> tokio::sync::OwnedSemaphorePermit {
        self.semaphore_for(user_id)
            .acquire_owned()
            .await
            .expect("semaphore is never closed")
    }
}

#[async_trait]
impl SecurityFilter for ExecutorGuard {
    fn name(&self) -> &'static str {
        "executor_guard"
    }

    async fn check(&self, ctx: &ToolCallContext) -> Result<FilterVerdict> {
        let sem = self.semaphore_for(&ctx.user_id);
        if sem.available_permits() == 0 {
            return Ok(FilterVerdict::Block(format!(
                "user \"{}\" is already at the concurrent tool execution limit",
                ctx.user_id
            )));
        }
        Ok(FilterVerdict::Allow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(user_id: &str) -> ToolCallContext {
        ToolCallContext {
            user_id: user_id.into(),
            tool_name: "exec".into(),
            arguments: serde_json::json!({}),
            descriptor: None,
            source_text: None,
        }
    }

    #[tokio::test]
    async fn allows_within_limit() {
        let guard = ExecutorGuard::new(2, 1000);
        let v = guard.check(&ctx("u1")).await.unwrap();
        assert_eq!(v, FilterVerdict::Allow);
    }

    #[tokio::test]
    async fn blocks_at_limit() {
        let guard = ExecutorGuard::new(1, 1000);
        let _permit = guard.acquire("u1").await;
        let v = guard.check(&ctx("u1")).await.unwrap();
        assert!(matches!(v, FilterVerdict::Block(_)));
    }

    #[tokio::test]
    async fn different_users_have_independent_limits() {
        let guard = ExecutorGuard::new(1, 1000);
        let _permit = guard.acquire("u1").await;
        let v = guard.check(&ctx("u2")).await.unwrap();
        assert_eq!(v, FilterVerdict::Allow);
    }

    #[tokio::test]
    async fn releasing_permit_frees_capacity() {
        let guard = ExecutorGuard::new(1, 1000);
        {
            let _permit = guard.acquire("u1").await;
            assert!(matches!(
                guard.check(&ctx("u1")).await.unwrap(),
                FilterVerdict::Block(_)
            ));
        }
        assert_eq!(guard.check(&ctx("u1")).await.unwrap(), FilterVerdict::Allow);
    }
}

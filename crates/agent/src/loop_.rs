//! The bounded agent loop: admission control, one LLM round trip per
//! iteration, tool dispatch through the security pipeline, and
//! recovery from LLM-call failures, up to a configured iteration cap.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use uuid::Uuid;

use sa_cache::{Fingerprint, ResponseCache};
use sa_domain::config::AgentConfig;
use sa_domain::error::{Error, Result};
use sa_domain::invocation::{Outcome, ToolInvocation};
use sa_domain::usage::Usage;
use sa_domain::tool::{ContentPart, Message, MessageContent, Role, ToolCall, Turn};
use sa_domain::trace::TraceEvent;
use sa_providers::{ChatRequest, ChatResponse, LlmRouter};
use sa_ratelimit::RateLimiter;
use sa_security::{ExecutorGuard, SecurityPipeline, ToolCallContext};
use sa_sessions::{SessionHandle, SessionStore};
use sa_tools::ToolRegistry;

use crate::cancel::{CancelGuard, CancelMap, CancelToken};
use crate::context::{
    assistant_turn, build_messages, tool_definitions, trim_history, unresolved_tool_use_ids,
};
use crate::invocations::InvocationLog;

/// How a failed LLM call should be handled: retried within the same
/// `run` (after appending a tool-shaped notice the next request will
/// carry, the same way a failed tool call is surfaced) or given up on
/// immediately with an apology turn returned as the final answer.
pub enum Recovery {
    Retry(Turn),
    GiveUp(Turn),
}

/// Classify a router-level failure. Transient, retriable conditions
/// (timeouts, transport errors) get a tool-shaped recovery turn and
/// another pass through the loop; everything else ends the run.
pub fn classify_for_recovery(err: &Error) -> Recovery {
    let retriable = matches!(err, Error::Timeout(_) | Error::Http(_))
        || matches!(err, Error::Provider { message, .. } if message.contains("HTTP 5"));

    if retriable {
        Recovery::Retry(tool_shaped_turn("llm-call", err.to_string(), true))
    } else {
        Recovery::GiveUp(Turn::new(Message::assistant(format!(
            "I ran into a problem and couldn't finish that: {err}"
        ))))
    }
}

fn tool_shaped_turn(call_id: &str, content: impl Into<String>, is_error: bool) -> Turn {
    Turn {
        message: Message {
            role: Role::Tool,
            content: MessageContent::Parts(vec![ContentPart::ToolResult {
                tool_use_id: call_id.to_string(),
                content: content.into(),
                is_error,
            }]),
        },
        timestamp: Utc::now(),
        tool_use_id: Some(call_id.to_string()),
    }
}

/// Everything one `run()` call needs: the router, tool catalog,
/// security pipeline, cache, rate limiter, and session store, plus the
/// cancellation registry shared across concurrently running sessions.
pub struct AgentLoop {
    router: Arc<LlmRouter>,
    tools: Arc<ToolRegistry>,
    pipeline: Arc<SecurityPipeline>,
    executor_guard: Arc<ExecutorGuard>,
    cache: Arc<ResponseCache>,
    ratelimiter: Arc<RateLimiter>,
    sessions: Arc<SessionStore>,
    cancel_map: Arc<CancelMap>,
    invocations: Arc<InvocationLog>,
    config: AgentConfig,
}

impl AgentLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        router: Arc<LlmRouter>,
        tools: Arc<ToolRegistry>,
        pipeline: Arc<SecurityPipeline>,
        executor_guard: Arc<ExecutorGuard>,
        cache: Arc<ResponseCache>,
        ratelimiter: Arc<RateLimiter>,
        sessions: Arc<SessionStore>,
        cancel_map: Arc<CancelMap>,
        config: AgentConfig,
    ) -> Self {
        Self {
            router,
            tools,
            pipeline,
            executor_guard,
            cache,
            ratelimiter,
            sessions,
            cancel_map,
            invocations: Arc::new(InvocationLog::new()),
            config,
        }
    }

    /// Request cancellation of a currently-running session. Returns
    /// `true` if a run was actually found and flagged.
    pub fn cancel(&self, user_id: &str) -> bool {
        self.cancel_map.cancel(user_id)
    }

    /// The append-only record of every tool call this loop dispatched.
    pub fn invocations(&self) -> &InvocationLog {
        &self.invocations
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Run one turn of conversation for `user_id` to completion: admits
    /// the request, appends `user_text`, then alternates LLM calls and
    /// tool dispatch until the model stops calling tools or the
    /// iteration cap is hit. Returns the final assistant text.
    pub async fn run(&self, user_id: &str, user_text: &str) -> Result<String> {
        self.ratelimiter
            .check(user_id, "agent.run", None, 1.0)
            .map_err(|e| Error::RateLimited(e.to_string()))?;

        let handle = self.sessions.open(user_id).await?;
        let token: CancelToken = self.cancel_map.register(user_id);
        let _guard = CancelGuard::new(&self.cancel_map, user_id);

        self.settle_unresolved_tool_uses(&handle).await?;

        self.sessions
            .append(&handle, Turn::new(Message::user(user_text)))
            .await?;

        let deadline = Duration::from_millis(self.config.user_turn_deadline_ms);
        match tokio::time::timeout(deadline, self.drive(user_id, &handle, &token)).await {
            Ok(result) => result,
            Err(_) => {
                let turn = Turn::new(Message::assistant(
                    "Sorry, that took longer than I'm allowed to spend on one message.",
                ));
                self.sessions.append(&handle, turn.clone()).await?;
                Ok(turn.message.content.extract_all_text())
            }
        }
    }

    /// The iteration core of `run`, factored out so the whole thing can
    /// sit under one per-turn deadline.
    async fn drive(
        &self,
        user_id: &str,
        handle: &SessionHandle,
        token: &CancelToken,
    ) -> Result<String> {
        for iteration in 0..self.config.max_iterations {
            if token.is_cancelled() {
                let turn = Turn::new(Message::assistant("Cancelled."));
                self.sessions.append(handle, turn.clone()).await?;
                return Ok(turn.message.content.extract_all_text());
            }

            let history = self.sessions.history(handle).await;
            let window = trim_history(&history, self.sessions.config().history_cap);
            let messages = build_messages(&self.config.system_prompt, window);
            let tools = tool_definitions(&self.tools);

            let req = ChatRequest {
                messages,
                tools,
                temperature: None,
                max_tokens: None,
                json_mode: false,
                model: None,
            };

            let response = match self.fetch_response(req).await {
                Ok(resp) => resp,
                Err(e) => match classify_for_recovery(&e) {
                    Recovery::Retry(turn) => {
                        self.sessions.append(handle, turn).await?;
                        continue;
                    }
                    Recovery::GiveUp(turn) => {
                        self.sessions.append(handle, turn.clone()).await?;
                        return Ok(turn.message.content.extract_all_text());
                    }
                },
            };

            let turn = assistant_turn(&response);
            self.sessions.append(handle, turn).await?;

            TraceEvent::LoopIteration {
                session_key: user_id.to_string(),
                iteration,
                tool_calls: response.tool_calls.len(),
            }
            .emit();

            if response.tool_calls.is_empty() {
                return Ok(response.content);
            }

            let results = self.dispatch_tools(user_id, &response.tool_calls).await;
            for result in results {
                self.sessions.append(handle, result).await?;
            }
        }

        let turn = Turn::new(Message::assistant(
            "I wasn't able to finish that within the allotted steps.",
        ));
        self.sessions.append(handle, turn.clone()).await?;
        Ok(turn.message.content.extract_all_text())
    }

    /// A crashed or evicted run can leave an assistant tool-use turn
    /// with no answering tool-result. Settle each leftover id with a
    /// synthetic timeout result so the history is well formed before
    /// the next model call.
    async fn settle_unresolved_tool_uses(&self, handle: &SessionHandle) -> Result<()> {
        let history = self.sessions.history(handle).await;
        let unresolved = unresolved_tool_use_ids(&history);
        for id in unresolved {
            tracing::warn!(
                user_id = %handle.user_id(),
                tool_use_id = %id,
                "settling tool use left unresolved by an earlier run"
            );
            let turn = tool_shaped_turn(&id, "tool execution was interrupted and timed out", true);
            self.sessions.append(handle, turn).await?;
        }
        Ok(())
    }

    /// Call the router, transparently serving a cached response when
    /// the cache admits the request shape. Tool-bearing requests are
    /// never cached (sidestepping cache invalidation when the tool set
    /// changes between calls), nor are high-temperature ones. The
    /// fingerprint keys on the model the router would pick, so two
    /// requests routed to different models never share an entry.
    async fn fetch_response(&self, req: ChatRequest) -> Result<ChatResponse> {
        let cacheable = self.cache.admits(req.temperature, !req.tools.is_empty());
        let fingerprint = cacheable.then(|| {
            let model = self.router.primary_model_for(&req, false).unwrap_or_default();
            Fingerprint::compute(&req.messages, &model)
        });

        if let Some(fp) = fingerprint {
            if let Some(cached) = self.cache.lookup(&fp).await {
                if let Some(resp) = decode_cached(&cached) {
                    return Ok(resp);
                }
            }
        }

        let response = self.router.route(req, false).await?;

        if let Some(fp) = fingerprint {
            self.cache.store(fp, encode_cached(&response)).await;
        }

        Ok(response)
    }

    /// Run a batch of tool calls from one assistant turn. The whole
    /// batch runs concurrently only when every call resolves to a
    /// registered tool, all share one concurrency class, and all are
    /// idempotent; otherwise calls run sequentially in input order.
    /// Results are always returned in the original input order.
    async fn dispatch_tools(&self, user_id: &str, calls: &[ToolCall]) -> Vec<Turn> {
        if self.can_run_concurrently(calls) {
            join_all(calls.iter().map(|call| self.run_one_tool(user_id, call))).await
        } else {
            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                results.push(self.run_one_tool(user_id, call).await);
            }
            results
        }
    }

    fn can_run_concurrently(&self, calls: &[ToolCall]) -> bool {
        if calls.len() < 2 {
            return false;
        }
        let descriptors: Vec<_> = calls
            .iter()
            .map(|c| self.tools.descriptor(&c.tool_name))
            .collect();
        let Some(Some(first)) = descriptors.first() else {
            return false;
        };
        descriptors.iter().all(|d| match d {
            Some(d) => d.idempotent && d.concurrency_class == first.concurrency_class,
            None => false,
        })
    }

    /// Run a single tool call through the security pipeline, then (if
    /// allowed) dispatch it with the executor guard's deadline and
    /// concurrency permit held for the duration. Every path records one
    /// invocation with its final outcome.
    async fn run_one_tool(&self, user_id: &str, call: &ToolCall) -> Turn {
        let mut invocation = ToolInvocation::start(
            &call.tool_name,
            call.arguments.clone(),
            user_id,
            Uuid::new_v4(),
        );

        let Some(descriptor) = self.tools.descriptor(&call.tool_name) else {
            let message = format!("unknown tool \"{}\"", call.tool_name);
            invocation.finish(Outcome::Error {
                message: message.clone(),
            });
            self.invocations.record(invocation);
            return tool_shaped_turn(&call.call_id, message, true);
        };

        let ctx = ToolCallContext {
            user_id: user_id.to_string(),
            tool_name: call.tool_name.clone(),
            arguments: call.arguments.clone(),
            descriptor: Some(descriptor),
            source_text: None,
        };

        if let Err((filter, reason)) = self.pipeline.run(&ctx).await {
            invocation.finish(Outcome::Blocked {
                reason: reason.clone(),
            });
            self.invocations.record(invocation);
            return tool_shaped_turn(&call.call_id, format!("blocked by {filter}: {reason}"), true);
        }

        let _permit = self.executor_guard.acquire(user_id).await;
        let deadline = self.executor_guard.deadline();
        let dispatch = self.tools.dispatch(&call.tool_name, call.arguments.clone());

        let turn = match tokio::time::timeout(deadline, dispatch).await {
            Err(_) => {
                invocation.finish(Outcome::Timeout);
                tool_shaped_turn(
                    &call.call_id,
                    format!("tool \"{}\" timed out after {:?}", call.tool_name, deadline),
                    true,
                )
            }
            Ok(Err(message)) => {
                invocation.finish(Outcome::Error {
                    message: message.clone(),
                });
                tool_shaped_turn(&call.call_id, message, true)
            }
            Ok(Ok(value)) => {
                invocation.finish(Outcome::Ok {
                    output: value.clone(),
                });
                Turn::tool_result(call.call_id.clone(), value.to_string())
            }
        };
        self.invocations.record(invocation);
        turn
    }
}

fn encode_cached(resp: &ChatResponse) -> serde_json::Value {
    serde_json::json!({
        "content": resp.content,
        "tool_calls": resp.tool_calls,
        "usage": resp.usage,
        "model": resp.model,
        "finish_reason": resp.finish_reason,
    })
}

fn decode_cached(value: &serde_json::Value) -> Option<ChatResponse> {
    Some(ChatResponse {
        content: value.get("content")?.as_str()?.to_string(),
        tool_calls: serde_json::from_value(value.get("tool_calls")?.clone()).ok()?,
        usage: value
            .get("usage")
            .and_then(|u| serde_json::from_value::<Option<Usage>>(u.clone()).ok())
            .flatten(),
        model: value.get("model")?.as_str()?.to_string(),
        finish_reason: value
            .get("finish_reason")
            .and_then(|f| f.as_str())
            .map(str::to_string),
    })
}

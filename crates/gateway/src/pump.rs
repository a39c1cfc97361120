//! Per-transport message pump.
//!
//! Applies the inbound gates in order (empty-text short-circuit, rate
//! limiter, prompt-injection sanitizer, back-pressure caps), dispatches
//! admitted events to the agent loop, and splits the reply to the
//! transport's message limit. One pump instance serves one transport;
//! the agent loop and rate limiter behind it are shared.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use regex::RegexSet;
use tokio::sync::Semaphore;

use sa_agent::AgentLoop;
use sa_domain::config::{SecurityConfig, ServerConfig};
use sa_domain::error::{Error, Result};
use sa_domain::trace::TraceEvent;
use sa_ratelimit::RateLimiter;

use crate::transport::Transport;

/// What the pump decided to do with one inbound event. Every variant
/// carries the user-visible text for it.
#[derive(Debug)]
pub enum PumpOutcome {
    /// Admitted and answered; one entry per transport message.
    Reply(Vec<String>),
    /// Rate limiter said no.
    Denied(String),
    /// Sanitizer said no, or the message was empty.
    Rejected(String),
    /// Back-pressure: transport or user already at their in-flight cap.
    Busy(String),
    /// The run itself failed in a way the loop couldn't absorb.
    Failed(String),
}

impl PumpOutcome {
    /// The messages to push back over the transport, in order.
    pub fn into_messages(self) -> Vec<String> {
        match self {
            PumpOutcome::Reply(chunks) => chunks,
            PumpOutcome::Denied(m)
            | PumpOutcome::Rejected(m)
            | PumpOutcome::Busy(m)
            | PumpOutcome::Failed(m) => vec![m],
        }
    }
}

pub struct PlatformPump {
    route: String,
    agent: Arc<AgentLoop>,
    ratelimiter: Arc<RateLimiter>,
    sanitizer: RegexSet,
    inflight: Arc<Semaphore>,
    per_user: Arc<Mutex<HashMap<String, usize>>>,
    max_inflight_per_user: usize,
    reply_chunk_len: usize,
}

impl PlatformPump {
    pub fn new(
        transport_name: &str,
        agent: Arc<AgentLoop>,
        ratelimiter: Arc<RateLimiter>,
        security: &SecurityConfig,
        server: &ServerConfig,
        reply_chunk_len: usize,
    ) -> Result<Self> {
        let sanitizer = RegexSet::new(&security.sanitizer_patterns)
            .map_err(|e| Error::Config(format!("invalid sanitizer pattern: {e}")))?;
        Ok(Self {
            route: format!("pump.{transport_name}"),
            agent,
            ratelimiter,
            sanitizer,
            inflight: Arc::new(Semaphore::new(server.pump_max_inflight)),
            per_user: Arc::new(Mutex::new(HashMap::new())),
            max_inflight_per_user: server.pump_max_inflight_per_user,
            reply_chunk_len,
        })
    }

    /// Run one inbound event through the gates and, if admitted, the
    /// agent loop. Never errors: every failure mode maps to an outcome
    /// with a user-appropriate message.
    pub async fn handle_event(&self, user_id: &str, text: &str) -> PumpOutcome {
        let text = text.trim();
        if text.is_empty() {
            self.decide(user_id, false, "empty");
            return PumpOutcome::Rejected("Say something and I'll do my best to help.".into());
        }

        if self.ratelimiter.check(user_id, &self.route, None, 1.0).is_err() {
            self.decide(user_id, false, "rate_limited");
            return PumpOutcome::Denied(
                "You're sending messages faster than I can handle. Give me a moment and try again.".into(),
            );
        }

        if self.sanitizer.is_match(text) {
            self.decide(user_id, false, "sanitizer");
            return PumpOutcome::Rejected(
                "That message looks like it's trying to override my instructions, so I won't process it.".into(),
            );
        }

        let Ok(_inflight) = self.inflight.clone().try_acquire_owned() else {
            self.decide(user_id, false, "transport_busy");
            return PumpOutcome::Busy(
                "I'm handling a lot of conversations right now. Please try again shortly.".into(),
            );
        };

        let Some(_user_slot) = UserSlot::claim(&self.per_user, user_id, self.max_inflight_per_user)
        else {
            self.decide(user_id, false, "user_busy");
            return PumpOutcome::Busy("I'm still working on your previous message.".into());
        };

        self.decide(user_id, true, "admitted");

        match self.agent.run(user_id, text).await {
            Ok(reply) => PumpOutcome::Reply(split_reply(&reply, self.reply_chunk_len)),
            Err(Error::RateLimited(_)) => PumpOutcome::Denied(
                "You're sending messages faster than I can handle. Give me a moment and try again.".into(),
            ),
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "agent run failed");
                PumpOutcome::Failed("Sorry, something went wrong on my side. Please try again.".into())
            }
        }
    }

    /// Drive a transport to exhaustion: receive, gate, dispatch, reply.
    /// Each admitted event runs as its own task so one slow turn never
    /// stalls the receive loop.
    pub async fn run(self: Arc<Self>, transport: Arc<dyn Transport>) {
        while let Some(event) = transport.receive().await {
            if event.is_echo {
                continue;
            }
            let pump = self.clone();
            let transport = transport.clone();
            tokio::spawn(async move {
                transport.typing(&event.user_id, true).await;
                let outcome = pump.handle_event(&event.user_id, &event.text).await;
                transport.typing(&event.user_id, false).await;
                for message in outcome.into_messages() {
                    if let Err(e) = transport.send(&event.user_id, &message).await {
                        tracing::warn!(user_id = %event.user_id, error = %e, "reply delivery failed");
                        break;
                    }
                }
            });
        }
        tracing::info!(route = %self.route, "transport closed, pump stopping");
    }

    fn decide(&self, user_id: &str, admitted: bool, reason: &str) {
        TraceEvent::PumpDecision {
            transport: self.route.clone(),
            session_key: user_id.to_string(),
            admitted,
            reason: (!admitted).then(|| reason.to_string()),
        }
        .emit();
    }
}

/// Holds one of a user's in-flight slots; released on drop.
struct UserSlot {
    counts: Arc<Mutex<HashMap<String, usize>>>,
    user_id: String,
}

impl UserSlot {
    fn claim(
        counts: &Arc<Mutex<HashMap<String, usize>>>,
        user_id: &str,
        cap: usize,
    ) -> Option<Self> {
        let mut map = counts.lock();
        let entry = map.entry(user_id.to_string()).or_insert(0);
        if *entry >= cap {
            return None;
        }
        *entry += 1;
        Some(Self {
            counts: counts.clone(),
            user_id: user_id.to_string(),
        })
    }
}

impl Drop for UserSlot {
    fn drop(&mut self) {
        let mut map = self.counts.lock();
        if let Some(count) = map.get_mut(&self.user_id) {
            *count -= 1;
            if *count == 0 {
                map.remove(&self.user_id);
            }
        }
    }
}

/// Split `text` into chunks of at most `max_len` bytes, breaking at the
/// last newline (else space) inside each window so words survive
/// splitting. Always returns at least one chunk.
pub fn split_reply(text: &str, max_len: usize) -> Vec<String> {
    if max_len == 0 || text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut rest = text;
    while rest.len() > max_len {
        let mut cut = max_len;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        let window = &rest[..cut];
        let break_at = window
            .rfind('\n')
            .filter(|&i| i > 0)
            .or_else(|| window.rfind(' ').filter(|&i| i > 0))
            .unwrap_or(cut);
        let (head, tail) = rest.split_at(break_at);
        chunks.push(head.trim_end().to_string());
        rest = tail.trim_start_matches(['\n', ' ']);
    }
    if !rest.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

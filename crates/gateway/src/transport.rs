//! Transport abstraction for the platform pump.
//!
//! A transport turns some chat surface (a terminal, a webhook, a
//! messaging SDK) into a stream of normalized inbound events and a way
//! to push replies back. The pump never sees anything
//! platform-specific beyond this trait.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

use sa_domain::error::Result;

/// One normalized inbound message.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub user_id: String,
    pub text: String,
    /// Set for events the agent itself authored (echoes from the
    /// underlying platform); the pump drops these without processing.
    pub is_echo: bool,
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Largest reply a single `send` may carry. Longer replies are
    /// split into consecutive sends by the pump.
    fn max_message_len(&self) -> usize {
        4_000
    }

    /// Next inbound event, or `None` when the transport has closed.
    async fn receive(&self) -> Option<InboundEvent>;

    async fn send(&self, user_id: &str, text: &str) -> Result<()>;

    /// Typing indicator; transports without one ignore it.
    async fn typing(&self, _user_id: &str, _on: bool) {}
}

/// Line-oriented stdin/stdout transport: every line typed is one event
/// from a fixed user id, every reply is printed to stdout. Stands in
/// for a real messaging platform in `agentd chat`.
pub struct StdioTransport {
    user_id: String,
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl StdioTransport {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    fn name(&self) -> &'static str {
        "cli"
    }

    fn max_message_len(&self) -> usize {
        // A terminal has no hard message limit; effectively never split.
        usize::MAX
    }

    async fn receive(&self) -> Option<InboundEvent> {
        let line = self.lines.lock().await.next_line().await.ok().flatten()?;
        Some(InboundEvent {
            user_id: self.user_id.clone(),
            text: line,
            is_echo: false,
        })
    }

    async fn send(&self, _user_id: &str, text: &str) -> Result<()> {
        println!("{text}");
        Ok(())
    }
}

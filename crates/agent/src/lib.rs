//! The agent loop: ties the provider router, tool registry, security
//! pipeline, cache, rate limiter, and session store into one bounded
//! conversation turn.

pub mod cancel;
pub mod context;
pub mod invocations;
pub mod loop_;

pub use cancel::{CancelMap, CancelToken};
pub use invocations::InvocationLog;
pub use loop_::{classify_for_recovery, AgentLoop};

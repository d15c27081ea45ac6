//! The agent runtime: one user message in, one reply out.
//!
//! A run follows a **call → act → observe** cycle:
//!
//! 1. **Admit** the message (per-user rate limit, per-user session lock)
//! 2. **Build** the user's toolset and the system prompt
//! 3. **Call** the model with the stored conversation plus the new message
//! 4. **If tool calls**: guard against loops, execute, append results, go to 3
//! 5. **If text**: persist the conversation and return the reply
//!
//! The loop ends on a text answer, an interactive reply, a doom-loop trip,
//! an authentication failure, or the iteration cap.

pub mod classifier;
pub mod context;
pub mod dispatcher;
pub mod doom_loop;
pub mod error;
pub mod loop_runner;
pub mod prompt;
pub mod rate_limit;
pub mod retry;
pub mod session;
pub mod toolset;

#[cfg(test)]
mod test_helpers;

pub use classifier::{classify, ErrorClassifier};
pub use dispatcher::{Dispatcher, InboundMessage};
pub use doom_loop::{DoomLoopGuard, DoomLoopRule, DoomLoopTrip};
pub use error::AgentError;
pub use loop_runner::{AgentLoop, LoopSettings};
pub use rate_limit::RateLimiter;
pub use retry::{complete_with_retry, RetryPolicy};
pub use session::SessionLockTable;
pub use toolset::{FnToolset, ToolsetFactory, UserContext};

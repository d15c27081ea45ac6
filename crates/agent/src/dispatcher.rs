//! Inbound message dispatch.
//!
//! Runs for the same user are serialized through the [`SessionLockTable`];
//! different users proceed concurrently. Each run is bounded by a deadline,
//! and a cancelled run leaves the user's memory untouched.

use std::sync::Arc;
use std::time::Duration;
use deskpilot_core::reply::AgentReply;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use crate::error::AgentError;
use crate::loop_runner::AgentLoop;
use crate::session::SessionLockTable;
use crate::toolset::UserContext;

/// One message as delivered by the messaging layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub user_id: String,
    #[serde(default)]
    pub message_id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub user_name: Option<String>,
    /// Credential the toolset factory needs, if the caller already holds one
    #[serde(default)]
    pub credential: Option<String>,
}

impl InboundMessage {
    pub fn new(user_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            message_id: None,
            text: text.into(),
            user_name: None,
            credential: None,
        }
    }

    pub fn user_context(&self) -> UserContext {
        UserContext {
            user_id: self.user_id.clone(),
            name: self.user_name.clone(),
            credential: self.credential.clone(),
        }
    }
}

pub struct Dispatcher {
    agent: Arc<AgentLoop>,
    sessions: Arc<SessionLockTable>,
    run_timeout: Duration,
}

impl Dispatcher {
    pub fn new(agent: Arc<AgentLoop>, sessions: Arc<SessionLockTable>, run_timeout: Duration) -> Self {
        Self {
            agent,
            sessions,
            run_timeout,
        }
    }

    pub fn agent(&self) -> &Arc<AgentLoop> {
        &self.agent
    }

    pub fn sessions(&self) -> &Arc<SessionLockTable> {
        &self.sessions
    }

    /// Handle one message under the user's lock and the run deadline.
    pub async fn dispatch(&self, message: &InboundMessage) -> Result<AgentReply, AgentError> {
        let user = message.user_context();
        let message_id = message.message_id.as_deref().unwrap_or("-");
        info!(user_id = %user.user_id, message_id, "Dispatching message");

        self.sessions
            .with_lock(&user.user_id, || async {
                match tokio::time::timeout(self.run_timeout, self.agent.handle(&user, &message.text)).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(
                            user_id = %user.user_id,
                            message_id,
                            timeout_secs = self.run_timeout.as_secs(),
                            "Run cancelled at deadline"
                        );
                        Err(AgentError::Cancelled(self.run_timeout.as_secs()))
                    }
                }
            })
            .await
    }
}

//! Question/answer exchanges with the conversational agent.
//!
//! - `session`: the per-message protocol state machine.
//!
//! [`AgentClient`] is the entry point: it owns the transport and the session
//! store and runs one fresh [`session::AgentSession`] per question.

pub mod session;

use convai_realtime::Connector;
use relay_core::{ChatId, SessionOutcome, SessionStore};
use std::{sync::Arc, time::Duration};

/// Reply used when the agent answered with nothing but whitespace.
pub const FALLBACK_REPLY: &str = "I am here. Can you rephrase that?";

/// Channel name reported to the agent in the dynamic variables.
pub const CHANNEL: &str = "telegram";

/// Timing and identity parameters for agent exchanges.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Hard deadline for the whole exchange, connect included.
    pub timeout: Duration,
    /// How long to wait for a ready event before sending the user text anyway.
    pub ready_grace: Duration,
    /// Silence after the last fragment that marks the answer as complete.
    pub quiet_period: Duration,
    pub channel: String,
    pub originator: String,
    pub fallback_reply: String,
}

impl SessionSettings {
    pub fn new(timeout: Duration, originator: impl Into<String>) -> Self {
        Self {
            timeout,
            ready_grace: Duration::from_millis(500),
            quiet_period: Duration::from_millis(600),
            channel: CHANNEL.to_string(),
            originator: originator.into(),
            fallback_reply: FALLBACK_REPLY.to_string(),
        }
    }
}

/// Runs agent exchanges, resuming each chat's conversation when one is known.
#[derive(Clone)]
pub struct AgentClient {
    connector: Arc<dyn Connector>,
    store: Arc<dyn SessionStore>,
    settings: Arc<SessionSettings>,
}

impl AgentClient {
    pub fn new(
        connector: Arc<dyn Connector>,
        store: Arc<dyn SessionStore>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            connector,
            store,
            settings: Arc::new(settings),
        }
    }

    /// Asks the agent one question on behalf of `chat_id`.
    ///
    /// Never fails: every error is folded into [`SessionOutcome::Failure`].
    pub async fn ask(&self, chat_id: &ChatId, text: &str) -> SessionOutcome {
        session::AgentSession::new(chat_id, text, self.store.as_ref(), &self.settings)
            .run(self.connector.as_ref())
            .await
    }
}

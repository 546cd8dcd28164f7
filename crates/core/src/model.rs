//! Domain types shared by the relay: chat and conversation identities,
//! polled updates, and the outcome of a single agent exchange.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a conversation endpoint on the chat platform.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ChatId(String);

impl ChatId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for ChatId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for ChatId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A multi-turn conversation handle issued by the agent.
///
/// Handles are only ever created from values the agent reported; an empty
/// string is never a valid handle.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Wraps an agent-reported id, rejecting empty values.
    pub fn parse(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.is_empty() { None } else { Some(Self(id)) }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One raw entry of the polled update feed.
///
/// Every update advances the polling cursor, whether or not it carries a
/// message the relay can answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub update_id: i64,
    pub chat_id: Option<ChatId>,
    pub text: Option<String>,
}

impl Update {
    /// Converts the update into an answerable message.
    ///
    /// Returns `None` for updates without a chat, without text, or whose text
    /// is blank after trimming.
    pub fn into_message(self) -> Option<InboundMessage> {
        let chat_id = self.chat_id?;
        let text = self.text?.trim().to_string();
        if text.is_empty() {
            return None;
        }
        Some(InboundMessage {
            update_id: self.update_id,
            chat_id,
            text,
        })
    }
}

/// A user message ready to be forwarded to the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub update_id: i64,
    pub chat_id: ChatId,
    /// Non-empty, trimmed text.
    pub text: String,
}

/// Why an agent exchange produced no reply.
///
/// The `Display` text is the failure reason recorded for operators.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionFailure {
    #[error("connect error")]
    Connect,
    #[error("{0}")]
    Protocol(String),
    #[error("connection closed before final response (code={}, reason={})", fmt_code(.code), fmt_reason(.reason))]
    Closed { code: Option<u16>, reason: String },
    #[error("timeout")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
}

fn fmt_code(code: &Option<u16>) -> String {
    code.map(|c| c.to_string()).unwrap_or_else(|| "n/a".to_string())
}

fn fmt_reason(reason: &str) -> &str {
    if reason.is_empty() { "n/a" } else { reason }
}

/// The single result of one agent exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Reply(String),
    Failure(SessionFailure),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(text: Option<&str>) -> Update {
        Update {
            update_id: 7,
            chat_id: Some(ChatId::from(42)),
            text: text.map(str::to_string),
        }
    }

    #[test]
    fn test_update_into_message_trims_text() {
        let msg = update(Some("  hi there \n")).into_message().unwrap();
        assert_eq!(msg.text, "hi there");
        assert_eq!(msg.chat_id.as_str(), "42");
        assert_eq!(msg.update_id, 7);
    }

    #[test]
    fn test_update_without_usable_text_is_discarded() {
        assert!(update(None).into_message().is_none());
        assert!(update(Some("   \t")).into_message().is_none());

        let no_chat = Update {
            update_id: 1,
            chat_id: None,
            text: Some("hello".into()),
        };
        assert!(no_chat.into_message().is_none());
    }

    #[test]
    fn test_conversation_id_rejects_empty() {
        assert!(ConversationId::parse("").is_none());
        assert_eq!(ConversationId::parse("abc").unwrap().as_str(), "abc");
    }

    #[test]
    fn test_session_failure_display() {
        assert_eq!(SessionFailure::Connect.to_string(), "connect error");
        assert_eq!(SessionFailure::Timeout.to_string(), "timeout");
        assert_eq!(
            SessionFailure::Protocol("quota exceeded".into()).to_string(),
            "quota exceeded"
        );
        assert_eq!(
            SessionFailure::Closed {
                code: Some(1008),
                reason: "policy".into()
            }
            .to_string(),
            "connection closed before final response (code=1008, reason=policy)"
        );
        assert_eq!(
            SessionFailure::Closed {
                code: None,
                reason: String::new()
            }
            .to_string(),
            "connection closed before final response (code=n/a, reason=n/a)"
        );
    }

    #[test]
    fn test_chat_id_serializes_transparently() {
        let json = serde_json::to_string(&ChatId::from("42")).unwrap();
        assert_eq!(json, "\"42\"");
    }
}

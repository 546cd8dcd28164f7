//! Wire format of the conversational agent WebSocket protocol.

use serde::Serialize;
use serde_json::Value;

/// Event type of the initiation acknowledgement, current protocol.
pub const INITIATION_METADATA: &str = "conversation_initiation_metadata";
/// Event type of the initiation acknowledgement, legacy protocol.
pub const CONVERSATION_METADATA: &str = "conversation_metadata";

/// Places where an agent event may carry its conversation id, in priority order.
///
/// Different protocol revisions moved the id around; all known locations are
/// probed so older agents keep resuming conversations.
pub const CONVERSATION_ID_POINTERS: &[&str] = &[
    "/conversation_initiation_metadata_event/conversation_id",
    "/conversation_metadata_event/conversation_id",
    "/conversation_id",
];

const AGENT_RESPONSE_POINTERS: &[&str] = &["/agent_response_event/agent_response", "/text"];

/// Variables the agent can reference while handling the conversation.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct DynamicVariables {
    pub channel: String,
    pub originator: String,
    pub chat_id: String,
}

/// Messages sent from the relay to the agent.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Opens a conversation, resuming `conversation_id` when present.
    ConversationInitiationClientData {
        dynamic_variables: DynamicVariables,
        #[serde(skip_serializing_if = "Option::is_none")]
        conversation_id: Option<String>,
    },
    /// The user's text turn.
    UserMessage { text: String },
}

/// What an agent event means to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEventKind {
    /// The agent acknowledged the conversation and is ready for input.
    SessionReady,
    /// One streamed fragment of the agent's answer.
    AgentResponse(String),
    /// The agent reported an error; the exchange cannot succeed.
    Error(String),
    /// Any other event type, such as audio or pings.
    Other(String),
}

/// A decoded agent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEvent {
    pub kind: ServerEventKind,
    /// Conversation id carried by the event, if any.
    pub conversation_id: Option<String>,
}

impl ServerEvent {
    /// Decodes a text frame. Fails only when the frame is not valid JSON.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        Ok(Self::from_value(&value))
    }

    pub fn from_value(value: &Value) -> Self {
        let event_type = value.get("type").and_then(Value::as_str).unwrap_or_default();
        let kind = match event_type {
            INITIATION_METADATA | CONVERSATION_METADATA => ServerEventKind::SessionReady,
            "agent_response" => ServerEventKind::AgentResponse(
                first_string(value, AGENT_RESPONSE_POINTERS)
                    .unwrap_or_default()
                    .to_string(),
            ),
            "error" => ServerEventKind::Error(
                value
                    .get("message")
                    .and_then(Value::as_str)
                    .filter(|m| !m.is_empty())
                    .unwrap_or("agent returned an error")
                    .to_string(),
            ),
            other => ServerEventKind::Other(other.to_string()),
        };

        Self {
            kind,
            conversation_id: extract_conversation_id(value).map(str::to_string),
        }
    }
}

/// Returns the first non-empty conversation id found via [`CONVERSATION_ID_POINTERS`].
pub fn extract_conversation_id(value: &Value) -> Option<&str> {
    CONVERSATION_ID_POINTERS
        .iter()
        .filter_map(|pointer| value.pointer(pointer).and_then(Value::as_str))
        .find(|id| !id.is_empty())
}

fn first_string<'a>(value: &'a Value, pointers: &[&str]) -> Option<&'a str> {
    pointers
        .iter()
        .filter_map(|pointer| value.pointer(pointer).and_then(Value::as_str))
        .find(|s| !s.is_empty())
}

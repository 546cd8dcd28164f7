//! Telegram Bot API client implementing the chat platform contract.

use async_trait::async_trait;
use relay_core::{ChatError, ChatId, ChatPlatform, Update};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Longest text Telegram accepts in a single message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Extra time granted to a long poll beyond the server-side wait.
const POLL_GRACE: Duration = Duration::from_secs(10);

/// Envelope returned by every Bot API method.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct TelegramUpdate {
    update_id: i64,
    #[serde(default)]
    message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    #[serde(default)]
    chat: Option<TelegramChat>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramChat {
    id: i64,
}

impl From<TelegramUpdate> for Update {
    fn from(update: TelegramUpdate) -> Self {
        let (chat_id, text) = match update.message {
            Some(message) => (message.chat.map(|chat| ChatId::from(chat.id)), message.text),
            None => (None, None),
        };
        Update {
            update_id: update.update_id,
            chat_id,
            text,
        }
    }
}

/// Talks to the Bot API over HTTPS using long polling.
pub struct TelegramClient {
    http: reqwest::Client,
    api_base: String,
    token: SecretString,
    request_timeout: Duration,
}

impl TelegramClient {
    /// `request_timeout` bounds every call except the long poll, which gets
    /// its own wait plus a grace period.
    pub fn new(api_base: impl Into<String>, token: SecretString, request_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into(),
            token,
            request_timeout,
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: serde_json::Value,
        timeout: Duration,
    ) -> Result<T, ChatError> {
        let url = format!(
            "{}/bot{}/{}",
            self.api_base,
            self.token.expose_secret(),
            method
        );
        let request = self.http.post(url).json(&payload).timeout(timeout);

        // reqwest errors embed the URL, which carries the bot token.
        let response = request
            .send()
            .await
            .map_err(|e| ChatError::Http(e.without_url().to_string()))?;
        let status = response.status();
        let body: ApiResponse<T> = response.json().await.map_err(|e| {
            if status.is_success() {
                ChatError::Decode(e.without_url().to_string())
            } else {
                ChatError::Status(status.as_u16())
            }
        })?;

        if !body.ok {
            return Err(ChatError::Api(
                body.description
                    .unwrap_or_else(|| format!("HTTP {}", status.as_u16())),
            ));
        }
        if !status.is_success() {
            return Err(ChatError::Status(status.as_u16()));
        }
        body.result
            .ok_or_else(|| ChatError::Decode(format!("{method} response has no result")))
    }
}

#[async_trait]
impl ChatPlatform for TelegramClient {
    async fn fetch_updates(&self, cursor: i64, wait: Duration) -> Result<Vec<Update>, ChatError> {
        let updates: Vec<TelegramUpdate> = self
            .call(
                "getUpdates",
                json!({ "offset": cursor, "timeout": wait.as_secs() }),
                wait + POLL_GRACE,
            )
            .await?;
        debug!(cursor, count = updates.len(), "Fetched updates");
        Ok(updates.into_iter().map(Update::from).collect())
    }

    async fn send_reply(&self, chat_id: &ChatId, text: &str) -> Result<(), ChatError> {
        for chunk in chunk_text(text, MAX_MESSAGE_CHARS) {
            let _: serde_json::Value = self
                .call(
                    "sendMessage",
                    json!({ "chat_id": chat_id, "text": chunk }),
                    self.request_timeout,
                )
                .await?;
        }
        Ok(())
    }
}

/// Splits text into chunks of at most `max_chars` characters, preferring
/// newline boundaries and never splitting a character. Blank chunks are
/// dropped; the API rejects them.
fn chunk_text(text: &str, max_chars: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut remaining = text;

    while remaining.chars().count() > max_chars {
        let limit = remaining
            .char_indices()
            .nth(max_chars)
            .map(|(idx, _)| idx)
            .unwrap_or(remaining.len());
        let split_at = remaining[..limit]
            .rfind('\n')
            .map(|pos| pos + 1)
            .unwrap_or(limit);

        let chunk = &remaining[..split_at];
        if !chunk.trim().is_empty() {
            chunks.push(chunk);
        }
        remaining = &remaining[split_at..];
    }
    if !remaining.trim().is_empty() || chunks.is_empty() {
        chunks.push(remaining);
    }

    chunks
}

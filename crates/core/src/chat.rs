//! The chat platform collaborator: a long-poll update feed plus reply delivery.

use crate::model::{ChatId, Update};
use async_trait::async_trait;
use std::time::Duration;

/// Errors raised while talking to the chat platform.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("request failed: {0}")]
    Http(String),
    #[error("chat API returned HTTP {0}")]
    Status(u16),
    #[error("chat API error: {0}")]
    Api(String),
    #[error("failed to decode chat API response: {0}")]
    Decode(String),
}

/// A chat platform that exposes a pull-based update feed.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Fetches updates whose id is at least `cursor`, waiting up to `wait`
    /// for new ones to arrive.
    async fn fetch_updates(&self, cursor: i64, wait: Duration) -> Result<Vec<Update>, ChatError>;

    /// Posts a text reply to the chat.
    async fn send_reply(&self, chat_id: &ChatId, text: &str) -> Result<(), ChatError>;
}

//! Core types for the chat-to-agent relay.
//!
//! Holds what every other crate agrees on: identities, polled updates, the
//! outcome of an agent exchange, the session store, and the chat platform
//! contract.

pub mod chat;
pub mod model;
pub mod store;

pub use chat::{ChatError, ChatPlatform};
pub use model::{ChatId, ConversationId, InboundMessage, SessionFailure, SessionOutcome, Update};
pub use store::{MemorySessionStore, SessionStore};

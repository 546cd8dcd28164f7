//! Telegram relay for a conversational agent.
//!
//! This library holds the whole relay: configuration, the Telegram client,
//! the per-message agent session, the dispatcher and its worker pool, the
//! polling loop, and the health router. The `bridge` binary wires them up.

pub mod agent;
pub mod config;
pub mod dispatch;
pub mod handlers;
pub mod poll;
pub mod router;
pub mod telegram;

#[cfg(test)]
mod test_support;

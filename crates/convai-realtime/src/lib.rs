//! Client for the conversational agent's realtime WebSocket protocol.
//!
//! `types` describes the JSON events exchanged with the agent, `client` opens
//! and drives the connection behind the [`Connector`] and [`Connection`] traits.

pub mod client;
pub mod types;

pub use client::{Connection, Connector, DEFAULT_ENDPOINT, Frame, WsConnector};
pub use types::{ClientEvent, DynamicVariables, ServerEvent, ServerEventKind};

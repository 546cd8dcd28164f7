//! WebSocket transport to the conversational agent.

use crate::types::ClientEvent;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{client::IntoClientRequest, protocol::Message as WsMessage},
};
use tracing::{debug, info};
use url::Url;

/// Header carrying the pre-shared API key.
pub const API_KEY_HEADER: &str = "xi-api-key";

/// Default endpoint for agent conversations.
pub const DEFAULT_ENDPOINT: &str = "wss://api.elevenlabs.io/v1/convai/conversation";

/// A frame received from the agent, reduced to what the relay cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A text payload, expected to hold one JSON event.
    Text(String),
    /// The agent closed the connection.
    Closed { code: Option<u16>, reason: String },
}

/// An open duplex connection to the agent.
#[async_trait]
pub trait Connection: Send {
    async fn send(&mut self, event: &ClientEvent) -> Result<()>;

    /// Waits for the next frame. Returns `None` once the stream has ended.
    ///
    /// Must be cancel-safe: dropping the future may not lose a frame.
    async fn recv(&mut self) -> Option<Result<Frame>>;

    /// Closes the connection. Calling it more than once is harmless.
    async fn close(&mut self);
}

/// Opens connections to the agent.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Connection>>;
}

/// Connects to a hosted agent over a TLS WebSocket.
pub struct WsConnector {
    url: Url,
    api_key: SecretString,
}

impl WsConnector {
    /// Builds a connector for `agent_id` at `endpoint`.
    pub fn new(endpoint: &str, agent_id: &str, api_key: SecretString) -> Result<Self> {
        let mut url = Url::parse(endpoint).context("Invalid agent endpoint URL")?;
        url.query_pairs_mut().append_pair("agent_id", agent_id);
        Ok(Self { url, api_key })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>> {
        let mut request = self.url.as_str().into_client_request()?;
        request
            .headers_mut()
            .insert(API_KEY_HEADER, self.api_key.expose_secret().parse()?);

        let (stream, _) = connect_async(request)
            .await
            .context("Failed to connect to agent WebSocket")?;
        info!(host = ?self.url.host_str(), "Connected to agent WebSocket.");
        Ok(Box::new(WsConnection {
            stream,
            closed: false,
        }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

#[async_trait]
impl Connection for WsConnection {
    async fn send(&mut self, event: &ClientEvent) -> Result<()> {
        let payload = serde_json::to_string(event)?;
        self.stream.send(WsMessage::Text(payload.into())).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<Frame>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(e.into())),
            };
            match message {
                WsMessage::Text(text) => return Some(Ok(Frame::Text(text.as_str().to_owned()))),
                WsMessage::Binary(data) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => return Some(Ok(Frame::Text(text))),
                    Err(_) => debug!(len = data.len(), "Discarding non-UTF-8 binary frame."),
                },
                WsMessage::Close(frame) => {
                    self.closed = true;
                    let (code, reason) = match frame {
                        Some(frame) => (Some(u16::from(frame.code)), frame.reason.as_str().to_owned()),
                        None => (None, String::new()),
                    };
                    return Some(Ok(Frame::Closed { code, reason }));
                }
                WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "Agent WebSocket close did not complete cleanly.");
        }
    }
}

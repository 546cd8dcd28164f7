//! The protocol state machine for one question/answer exchange with the agent.
//!
//! A session moves through these phases:
//!
//! 1. connect (bounded by the overall deadline)
//! 2. `AwaitingReady`: the initiation message is sent, resuming the chat's
//!    conversation when the store knows one. The user text goes out on the
//!    first ready event, or when the ready grace period runs out.
//! 3. `Accumulating`: response fragments are appended and a quiet-period
//!    timer is re-armed on each one. When it fires the answer is complete.
//!
//! Errors, early closes and the deadline end the session with a failure.
//! Whatever happens, exactly one [`SessionOutcome`] is produced and the
//! connection is closed before it is returned.

use super::SessionSettings;
use anyhow::Result;
use convai_realtime::{
    ClientEvent, Connection, Connector, DynamicVariables, Frame, ServerEvent, ServerEventKind,
};
use relay_core::{ChatId, ConversationId, SessionFailure, SessionOutcome, SessionStore};
use std::{pin::Pin, time::Duration};
use tokio::time::{Instant, Sleep, sleep, sleep_until, timeout, timeout_at};
use tracing::{debug, info, instrument, trace, warn};

/// Upper bound on waiting for the closing handshake.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Initiation sent; the user text has not been sent yet.
    AwaitingReady,
    /// User text sent; collecting response fragments.
    Accumulating,
}

/// What woke the session up.
#[derive(Debug)]
enum Signal {
    Deadline,
    ReadyGrace,
    Quiet,
    Frame(Option<Result<Frame>>),
}

/// Timers owned by a running session. Dropping them cancels them.
struct Timers {
    deadline: Pin<Box<Sleep>>,
    ready_grace: Pin<Box<Sleep>>,
    quiet: Pin<Box<Sleep>>,
    quiet_armed: bool,
}

/// A single-use exchange: one question in, one outcome out.
pub struct AgentSession<'a> {
    chat_id: &'a ChatId,
    text: &'a str,
    store: &'a dyn SessionStore,
    settings: &'a SessionSettings,
    phase: Phase,
    reply: String,
}

impl<'a> AgentSession<'a> {
    pub fn new(
        chat_id: &'a ChatId,
        text: &'a str,
        store: &'a dyn SessionStore,
        settings: &'a SessionSettings,
    ) -> Self {
        Self {
            chat_id,
            text,
            store,
            settings,
            phase: Phase::AwaitingReady,
            reply: String::new(),
        }
    }

    /// Runs the exchange to completion over a connection from `connector`.
    #[instrument(name = "agent_session", skip_all, fields(chat_id = %self.chat_id))]
    pub async fn run(mut self, connector: &dyn Connector) -> SessionOutcome {
        let deadline = Instant::now() + self.settings.timeout;

        let mut conn = match timeout_at(deadline, connector.connect()).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                warn!(error = ?e, "Failed to open agent connection.");
                return SessionOutcome::Failure(SessionFailure::Connect);
            }
            Err(_) => return SessionOutcome::Failure(SessionFailure::Timeout),
        };

        let outcome = self.drive(conn.as_mut(), deadline).await;

        if timeout(CLOSE_TIMEOUT, conn.close()).await.is_err() {
            debug!("Agent connection did not close in time; dropping it.");
        }
        match &outcome {
            SessionOutcome::Reply(reply) => info!(chars = reply.chars().count(), "Agent replied."),
            SessionOutcome::Failure(reason) => warn!(%reason, "Agent exchange failed."),
        }
        outcome
    }

    async fn drive(&mut self, conn: &mut dyn Connection, deadline: Instant) -> SessionOutcome {
        let resume = self.store.get(self.chat_id);
        debug!(resume = ?resume, "Opening conversation.");

        let init = ClientEvent::ConversationInitiationClientData {
            dynamic_variables: DynamicVariables {
                channel: self.settings.channel.clone(),
                originator: self.settings.originator.clone(),
                chat_id: self.chat_id.to_string(),
            },
            conversation_id: resume.map(|id| id.as_str().to_string()),
        };
        if let Err(outcome) = send_before(conn, &init, deadline).await {
            return outcome;
        }

        let mut timers = Timers {
            deadline: Box::pin(sleep_until(deadline)),
            ready_grace: Box::pin(sleep(self.settings.ready_grace)),
            quiet: Box::pin(sleep(self.settings.quiet_period)),
            quiet_armed: false,
        };

        loop {
            let awaiting_ready = self.phase == Phase::AwaitingReady;
            let quiet_armed = timers.quiet_armed;

            let signal = tokio::select! {
                biased;
                _ = &mut timers.deadline => Signal::Deadline,
                frame = conn.recv() => Signal::Frame(frame),
                _ = &mut timers.quiet, if quiet_armed => Signal::Quiet,
                _ = &mut timers.ready_grace, if awaiting_ready => Signal::ReadyGrace,
            };

            if let Some(outcome) = self.on_signal(signal, conn, &mut timers).await {
                return outcome;
            }
        }
    }

    /// Applies one transition. Returns the outcome once the session is terminal.
    async fn on_signal(
        &mut self,
        signal: Signal,
        conn: &mut dyn Connection,
        timers: &mut Timers,
    ) -> Option<SessionOutcome> {
        match signal {
            Signal::Deadline => Some(SessionOutcome::Failure(SessionFailure::Timeout)),
            Signal::ReadyGrace => {
                debug!("No ready event within the grace period; sending user text.");
                self.send_user_text(conn, timers.deadline.deadline())
                    .await
                    .err()
            }
            Signal::Quiet => Some(SessionOutcome::Reply(self.finish())),
            Signal::Frame(None) => Some(SessionOutcome::Failure(SessionFailure::Closed {
                code: None,
                reason: String::new(),
            })),
            Signal::Frame(Some(Err(e))) => Some(SessionOutcome::Failure(
                SessionFailure::Transport(e.to_string()),
            )),
            Signal::Frame(Some(Ok(Frame::Closed { code, reason }))) => {
                Some(SessionOutcome::Failure(SessionFailure::Closed { code, reason }))
            }
            Signal::Frame(Some(Ok(Frame::Text(text)))) => match ServerEvent::parse(&text) {
                Ok(event) => self.on_event(event, conn, timers).await,
                Err(e) => {
                    debug!(error = %e, "Discarding malformed agent frame.");
                    None
                }
            },
        }
    }

    async fn on_event(
        &mut self,
        event: ServerEvent,
        conn: &mut dyn Connection,
        timers: &mut Timers,
    ) -> Option<SessionOutcome> {
        if let Some(conversation_id) = event.conversation_id.and_then(ConversationId::parse) {
            self.store.put(self.chat_id, conversation_id);
        }

        match event.kind {
            ServerEventKind::SessionReady => self
                .send_user_text(conn, timers.deadline.deadline())
                .await
                .err(),
            ServerEventKind::AgentResponse(fragment) => {
                trace!(fragment = %fragment, "Agent response fragment.");
                self.reply.push_str(&fragment);
                timers
                    .quiet
                    .as_mut()
                    .reset(Instant::now() + self.settings.quiet_period);
                timers.quiet_armed = true;
                None
            }
            ServerEventKind::Error(message) => {
                Some(SessionOutcome::Failure(SessionFailure::Protocol(message)))
            }
            ServerEventKind::Other(kind) => {
                trace!(%kind, "Ignoring agent event.");
                None
            }
        }
    }

    /// Sends the user text unless it has already gone out.
    async fn send_user_text(
        &mut self,
        conn: &mut dyn Connection,
        deadline: Instant,
    ) -> Result<(), SessionOutcome> {
        if self.phase != Phase::AwaitingReady {
            return Ok(());
        }
        self.phase = Phase::Accumulating;

        let message = ClientEvent::UserMessage {
            text: self.text.to_string(),
        };
        send_before(conn, &message, deadline).await
    }

    fn finish(&mut self) -> String {
        let reply = self.reply.trim();
        if reply.is_empty() {
            self.settings.fallback_reply.clone()
        } else {
            reply.to_string()
        }
    }
}

/// Writes one event, giving up at the session deadline.
async fn send_before(
    conn: &mut dyn Connection,
    event: &ClientEvent,
    deadline: Instant,
) -> Result<(), SessionOutcome> {
    match timeout_at(deadline, conn.send(event)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(SessionOutcome::Failure(SessionFailure::Transport(
            e.to_string(),
        ))),
        Err(_) => {
            warn!("Agent connection stalled while sending.");
            Err(SessionOutcome::Failure(SessionFailure::Timeout))
        }
    }
}

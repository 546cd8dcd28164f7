//! Turns inbound chat messages into agent exchanges and delivers the outcome.
//!
//! [`UpdateDispatcher`] handles one message end to end. [`ChatScheduler`]
//! runs dispatcher work on a bounded pool: chats proceed concurrently, while
//! the messages of a single chat are handled strictly one after another, in
//! arrival order.

use crate::agent::AgentClient;
use dashmap::{DashMap, mapref::entry::Entry};
use relay_core::{ChatError, ChatId, ChatPlatform, InboundMessage, SessionOutcome};
use std::{collections::VecDeque, num::NonZeroUsize, sync::Arc};
use tokio::sync::{Notify, Semaphore};
use tracing::{Instrument, debug, error, info_span, instrument, warn};

/// Sent to the user whenever the agent could not produce a reply.
pub const APOLOGY: &str = "Sorry, I hit an issue processing that. Please try again in a moment.";

/// Relays one inbound message to the agent and its outcome back to the chat.
pub struct UpdateDispatcher {
    agent: AgentClient,
    platform: Arc<dyn ChatPlatform>,
}

impl UpdateDispatcher {
    pub fn new(agent: AgentClient, platform: Arc<dyn ChatPlatform>) -> Self {
        Self { agent, platform }
    }

    /// Asks the agent and posts either its reply or the apology.
    ///
    /// Delivery errors are returned to the caller and never retried.
    #[instrument(name = "dispatch", skip_all, fields(update_id = message.update_id, chat_id = %message.chat_id))]
    pub async fn handle(&self, message: &InboundMessage) -> Result<(), ChatError> {
        let reply = match self.agent.ask(&message.chat_id, &message.text).await {
            SessionOutcome::Reply(text) => text,
            SessionOutcome::Failure(reason) => {
                warn!(%reason, "Replying with apology.");
                APOLOGY.to_string()
            }
        };
        self.platform.send_reply(&message.chat_id, &reply).await
    }
}

/// Messages a busy chat may have waiting before new ones are dropped.
pub const MAX_PENDING_PER_CHAT: usize = 32;

/// Per-chat FIFO queues. A chat with an entry has a worker running.
type ChatQueues = DashMap<ChatId, VecDeque<InboundMessage>>;

/// Bounded worker pool with per-chat serialization.
#[derive(Clone)]
pub struct ChatScheduler {
    dispatcher: Arc<UpdateDispatcher>,
    queues: Arc<ChatQueues>,
    permits: Arc<Semaphore>,
    idle: Arc<Notify>,
    max_pending: usize,
}

impl ChatScheduler {
    /// `max_concurrent` bounds how many agent exchanges may run at once.
    pub fn new(dispatcher: Arc<UpdateDispatcher>, max_concurrent: NonZeroUsize) -> Self {
        Self {
            dispatcher,
            queues: Arc::new(DashMap::new()),
            permits: Arc::new(Semaphore::new(max_concurrent.get())),
            idle: Arc::new(Notify::new()),
            max_pending: MAX_PENDING_PER_CHAT,
        }
    }

    /// Overrides how many messages a busy chat may have waiting.
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    /// Schedules a message. Returns immediately; the work runs in the background.
    ///
    /// Returns `false` when the chat's queue is full and the message was dropped.
    pub fn submit(&self, message: InboundMessage) -> bool {
        match self.queues.entry(message.chat_id.clone()) {
            Entry::Occupied(busy) if busy.get().len() >= self.max_pending => {
                warn!(
                    update_id = message.update_id,
                    chat_id = %message.chat_id,
                    pending = busy.get().len(),
                    "Chat queue full; dropping message."
                );
                false
            }
            Entry::Occupied(mut busy) => {
                debug!(
                    update_id = message.update_id,
                    chat_id = %message.chat_id,
                    pending = busy.get().len() + 1,
                    "Chat busy; queueing message."
                );
                busy.get_mut().push_back(message);
                true
            }
            Entry::Vacant(idle) => {
                idle.insert(VecDeque::new());
                let span = info_span!("chat_worker", chat_id = %message.chat_id);
                tokio::spawn(self.clone().drain_chat(message).instrument(span));
                true
            }
        }
    }

    /// Number of chats with an exchange in flight or queued.
    pub fn busy_chats(&self) -> usize {
        self.queues.len()
    }

    /// Resolves once no chat has pending or in-flight work.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.queues.is_empty() {
                return;
            }
            notified.await;
        }
    }

    async fn drain_chat(self, first: InboundMessage) {
        let chat_id = first.chat_id.clone();
        let mut next = Some(first);

        while let Some(message) = next {
            self.process(message).await;
            next = self.take_next(&chat_id);
        }
        self.idle.notify_waiters();
    }

    async fn process(&self, message: InboundMessage) {
        let update_id = message.update_id;
        let Ok(_permit) = self.permits.acquire().await else {
            error!(update_id, "Worker pool closed; dropping message.");
            return;
        };

        // A panic inside one exchange must not strand the rest of the chat's queue.
        let dispatcher = self.dispatcher.clone();
        let task = tokio::spawn(
            async move { dispatcher.handle(&message).await }.in_current_span(),
        );
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(update_id, error = %e, "Failed to deliver reply."),
            Err(e) => error!(update_id, error = %e, "Message handling aborted."),
        }
    }

    /// Pops the chat's next message, or marks the chat idle when none is left.
    fn take_next(&self, chat_id: &ChatId) -> Option<InboundMessage> {
        match self.queues.entry(chat_id.clone()) {
            Entry::Occupied(mut entry) => {
                let next = entry.get_mut().pop_front();
                if next.is_none() {
                    entry.remove();
                }
                next
            }
            Entry::Vacant(_) => None,
        }
    }
}

//! In-memory agent transport driven by per-connection scripts.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use convai_realtime::{ClientEvent, Connection, Connector, Frame};
use relay_core::{ChatError, ChatId, ChatPlatform, Update};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;
use tokio::time::Instant;

/// One scripted action of the fake agent.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    /// Deliver a raw text frame.
    Frame(String),
    /// Deliver a close frame.
    Close(u16, String),
    /// Stay silent for a while.
    Sleep(Duration),
    /// Stay silent until the user text has been sent.
    AwaitUserMessage,
    /// Answer with the user text as a single fragment, once it has been sent.
    Echo,
    /// End the stream without a close frame.
    End,
    /// Fail the read with a transport error.
    RecvError(String),
}

/// How writes on scripted connections misbehave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SendFault {
    /// Every send fails immediately.
    Fail,
    /// Every send hangs forever.
    Stall,
}

pub(crate) fn ready(conversation_id: &str) -> Step {
    Step::Frame(
        json!({
            "type": "conversation_initiation_metadata",
            "conversation_initiation_metadata_event": {"conversation_id": conversation_id}
        })
        .to_string(),
    )
}

pub(crate) fn fragment(text: &str) -> Step {
    Step::Frame(
        json!({
            "type": "agent_response",
            "agent_response_event": {"agent_response": text}
        })
        .to_string(),
    )
}

pub(crate) fn error(message: &str) -> Step {
    Step::Frame(json!({"type": "error", "message": message}).to_string())
}

pub(crate) fn close(code: u16, reason: &str) -> Step {
    Step::Close(code, reason.to_string())
}

/// Hands out one scripted connection per `connect` call, in order.
///
/// Once the scripts run out every further connect attempt fails. After its
/// script is exhausted a connection stays silent forever.
#[derive(Default)]
pub(crate) struct ScriptedConnector {
    scripts: Mutex<VecDeque<Vec<Step>>>,
    sent: Arc<Mutex<Vec<Vec<Value>>>>,
    closes: Arc<AtomicUsize>,
    open: Arc<AtomicUsize>,
    max_open: Arc<AtomicUsize>,
    send_fault: Option<SendFault>,
    connect_delay: Option<Duration>,
}

impl ScriptedConnector {
    pub(crate) fn new(scripts: Vec<Vec<Step>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            ..Default::default()
        }
    }

    pub(crate) fn refusing() -> Self {
        Self::default()
    }

    pub(crate) fn with_send_fault(mut self, fault: SendFault) -> Self {
        self.send_fault = Some(fault);
        self
    }

    /// Delays every successful connect by `delay`.
    pub(crate) fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    /// Events the relay sent on the `index`-th connection.
    pub(crate) fn sent(&self, index: usize) -> Vec<Value> {
        self.sent.lock().unwrap()[index].clone()
    }

    pub(crate) fn user_messages(&self, index: usize) -> usize {
        self.sent(index)
            .iter()
            .filter(|event| event["type"] == "user_message")
            .count()
    }

    pub(crate) fn connections(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub(crate) fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Highest number of connections that were open at the same time.
    pub(crate) fn max_open(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>> {
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        let steps = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("connection refused"))?;

        let open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open.fetch_max(open, Ordering::SeqCst);

        let mut sent = self.sent.lock().unwrap();
        sent.push(Vec::new());
        Ok(Box::new(ScriptedConnection {
            steps: steps.into(),
            index: sent.len() - 1,
            sent: self.sent.clone(),
            closes: self.closes.clone(),
            open: self.open.clone(),
            user_text: None,
            closed: false,
            sleep_until: None,
            send_fault: self.send_fault,
        }))
    }
}

struct ScriptedConnection {
    steps: VecDeque<Step>,
    index: usize,
    sent: Arc<Mutex<Vec<Vec<Value>>>>,
    closes: Arc<AtomicUsize>,
    open: Arc<AtomicUsize>,
    user_text: Option<String>,
    closed: bool,
    sleep_until: Option<Instant>,
    send_fault: Option<SendFault>,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn send(&mut self, event: &ClientEvent) -> Result<()> {
        match self.send_fault {
            Some(SendFault::Fail) => return Err(anyhow!("broken pipe")),
            Some(SendFault::Stall) => return std::future::pending().await,
            None => {}
        }
        if let ClientEvent::UserMessage { text } = event {
            self.user_text = Some(text.clone());
        }
        self.sent.lock().unwrap()[self.index].push(serde_json::to_value(event)?);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<Frame>> {
        loop {
            let Some(step) = self.steps.front().cloned() else {
                return std::future::pending().await;
            };
            match step {
                Step::Frame(text) => {
                    self.steps.pop_front();
                    return Some(Ok(Frame::Text(text)));
                }
                Step::Close(code, reason) => {
                    self.steps.pop_front();
                    return Some(Ok(Frame::Closed {
                        code: Some(code),
                        reason,
                    }));
                }
                Step::Sleep(duration) => {
                    let until = *self
                        .sleep_until
                        .get_or_insert_with(|| Instant::now() + duration);
                    tokio::time::sleep_until(until).await;
                    self.sleep_until = None;
                    self.steps.pop_front();
                }
                Step::AwaitUserMessage => {
                    if self.user_text.is_none() {
                        return std::future::pending().await;
                    }
                    self.steps.pop_front();
                }
                Step::Echo => {
                    let Some(text) = self.user_text.clone() else {
                        return std::future::pending().await;
                    };
                    self.steps.pop_front();
                    if let Step::Frame(frame) = fragment(&text) {
                        return Some(Ok(Frame::Text(frame)));
                    }
                }
                Step::End => {
                    self.steps.pop_front();
                    return None;
                }
                Step::RecvError(message) => {
                    self.steps.pop_front();
                    return Some(Err(anyhow!(message)));
                }
            }
        }
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

mockall::mock! {
    pub Platform {}

    #[async_trait]
    impl ChatPlatform for Platform {
        async fn fetch_updates(&self, cursor: i64, wait: Duration) -> Result<Vec<Update>, ChatError>;
        async fn send_reply(&self, chat_id: &ChatId, text: &str) -> Result<(), ChatError>;
    }
}

//! Long-polls the chat platform and feeds every message to the scheduler.

use crate::dispatch::ChatScheduler;
use relay_core::{ChatError, ChatPlatform};
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info};

/// Server-side wait of each long-poll request.
pub const LONG_POLL_WAIT: Duration = Duration::from_secs(30);

/// Pause after a failed fetch before trying again.
pub const FETCH_BACKOFF: Duration = Duration::from_secs(2);

pub struct PollLoop {
    platform: Arc<dyn ChatPlatform>,
    scheduler: ChatScheduler,
    cursor: i64,
}

impl PollLoop {
    pub fn new(platform: Arc<dyn ChatPlatform>, scheduler: ChatScheduler) -> Self {
        Self {
            platform,
            scheduler,
            cursor: 0,
        }
    }

    /// The update id the next fetch starts from.
    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    /// Fetches one batch and schedules its messages in arrival order.
    ///
    /// The cursor moves past the whole batch before anything is dispatched,
    /// so a message that fails to process is never fetched again.
    /// Returns how many messages were scheduled.
    pub async fn run_once(&mut self) -> Result<usize, ChatError> {
        let updates = self
            .platform
            .fetch_updates(self.cursor, LONG_POLL_WAIT)
            .await?;

        if let Some(last) = updates.iter().map(|update| update.update_id).max() {
            self.cursor = self.cursor.max(last + 1);
        }

        let mut scheduled = 0;
        for update in updates {
            let update_id = update.update_id;
            match update.into_message() {
                Some(message) => {
                    if self.scheduler.submit(message) {
                        scheduled += 1;
                    }
                }
                None => debug!(update_id, "Skipping update without text."),
            }
        }
        Ok(scheduled)
    }

    /// Polls forever. Fetch errors are logged and retried after [`FETCH_BACKOFF`].
    pub async fn run(mut self) {
        info!("Polling for chat updates.");
        loop {
            match self.run_once().await {
                Ok(0) => {}
                Ok(scheduled) => debug!(scheduled, cursor = self.cursor, "Batch scheduled."),
                Err(e) => {
                    error!(error = %e, cursor = self.cursor, "Chat polling error.");
                    tokio::time::sleep(FETCH_BACKOFF).await;
                }
            }
        }
    }
}

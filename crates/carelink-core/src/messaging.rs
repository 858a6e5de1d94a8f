//! Conversation polling.
//!
//! Messaging is plain request/response; clients poll a conversation on a
//! fixed interval and show whatever arrived since the last poll.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::api::error::Result;
use crate::api::AuthenticatedClient;
use crate::models::Message;

/// Default polling interval in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

pub struct MessagePoller {
    client: Arc<AuthenticatedClient>,
    conversation_id: i64,
    last_seen_id: Option<i64>,
    interval: Duration,
}

impl MessagePoller {
    pub fn new(client: Arc<AuthenticatedClient>, conversation_id: i64, interval: Duration) -> Self {
        Self {
            client,
            conversation_id,
            last_seen_id: None,
            interval,
        }
    }

    pub fn conversation_id(&self) -> i64 {
        self.conversation_id
    }

    pub fn last_seen_id(&self) -> Option<i64> {
        self.last_seen_id
    }

    /// Fetch the conversation and return the messages not returned before.
    /// The first poll returns the whole history.
    pub async fn poll_once(&mut self) -> Result<Vec<Message>> {
        let messages = self.client.fetch_messages(self.conversation_id).await?;

        let fresh: Vec<Message> = match self.last_seen_id {
            Some(last) => messages.into_iter().filter(|m| m.id > last).collect(),
            None => messages,
        };

        if let Some(newest) = fresh.iter().map(|m| m.id).max() {
            self.last_seen_id = Some(self.last_seen_id.map_or(newest, |last| last.max(newest)));
        }
        debug!(
            conversation_id = self.conversation_id,
            new_messages = fresh.len(),
            "Polled conversation"
        );
        Ok(fresh)
    }

    /// Poll until the session ends or the server rejects the conversation.
    ///
    /// Transient failures are logged and retried on the next tick. Only
    /// returns with the error that stopped it.
    pub async fn run<F>(mut self, mut on_messages: F) -> Result<()>
    where
        F: FnMut(Vec<Message>),
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.poll_once().await {
                Ok(messages) if messages.is_empty() => {}
                Ok(messages) => on_messages(messages),
                Err(e) if e.is_transient() => {
                    warn!(
                        conversation_id = self.conversation_id,
                        error = %e,
                        "Poll failed, will retry"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}

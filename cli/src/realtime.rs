//! Per-user ledger event topics backing the `/api/events` stream.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;

use tally_core::error::{Result, TallyError};
use tally_core::events::{Broadcaster, LedgerEvent};

pub const TOPIC_CAPACITY: usize = 64;

/// One broadcast channel per user, created on first subscription.
pub struct TopicHub {
    topics: Mutex<HashMap<String, broadcast::Sender<String>>>,
    capacity: usize,
}

impl TopicHub {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    pub fn subscribe(&self, user_id: &str) -> broadcast::Receiver<String> {
        let mut topics = self
            .topics
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let sender = topics
            .entry(user_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        tracing::info!(user_id, subscribers = sender.receiver_count() + 1, "event stream opened");
        sender.subscribe()
    }

    pub fn subscriber_count(&self, user_id: &str) -> usize {
        let topics = self
            .topics
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        topics.get(user_id).map_or(0, broadcast::Sender::receiver_count)
    }
}

impl Default for TopicHub {
    fn default() -> Self {
        Self::new(TOPIC_CAPACITY)
    }
}

impl Broadcaster for TopicHub {
    fn publish(&self, user_id: &str, event: &LedgerEvent) -> Result<()> {
        let payload = serde_json::to_string(event)
            .map_err(|e| TallyError::Notification(format!("failed to encode event: {e}")))?;

        let mut topics = self
            .topics
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(sender) = topics.get(user_id) else {
            return Ok(());
        };
        match sender.send(payload) {
            Ok(delivered) => {
                tracing::debug!(user_id, event = event.kind(), delivered, "ledger event published");
            }
            Err(_) => {
                // Every subscriber has gone away.
                topics.remove(user_id);
                tracing::debug!(user_id, "dropped idle event topic");
            }
        }
        Ok(())
    }
}

//! Topic-based in-process event bus.
//!
//! Components that need to notify interested listeners (lecturer dashboards,
//! the notification forwarder) publish serialized events to a topic; tests and
//! transport adapters subscribe. The bus is injected through `AppState`, never
//! reached through a process-wide global.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};

const CHANNEL_CAPACITY: usize = 64;

/// Cheaply cloneable handle to the shared topic registry.
#[derive(Clone, Default)]
pub struct EventBus {
    topics: Arc<RwLock<HashMap<String, broadcast::Sender<String>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to a topic, creating it on first use.
    pub async fn subscribe(&self, topic: &str) -> broadcast::Receiver<String> {
        let mut topics = self.topics.write().await;
        topics
            .entry(topic.to_owned())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publishes a payload to a topic. A publish with no subscribers is a no-op.
    pub async fn publish(&self, topic: &str, payload: String) {
        let topics = self.topics.read().await;
        if let Some(tx) = topics.get(topic) {
            // Send only fails when every receiver is gone; that is fine.
            let _ = tx.send(payload);
        }
    }

    /// Number of live subscribers on a topic.
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        let topics = self.topics.read().await;
        topics.get(topic).map(|tx| tx.receiver_count()).unwrap_or(0)
    }
}

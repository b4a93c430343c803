//! Broadcaster
//!
//! Fans a publisher's line out to every subscriber of its topic. The whole
//! pass runs under the registry lock: the subscriber snapshot, the writes and
//! the pruning of subscribers whose write failed. A failed or timed-out write
//! only removes that subscriber; delivery to the rest continues.

use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::broker::message::Envelope;
use crate::broker::registry::Registry;
use crate::config::BrokerSettings;

#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Registry,
    write_timeout: Duration,
}

impl Broadcaster {
    pub fn new(registry: Registry, write_timeout: Duration) -> Self {
        Self {
            registry,
            write_timeout,
        }
    }

    pub fn from_settings(registry: Registry, settings: &BrokerSettings) -> Self {
        Self::new(registry, Duration::from_millis(settings.write_timeout_ms))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Delivers `message` from `sender` to every current subscriber of `topic`.
    ///
    /// Returns the number of subscribers the envelope was written to. A topic
    /// with no subscribers is not an error and yields 0.
    pub async fn publish(&self, topic: &str, message: &str, sender: &str) -> usize {
        let line = Envelope::new(topic, sender, message).to_line();

        let mut state = self.registry.lock().await;
        let subscribers = state.subscribers_of(topic);
        if subscribers.is_empty() {
            debug!(topic, "no subscribers for topic");
            return 0;
        }

        let mut delivered = 0;
        let mut dead = Vec::new();
        for subscriber in &subscribers {
            match timeout(self.write_timeout, subscriber.send_line(&line)).await {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    warn!(peer = %subscriber.addr(), topic, error = %e, "delivery failed");
                    dead.push(subscriber.id());
                }
                Err(_) => {
                    warn!(peer = %subscriber.addr(), topic, "delivery timed out");
                    dead.push(subscriber.id());
                }
            }
        }

        for id in dead {
            if let Some(member) = state.remove(id) {
                member.handle.close().await;
                info!(id, peer = %member.handle.addr(), topic, "pruned dead subscriber");
            }
        }

        info!(topic, delivered, "message delivered to {delivered} subscriber(s)");
        delivered
    }
}

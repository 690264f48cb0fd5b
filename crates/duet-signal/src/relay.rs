//! Relay channel abstraction and the in-process broadcast hub.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use duet_shared::protocol::SignalMessage;

/// Errors produced by a relay implementation.
#[derive(Error, Debug)]
pub enum RelayError {
    /// The relay could not deliver the message at all (e.g. the backing
    /// transport is gone). Per-subscriber delivery failures are not
    /// errors; delivery is best-effort by contract.
    #[error("Relay send failed on topic {0}")]
    SendFailed(String),
}

/// Handle identifying one subscription on a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A message-passing channel between call participants.
///
/// Semantics every implementation must provide:
/// - broadcast: every live subscriber of a topic receives every message
///   sent to it, including the sender's own subscription;
/// - no ordering guarantee beyond per-sender FIFO;
/// - best-effort delivery: subscribers that went away are skipped.
pub trait SignalRelay: Send + Sync {
    /// Subscribe to a topic. Messages arrive on the returned receiver
    /// until [`SignalRelay::unsubscribe`] is called or the receiver is
    /// dropped.
    fn subscribe(
        &self,
        topic: &str,
    ) -> (SubscriptionId, mpsc::UnboundedReceiver<SignalMessage>);

    /// Broadcast a message to every subscriber of the topic.
    fn send(&self, topic: &str, message: SignalMessage) -> Result<(), RelayError>;

    /// Remove one subscription. Unknown ids are a no-op.
    fn unsubscribe(&self, topic: &str, id: SubscriptionId);
}

/// In-process relay hub.
///
/// Fan-out over unbounded tokio channels; senders whose receiver has been
/// dropped are pruned on the next send to their topic.
pub struct MemoryRelay {
    topics: Mutex<HashMap<String, Vec<(SubscriptionId, mpsc::UnboundedSender<SignalMessage>)>>>,
    next_id: AtomicU64,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of live subscriptions on a topic (test/diagnostic helper).
    pub fn subscriber_count(&self, topic: &str) -> usize {
        let topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        topics.get(topic).map(|subs| subs.len()).unwrap_or(0)
    }
}

impl Default for MemoryRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalRelay for MemoryRelay {
    fn subscribe(
        &self,
        topic: &str,
    ) -> (SubscriptionId, mpsc::UnboundedReceiver<SignalMessage>) {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();

        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        topics.entry(topic.to_string()).or_default().push((id, tx));

        debug!(topic, id = id.0, "relay subscription added");
        (id, rx)
    }

    fn send(&self, topic: &str, message: SignalMessage) -> Result<(), RelayError> {
        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());

        let Some(subs) = topics.get_mut(topic) else {
            // Nobody listening yet. The protocol tolerates lost messages,
            // so this is not an error.
            debug!(topic, kind = message.payload.kind(), "dropping signal, no subscribers");
            return Ok(());
        };

        subs.retain(|(id, tx)| {
            if tx.send(message.clone()).is_err() {
                debug!(topic, id = id.0, "pruning closed relay subscription");
                false
            } else {
                true
            }
        });

        if subs.is_empty() {
            warn!(topic, "all subscribers gone, signal dropped");
            topics.remove(topic);
        }
        Ok(())
    }

    fn unsubscribe(&self, topic: &str, id: SubscriptionId) {
        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(subs) = topics.get_mut(topic) {
            subs.retain(|(sub_id, _)| *sub_id != id);
            if subs.is_empty() {
                topics.remove(topic);
            }
            debug!(topic, id = id.0, "relay subscription removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duet_shared::protocol::SignalPayload;
    use duet_shared::types::{CallId, UserId};

    fn hangup(from: UserId, to: UserId, call_id: CallId) -> SignalMessage {
        SignalMessage {
            sender: from,
            target: to,
            call_id,
            payload: SignalPayload::Hangup,
        }
    }

    #[test]
    fn broadcast_reaches_every_subscriber() {
        let relay = MemoryRelay::new();
        let call = CallId::new();
        let topic = call.to_topic();

        let (_id_a, mut rx_a) = relay.subscribe(&topic);
        let (_id_b, mut rx_b) = relay.subscribe(&topic);

        let from = UserId::new();
        let to = UserId::new();
        relay.send(&topic, hangup(from, to, call)).unwrap();

        assert_eq!(rx_a.try_recv().unwrap().sender, from);
        assert_eq!(rx_b.try_recv().unwrap().sender, from);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let relay = MemoryRelay::new();
        let call = CallId::new();
        let topic = call.to_topic();

        let (id, mut rx) = relay.subscribe(&topic);
        relay.unsubscribe(&topic, id);

        relay
            .send(&topic, hangup(UserId::new(), UserId::new(), call))
            .unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(relay.subscriber_count(&topic), 0);
    }

    #[test]
    fn send_without_subscribers_is_ok() {
        let relay = MemoryRelay::new();
        let call = CallId::new();
        relay
            .send(&call.to_topic(), hangup(UserId::new(), UserId::new(), call))
            .unwrap();
    }

    #[test]
    fn dropped_receiver_is_pruned_on_send() {
        let relay = MemoryRelay::new();
        let call = CallId::new();
        let topic = call.to_topic();

        let (_id, rx) = relay.subscribe(&topic);
        drop(rx);
        assert_eq!(relay.subscriber_count(&topic), 1);

        relay
            .send(&topic, hangup(UserId::new(), UserId::new(), call))
            .unwrap();
        assert_eq!(relay.subscriber_count(&topic), 0);
    }
}

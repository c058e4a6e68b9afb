//! Live subscriber registry
//!
//! Process-wide map from channel name to the set of attached push-stream
//! handles, plus the distinguished `"*"` key whose subscribers receive every
//! event regardless of channel. Handles are bounded mpsc senders; a send
//! that fails (receiver gone, or a subscriber too slow to drain its buffer)
//! evicts the handle. Iteration always runs over a snapshot so concurrent
//! unsubscribes never corrupt a traversal.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::core::constants::SUBSCRIBER_CHANNEL_CAPACITY;

/// Registry key whose subscribers see every channel
pub const ALL_CHANNELS: &str = "*";

pub type SubscriberId = u64;

/// A single wire frame queued to a subscriber
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// `id: <id>` + `data: <json>` lines
    Event { id: String, data: String },
    /// `: keepalive` comment line
    Keepalive,
}

#[derive(Clone)]
struct Subscriber {
    id: SubscriberId,
    tx: mpsc::Sender<Frame>,
}

pub struct SubscriberRegistry {
    channels: RwLock<HashMap<String, Vec<Subscriber>>>,
    next_id: AtomicU64,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Attach a new subscriber to `ch` and hand back its frame receiver
    pub fn subscribe(&self, ch: &str) -> (SubscriberId, mpsc::Receiver<Frame>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);

        let mut channels = self.channels.write();
        channels
            .entry(ch.to_string())
            .or_default()
            .push(Subscriber { id, tx });

        tracing::debug!(ch, subscriber = id, "subscriber attached");
        (id, rx)
    }

    pub fn unsubscribe(&self, ch: &str, id: SubscriberId) {
        let mut channels = self.channels.write();
        if let Some(subs) = channels.get_mut(ch) {
            subs.retain(|s| s.id != id);
            if subs.is_empty() {
                channels.remove(ch);
            }
        }
        tracing::debug!(ch, subscriber = id, "subscriber detached");
    }

    /// Deliver a frame to every subscriber of `ch`, evicting failed handles
    ///
    /// `try_send` keeps the caller from ever blocking on a slow subscriber:
    /// a full buffer counts as a failure and the handle is evicted.
    pub fn deliver(&self, ch: &str, frame: &Frame) {
        let snapshot: Vec<Subscriber> = {
            let channels = self.channels.read();
            match channels.get(ch) {
                Some(subs) => subs.clone(),
                None => return,
            }
        };

        let mut failed = Vec::new();
        for sub in &snapshot {
            if sub.tx.try_send(frame.clone()).is_err() {
                failed.push(sub.id);
            }
        }

        for id in failed {
            tracing::debug!(ch, subscriber = id, "evicting subscriber after failed send");
            self.unsubscribe(ch, id);
        }
    }

    /// Send a keepalive comment to every subscriber of every channel
    pub fn keepalive(&self) {
        let snapshot: Vec<(String, Vec<Subscriber>)> = {
            let channels = self.channels.read();
            channels
                .iter()
                .map(|(ch, subs)| (ch.clone(), subs.clone()))
                .collect()
        };

        for (ch, subs) in snapshot {
            let mut failed = Vec::new();
            for sub in &subs {
                if sub.tx.try_send(Frame::Keepalive).is_err() {
                    failed.push(sub.id);
                }
            }
            for id in failed {
                tracing::debug!(ch, subscriber = id, "evicting subscriber on keepalive");
                self.unsubscribe(&ch, id);
            }
        }
    }

    /// Number of currently attached handles across all channels
    pub fn connection_count(&self) -> usize {
        self.channels.read().values().map(Vec::len).sum()
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str) -> Frame {
        Frame::Event {
            id: id.to_string(),
            data: format!("{{\"id\":\"{}\"}}", id),
        }
    }

    #[tokio::test]
    async fn test_subscriber_receives_delivered_frame() {
        let registry = SubscriberRegistry::new();
        let (_id, mut rx) = registry.subscribe("alpha");

        registry.deliver("alpha", &event("M1"));

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame, event("M1"));
    }

    #[tokio::test]
    async fn test_delivery_is_scoped_to_channel() {
        let registry = SubscriberRegistry::new();
        let (_a, mut alpha_rx) = registry.subscribe("alpha");
        let (_b, mut beta_rx) = registry.subscribe("beta");

        registry.deliver("alpha", &event("M1"));

        assert_eq!(alpha_rx.recv().await.unwrap(), event("M1"));
        assert!(beta_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let registry = SubscriberRegistry::new();
        let (id, mut rx) = registry.subscribe("alpha");

        registry.unsubscribe("alpha", id);
        registry.deliver("alpha", &event("M1"));

        assert!(rx.try_recv().is_err());
        assert_eq!(registry.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_receiver_evicted_on_send() {
        let registry = SubscriberRegistry::new();
        let (_id, rx) = registry.subscribe("alpha");
        drop(rx);

        assert_eq!(registry.connection_count(), 1);
        registry.deliver("alpha", &event("M1"));
        assert_eq!(registry.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_keepalive_reaches_all_and_reaps_dead() {
        let registry = SubscriberRegistry::new();
        let (_a, mut live_rx) = registry.subscribe("alpha");
        let (_b, dead_rx) = registry.subscribe("beta");
        drop(dead_rx);

        registry.keepalive();

        assert_eq!(live_rx.recv().await.unwrap(), Frame::Keepalive);
        assert_eq!(registry.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_full_buffer_evicts_slow_subscriber() {
        let registry = SubscriberRegistry::new();
        let (_id, _rx) = registry.subscribe("alpha");

        // Never drained: fills the buffer, then the next send evicts
        for i in 0..=SUBSCRIBER_CHANNEL_CAPACITY {
            registry.deliver("alpha", &event(&format!("M{}", i)));
        }
        assert_eq!(registry.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_subscribe_unsubscribe() {
        use std::sync::Arc;

        let registry = Arc::new(SubscriberRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let reg = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                for _ in 0..50 {
                    let (id, rx) = reg.subscribe("alpha");
                    reg.deliver("alpha", &Frame::Keepalive);
                    drop(rx);
                    reg.unsubscribe("alpha", id);
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(registry.connection_count(), 0);
    }
}

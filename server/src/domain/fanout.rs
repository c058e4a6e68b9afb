//! Publish pipeline and fan-out engine
//!
//! `ChannelService::publish` is the single path every message takes: mint an
//! id, stamp the timestamp, persist, then fan out. Persisting first, on a
//! store that serializes writes, is what gives subscribers per-channel
//! publish order and monotone ids.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::core::constants::KEEPALIVE_INTERVAL_SECS;
use crate::data::sqlite::repositories::message;
use crate::data::sqlite::{SqliteError, SqliteService};
use crate::domain::envelope::{Envelope, PublishRequest};
use crate::domain::registry::{ALL_CHANNELS, Frame, SubscriberRegistry};
use crate::utils::{id, time};

pub struct ChannelService {
    db: Arc<SqliteService>,
    registry: Arc<SubscriberRegistry>,
}

impl ChannelService {
    pub fn new(db: Arc<SqliteService>, registry: Arc<SubscriberRegistry>) -> Self {
        Self { db, registry }
    }

    /// Mint, persist, and fan out a message. Returns the stored envelope.
    ///
    /// Caller is responsible for field validation; `ch` always comes from
    /// the URL, never the body.
    pub async fn publish(&self, ch: &str, req: PublishRequest) -> Result<Envelope, SqliteError> {
        let env = Envelope {
            id: id::mint(),
            ts: time::now_secs(),
            from: req.from,
            ch: ch.to_string(),
            kind: req.kind,
            v: req.v,
            body: req.body,
            files: req.files,
            reply_to: req.reply_to,
        };

        message::insert_message(self.db.pool(), &env).await?;
        self.fan_out(&env);
        Ok(env)
    }

    /// Encode once, deliver to the channel's subscribers and to the
    /// all-channels set.
    fn fan_out(&self, env: &Envelope) {
        let data = match serde_json::to_string(env) {
            Ok(data) => data,
            Err(e) => {
                tracing::error!(id = %env.id, error = %e, "failed to encode envelope for fan-out");
                return;
            }
        };

        let frame = Frame::Event {
            id: env.id.clone(),
            data,
        };
        self.registry.deliver(&env.ch, &frame);
        if env.ch != ALL_CHANNELS {
            self.registry.deliver(ALL_CHANNELS, &frame);
        }
    }
}

/// Background keepalive emitter
///
/// Wakes every 20 seconds and writes a comment frame to every attached
/// handle; failed sends evict, which is how dead subscribers are reaped
/// between messages.
pub fn start_keepalive_task(
    registry: Arc<SubscriberRegistry>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(KEEPALIVE_INTERVAL_SECS));
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::debug!("keepalive task shutting down");
                        break;
                    }
                }
                _ = interval.tick() => {
                    registry.keepalive();
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn service() -> (ChannelService, Arc<SubscriberRegistry>) {
        let db = Arc::new(SqliteService::memory().await);
        let registry = Arc::new(SubscriberRegistry::new());
        (ChannelService::new(db, Arc::clone(&registry)), registry)
    }

    fn request(from: &str, kind: &str) -> PublishRequest {
        PublishRequest {
            from: from.to_string(),
            kind: kind.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_publish_persists_and_returns_envelope() {
        let (service, _registry) = service().await;

        let env = service.publish("alpha", request("u", "t")).await.unwrap();
        assert_eq!(env.id.len(), 26);
        assert_eq!(env.ch, "alpha");
        assert!(env.ts > 0.0);

        let stored = message::list_channel_messages(service.db.pool(), "alpha", None, None, 200)
            .await
            .unwrap();
        assert_eq!(stored, vec![env]);
    }

    #[tokio::test]
    async fn test_fan_out_reaches_channel_and_sentinel_with_same_frame() {
        let (service, registry) = service().await;
        let (_a, mut ch_rx) = registry.subscribe("alpha");
        let (_b, mut all_rx) = registry.subscribe(ALL_CHANNELS);

        let env = service.publish("alpha", request("u", "t")).await.unwrap();

        let ch_frame = ch_rx.recv().await.unwrap();
        let all_frame = all_rx.recv().await.unwrap();
        assert_eq!(ch_frame, all_frame);

        match ch_frame {
            Frame::Event { id, data } => {
                assert_eq!(id, env.id);
                let decoded: Envelope = serde_json::from_str(&data).unwrap();
                assert_eq!(decoded, env);
            }
            Frame::Keepalive => panic!("expected event frame"),
        }
    }

    #[tokio::test]
    async fn test_single_publisher_order_is_preserved() {
        let (service, registry) = service().await;
        let (_id, mut rx) = registry.subscribe("alpha");

        let first = service.publish("alpha", request("u", "t")).await.unwrap();
        let second = service.publish("alpha", request("u", "t")).await.unwrap();

        match rx.recv().await.unwrap() {
            Frame::Event { id, .. } => assert_eq!(id, first.id),
            Frame::Keepalive => panic!("expected event frame"),
        }
        match rx.recv().await.unwrap() {
            Frame::Event { id, .. } => assert_eq!(id, second.id),
            Frame::Keepalive => panic!("expected event frame"),
        }
    }

    #[tokio::test]
    async fn test_other_channel_subscriber_sees_nothing() {
        let (service, registry) = service().await;
        let (_id, mut rx) = registry.subscribe("beta");

        service.publish("alpha", request("u", "t")).await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}

// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel broker: durable append-log plus in-memory subscriber fan-out.
//!
//! The subscriber registry sits behind a plain mutex whose critical
//! sections are limited to add, remove, and snapshot; delivery happens
//! outside the lock on a snapshot of senders. Each subscriber owns a
//! bounded queue; a full queue marks the consumer slow and evicts it,
//! dropping whatever it had not drained.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use berth_config::model::MessagingConfig;
use berth_core::{now_ms, BerthError};
use berth_kernel::ActivityLog;
use berth_store::queries::messages as messages_q;
use berth_store::{ChannelInfo, Database, MessageRow};
use dashmap::DashMap;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

/// One frame on a subscriber's queue.
#[derive(Debug, Clone)]
pub enum BusFrame {
    /// Emitted once immediately after subscribing, and available for
    /// keep-alive purposes.
    Heartbeat,
    /// A publication on the subscribed channel.
    Message(MessageRow),
}

struct SubscriberSlot {
    id: u64,
    source: String,
    tx: mpsc::Sender<BusFrame>,
}

/// Pub/sub broker over the message table.
pub struct Broker {
    db: Arc<Database>,
    config: MessagingConfig,
    activity: Arc<ActivityLog>,
    registry: Mutex<HashMap<String, Vec<SubscriberSlot>>>,
    notifiers: DashMap<String, Arc<Notify>>,
    next_id: AtomicU64,
}

/// A live subscription. Dropping it detaches from the registry.
pub struct Subscription {
    id: u64,
    channel: String,
    rx: mpsc::Receiver<BusFrame>,
    broker: Arc<Broker>,
}

impl Subscription {
    /// Receive the next frame; `None` after eviction or broker shutdown.
    pub async fn recv(&mut self) -> Option<BusFrame> {
        self.rx.recv().await
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broker.remove_subscriber(&self.channel, self.id);
    }
}

impl Broker {
    pub fn new(db: Arc<Database>, config: MessagingConfig, activity: Arc<ActivityLog>) -> Self {
        Self {
            db,
            config,
            activity,
            registry: Mutex::new(HashMap::new()),
            notifiers: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Append a message and deliver it to every live subscriber of the
    /// channel. Returns the stored row with its assigned id.
    pub async fn publish(
        &self,
        channel: &str,
        payload: &str,
        sender: Option<&str>,
    ) -> Result<MessageRow, BerthError> {
        if payload.len() > self.config.max_payload_bytes {
            return Err(BerthError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload_bytes,
            });
        }
        let now = now_ms();
        let id = messages_q::insert(&self.db, channel, payload, sender, now).await?;
        let row = MessageRow {
            id,
            channel: channel.to_string(),
            payload: payload.to_string(),
            sender: sender.map(String::from),
            created_at: now,
        };

        self.fan_out(channel, &row);
        if let Some(notify) = self.notifiers.get(channel) {
            notify.notify_waiters();
        }

        metrics::counter!("berth_publishes_total", "channel" => channel.to_string()).increment(1);
        self.activity
            .record("message", "publish", Some(channel), None, sender)
            .await;
        Ok(row)
    }

    /// Deliver to a snapshot of the channel's subscribers, evicting any
    /// whose queue is full.
    fn fan_out(&self, channel: &str, row: &MessageRow) {
        let snapshot: Vec<(u64, mpsc::Sender<BusFrame>)> = {
            let registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
            match registry.get(channel) {
                Some(slots) => slots.iter().map(|s| (s.id, s.tx.clone())).collect(),
                None => return,
            }
        };

        let mut evict = Vec::new();
        for (id, tx) in snapshot {
            match tx.try_send(BusFrame::Message(row.clone())) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(channel, subscriber = id, "slow consumer evicted");
                    metrics::counter!("berth_subscriber_evictions_total").increment(1);
                    evict.push(id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    evict.push(id);
                }
            }
        }
        for id in evict {
            self.remove_subscriber(channel, id);
        }
    }

    /// Attach a subscriber. Refused when the source already holds the
    /// maximum number of concurrent streams.
    pub fn subscribe(
        self: &Arc<Self>,
        channel: &str,
        source: &str,
    ) -> Result<Subscription, BerthError> {
        let (tx, rx) = mpsc::channel(self.config.subscriber_queue);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        {
            let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
            let held: usize = registry
                .values()
                .flat_map(|slots| slots.iter())
                .filter(|slot| slot.source == source)
                .count();
            if held >= self.config.max_streams_per_source {
                return Err(BerthError::Capacity(format!(
                    "source {source} already holds {held} streams (max {})",
                    self.config.max_streams_per_source
                )));
            }
            registry
                .entry(channel.to_string())
                .or_default()
                .push(SubscriberSlot {
                    id,
                    source: source.to_string(),
                    tx: tx.clone(),
                });
        }

        // First frame is always a heartbeat; capacity is >= 2 by config.
        let _ = tx.try_send(BusFrame::Heartbeat);

        debug!(channel, source, subscriber = id, "subscriber attached");
        metrics::gauge!("berth_live_subscribers").increment(1.0);
        Ok(Subscription {
            id,
            channel: channel.to_string(),
            rx,
            broker: self.clone(),
        })
    }

    fn remove_subscriber(&self, channel: &str, id: u64) {
        let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(slots) = registry.get_mut(channel) {
            let before = slots.len();
            slots.retain(|slot| slot.id != id);
            if slots.len() < before {
                metrics::gauge!("berth_live_subscribers").decrement(1.0);
            }
            if slots.is_empty() {
                registry.remove(channel);
            }
        }
    }

    /// Live subscriber count for one channel.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        let registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        registry.get(channel).map(|s| s.len()).unwrap_or(0)
    }

    /// Stored history in id order.
    pub async fn history(
        &self,
        channel: &str,
        since: i64,
        limit: i64,
    ) -> Result<Vec<MessageRow>, BerthError> {
        messages_q::list(&self.db, channel, since, limit).await
    }

    /// Distinct channels with counts and last-message times.
    pub async fn channels(&self) -> Result<Vec<ChannelInfo>, BerthError> {
        messages_q::channels(&self.db).await
    }

    /// Drop stored history. Live subscribers stay attached.
    pub async fn clear(&self, channel: &str) -> Result<u64, BerthError> {
        let removed = messages_q::clear(&self.db, channel).await?;
        info!(channel, removed, "channel history cleared");
        self.activity
            .record("message", "clear", Some(channel), None, None)
            .await;
        Ok(removed)
    }

    /// Block until something is published on the channel or the timeout
    /// lapses. Used by the history long-poll.
    pub async fn wait_for_publish(&self, channel: &str, timeout: Duration) -> bool {
        let notify = self
            .notifiers
            .entry(channel.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone();
        tokio::time::timeout(timeout, notify.notified()).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup() -> (Arc<Broker>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Arc::new(
            Database::open(dir.path().join("t.db").to_str().unwrap())
                .await
                .unwrap(),
        );
        let activity = Arc::new(ActivityLog::new(db.clone()));
        let config = MessagingConfig {
            subscriber_queue: 4,
            max_streams_per_source: 2,
            max_payload_bytes: 64,
            ..Default::default()
        };
        (Arc::new(Broker::new(db, config, activity)), dir)
    }

    async fn expect_message(sub: &mut Subscription) -> MessageRow {
        loop {
            match sub.recv().await {
                Some(BusFrame::Message(row)) => return row,
                Some(BusFrame::Heartbeat) => continue,
                None => panic!("subscription closed unexpectedly"),
            }
        }
    }

    #[tokio::test]
    async fn fan_out_preserves_publish_order() {
        let (broker, _dir) = setup().await;
        let mut sub_a = broker.subscribe("builds", "127.0.0.1").unwrap();
        let mut sub_b = broker.subscribe("builds", "127.0.0.2").unwrap();

        broker.publish("builds", r#"{"s":1}"#, None).await.unwrap();
        broker.publish("builds", r#"{"s":2}"#, None).await.unwrap();

        for sub in [&mut sub_a, &mut sub_b] {
            let first = expect_message(sub).await;
            let second = expect_message(sub).await;
            assert_eq!(first.payload, r#"{"s":1}"#);
            assert_eq!(second.payload, r#"{"s":2}"#);
            assert!(first.id < second.id);
        }
    }

    #[tokio::test]
    async fn first_frame_is_a_heartbeat() {
        let (broker, _dir) = setup().await;
        let mut sub = broker.subscribe("c", "127.0.0.1").unwrap();
        assert!(matches!(sub.recv().await, Some(BusFrame::Heartbeat)));
    }

    #[tokio::test]
    async fn channel_isolation() {
        let (broker, _dir) = setup().await;
        let mut sub = broker.subscribe("a", "127.0.0.1").unwrap();
        broker.publish("b", "elsewhere", None).await.unwrap();
        broker.publish("a", "here", None).await.unwrap();
        assert_eq!(expect_message(&mut sub).await.payload, "here");
    }

    #[tokio::test]
    async fn slow_consumer_is_evicted() {
        let (broker, _dir) = setup().await;
        let _sub = broker.subscribe("c", "127.0.0.1").unwrap();
        assert_eq!(broker.subscriber_count("c"), 1);

        // Queue capacity is 4 and one slot is the heartbeat; never drained.
        for i in 0..6 {
            broker.publish("c", &format!("m{i}"), None).await.unwrap();
        }
        assert_eq!(broker.subscriber_count("c"), 0, "slow consumer gone");

        // History kept everything even though delivery was dropped.
        let history = broker.history("c", 0, 100).await.unwrap();
        assert_eq!(history.len(), 6);
    }

    #[tokio::test]
    async fn per_source_stream_cap() {
        let (broker, _dir) = setup().await;
        let _a = broker.subscribe("c1", "10.0.0.1").unwrap();
        let _b = broker.subscribe("c2", "10.0.0.1").unwrap();
        let refused = broker.subscribe("c3", "10.0.0.1");
        assert!(matches!(refused, Err(BerthError::Capacity(_))));

        // A different source is unaffected.
        assert!(broker.subscribe("c3", "10.0.0.2").is_ok());
    }

    #[tokio::test]
    async fn dropping_subscription_detaches() {
        let (broker, _dir) = setup().await;
        let sub = broker.subscribe("c", "127.0.0.1").unwrap();
        assert_eq!(broker.subscriber_count("c"), 1);
        drop(sub);
        assert_eq!(broker.subscriber_count("c"), 0);
    }

    #[tokio::test]
    async fn oversized_payload_is_refused() {
        let (broker, _dir) = setup().await;
        let big = "x".repeat(65);
        let err = broker.publish("c", &big, None).await.unwrap_err();
        assert!(matches!(err, BerthError::PayloadTooLarge { .. }));
    }

    #[tokio::test]
    async fn clear_keeps_subscribers_attached() {
        let (broker, _dir) = setup().await;
        let mut sub = broker.subscribe("c", "127.0.0.1").unwrap();
        broker.publish("c", "before", None).await.unwrap();
        broker.clear("c").await.unwrap();
        assert!(broker.history("c", 0, 100).await.unwrap().is_empty());

        // Still live: a fresh publish arrives.
        broker.publish("c", "after", None).await.unwrap();
        let mut seen = Vec::new();
        while let Ok(Some(frame)) =
            tokio::time::timeout(Duration::from_millis(100), sub.recv()).await
        {
            if let BusFrame::Message(row) = frame {
                seen.push(row.payload);
            }
            if seen.len() == 2 {
                break;
            }
        }
        assert_eq!(seen, vec!["before".to_string(), "after".to_string()]);
    }

    #[tokio::test]
    async fn wait_for_publish_wakes_on_publication() {
        let (broker, _dir) = setup().await;
        let waiter = {
            let broker = broker.clone();
            tokio::spawn(async move {
                broker.wait_for_publish("c", Duration::from_secs(5)).await
            })
        };
        // Give the waiter time to park.
        tokio::time::sleep(Duration::from_millis(50)).await;
        broker.publish("c", "wake", None).await.unwrap();
        assert!(waiter.await.unwrap(), "woken before timeout");

        // And the timeout path.
        assert!(!broker.wait_for_publish("idle", Duration::from_millis(50)).await);
    }
}

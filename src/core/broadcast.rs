// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fieldwatch-rs

//! Broadcaster - best-effort fan-out of cycle snapshots to subscribers

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use crate::telemetry::GeneratorBatch;

/// A subscriber's handle: its registry id and the ordered stream of
/// snapshots published after it subscribed.
pub struct Subscription {
    pub id: u64,
    pub receiver: mpsc::Receiver<Arc<GeneratorBatch>>,
}

/// Fan-out registry with per-subscriber failure isolation.
///
/// Delivery is fire-and-forget: each subscriber gets its own bounded
/// channel, so per-subscriber order matches publish order, a full buffer
/// loses the message for that subscriber only, and a closed receiver gets
/// the subscriber evicted. Publishing never fails to the caller.
pub struct Broadcaster {
    subscribers: RwLock<HashMap<u64, mpsc::Sender<Arc<GeneratorBatch>>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl Broadcaster {
    /// `capacity` bounds each subscriber's outbound buffer.
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }

    pub async fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.capacity);

        let mut subscribers = self.subscribers.write().await;
        subscribers.insert(id, tx);
        debug!("Subscriber {} registered ({} active)", id, subscribers.len());

        Subscription { id, receiver: rx }
    }

    pub async fn unsubscribe(&self, id: u64) {
        let mut subscribers = self.subscribers.write().await;
        if subscribers.remove(&id).is_some() {
            debug!("Subscriber {} removed ({} active)", id, subscribers.len());
        }
    }

    /// Deliver one snapshot to every live subscriber; returns how many
    /// accepted it.
    pub async fn publish(&self, batch: Arc<GeneratorBatch>) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();

        {
            let subscribers = self.subscribers.read().await;
            for (&id, tx) in subscribers.iter() {
                match tx.try_send(batch.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        // Slow consumer: this message is lost to it, the
                        // subscription survives
                        debug!("Subscriber {} buffer full, cycle {} dropped", id, batch.sequence);
                    }
                    Err(TrySendError::Closed(_)) => dead.push(id),
                }
            }
        }

        if !dead.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            for id in dead {
                subscribers.remove(&id);
                warn!("Subscriber {} disconnected, dropped from fan-out", id);
            }
        }

        delivered
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn batch(sequence: u64) -> Arc<GeneratorBatch> {
        Arc::new(GeneratorBatch { sequence, timestamp: Utc::now(), generators: vec![] })
    }

    #[tokio::test]
    async fn test_failed_subscriber_does_not_block_others() {
        let broadcaster = Broadcaster::new(8);

        let mut alive_a = broadcaster.subscribe().await;
        let dead = broadcaster.subscribe().await;
        let mut alive_b = broadcaster.subscribe().await;

        // Simulate a send failure by dropping the receiver
        drop(dead.receiver);

        let delivered = broadcaster.publish(batch(1)).await;
        assert_eq!(delivered, 2);
        assert_eq!(alive_a.receiver.recv().await.unwrap().sequence, 1);
        assert_eq!(alive_b.receiver.recv().await.unwrap().sequence, 1);

        // The dead subscriber was evicted
        assert_eq!(broadcaster.subscriber_count().await, 2);
    }

    #[tokio::test]
    async fn test_per_subscriber_order_matches_publish_order() {
        let broadcaster = Broadcaster::new(8);
        let mut sub = broadcaster.subscribe().await;

        for seq in 1..=5 {
            broadcaster.publish(batch(seq)).await;
        }
        for seq in 1..=5 {
            assert_eq!(sub.receiver.recv().await.unwrap().sequence, seq);
        }
    }

    #[tokio::test]
    async fn test_full_buffer_loses_message_but_keeps_subscriber() {
        let broadcaster = Broadcaster::new(1);
        let mut sub = broadcaster.subscribe().await;

        assert_eq!(broadcaster.publish(batch(1)).await, 1);
        // Buffer full: cycle 2 is silently lost to this subscriber
        assert_eq!(broadcaster.publish(batch(2)).await, 0);
        assert_eq!(broadcaster.subscriber_count().await, 1);

        assert_eq!(sub.receiver.recv().await.unwrap().sequence, 1);
        // Drained; cycle 3 arrives normally
        assert_eq!(broadcaster.publish(batch(3)).await, 1);
        assert_eq!(sub.receiver.recv().await.unwrap().sequence, 3);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let broadcaster = Broadcaster::new(4);
        let sub = broadcaster.subscribe().await;
        assert_eq!(broadcaster.subscriber_count().await, 1);
        broadcaster.unsubscribe(sub.id).await;
        assert_eq!(broadcaster.subscriber_count().await, 0);
    }
}

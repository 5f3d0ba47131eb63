//! Live fanout hub for connected viewers
//!
//! Owns the subscriber set and pushes one message per ingested pulse.
//! Delivery failures are local: a subscriber whose send fails is evicted
//! without touching the ingestion path or the remaining subscribers.

use crate::store::PulseRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// One live connection's send side
///
/// `send` must not block; implementations hand the payload to a queue and
/// report `false` once the transport is gone.
pub trait Subscriber: Send + Sync {
    fn send(&self, payload: Arc<str>) -> bool;
    fn is_closed(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Messages pushed over the live channel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HubMessage {
    /// One-time bootstrap on connect: recent history so the viewer can
    /// render without a separate fetch
    #[serde(rename = "HISTORY")]
    History { pulses: Vec<PulseRecord> },
    /// Exactly one per appended record, in append order
    #[serde(rename = "PULSE")]
    Pulse { pulse: PulseRecord },
}

pub struct PulseHub {
    next_subscriber_id: AtomicU64,
    subscribers: RwLock<HashMap<SubscriberId, Arc<dyn Subscriber>>>,
}

impl Default for PulseHub {
    fn default() -> Self {
        Self::new()
    }
}

impl PulseHub {
    pub fn new() -> Self {
        Self {
            next_subscriber_id: AtomicU64::new(1),
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(&self, subscriber: Arc<dyn Subscriber>) -> SubscriberId {
        let id = SubscriberId(self.next_subscriber_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().await.insert(id, subscriber);
        log::debug!("🔌 Subscriber {} registered", id);
        id
    }

    pub async fn unregister(&self, id: SubscriberId) {
        if self.subscribers.write().await.remove(&id).is_some() {
            log::debug!("🔌 Subscriber {} unregistered", id);
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Push one PULSE message to every live subscriber
    ///
    /// The payload is serialized once and shared. Subscribers whose send
    /// fails or whose transport is closed are removed from the set; the
    /// rest still receive the message. Returns the delivered count.
    pub async fn broadcast(&self, record: &PulseRecord) -> usize {
        let payload: Arc<str> = match serde_json::to_string(&HubMessage::Pulse {
            pulse: record.clone(),
        }) {
            Ok(json) => Arc::from(json),
            Err(e) => {
                log::error!("❌ Failed to encode pulse {}: {}", record.id, e);
                return 0;
            }
        };

        // Snapshot under the read lock, deliver outside it
        let recipients: Vec<(SubscriberId, Arc<dyn Subscriber>)> = {
            let subscribers = self.subscribers.read().await;
            subscribers
                .iter()
                .map(|(id, subscriber)| (*id, Arc::clone(subscriber)))
                .collect()
        };

        let mut delivered = 0;
        let mut stale = Vec::new();

        for (id, subscriber) in recipients {
            if subscriber.is_closed() {
                stale.push(id);
                continue;
            }
            if subscriber.send(Arc::clone(&payload)) {
                delivered += 1;
            } else {
                stale.push(id);
            }
        }

        if !stale.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            for id in stale {
                subscribers.remove(&id);
                log::debug!("🔌 Subscriber {} evicted after failed send", id);
            }
        }

        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DEFAULT_DEVICE_ID;
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex;

    struct MockSubscriber {
        closed: AtomicBool,
        send_ok: AtomicBool,
        inbox: Mutex<Vec<String>>,
    }

    impl MockSubscriber {
        fn new() -> Self {
            Self {
                closed: AtomicBool::new(false),
                send_ok: AtomicBool::new(true),
                inbox: Mutex::new(Vec::new()),
            }
        }

        fn received(&self) -> Vec<String> {
            self.inbox.lock().unwrap().clone()
        }

        fn set_closed(&self) {
            self.closed.store(true, Ordering::Relaxed);
        }

        fn set_send_fails(&self) {
            self.send_ok.store(false, Ordering::Relaxed);
        }
    }

    impl Subscriber for MockSubscriber {
        fn send(&self, payload: Arc<str>) -> bool {
            if !self.send_ok.load(Ordering::Relaxed) {
                return false;
            }
            self.inbox.lock().unwrap().push(payload.to_string());
            true
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::Relaxed)
        }
    }

    fn record(id: i64, server_time: i64) -> PulseRecord {
        PulseRecord {
            id,
            device_id: DEFAULT_DEVICE_ID.to_string(),
            pulse_number: Some(id),
            uptime_ms: None,
            server_time,
        }
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_subscribers() {
        let hub = PulseHub::new();
        let a = Arc::new(MockSubscriber::new());
        let b = Arc::new(MockSubscriber::new());
        hub.register(a.clone()).await;
        hub.register(b.clone()).await;

        let delivered = hub.broadcast(&record(1, 1_000)).await;

        assert_eq!(delivered, 2);
        assert_eq!(a.received().len(), 1);
        assert_eq!(b.received().len(), 1);

        // Payload is a tagged PULSE message carrying the full record
        let parsed: HubMessage = serde_json::from_str(&a.received()[0]).unwrap();
        match parsed {
            HubMessage::Pulse { pulse } => {
                assert_eq!(pulse.id, 1);
                assert_eq!(pulse.server_time, 1_000);
                assert_eq!(pulse.device_id, DEFAULT_DEVICE_ID);
            }
            other => panic!("expected PULSE, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_send_evicts_without_aborting_delivery() {
        let hub = PulseHub::new();
        let healthy = Arc::new(MockSubscriber::new());
        let failing = Arc::new(MockSubscriber::new());
        failing.set_send_fails();

        hub.register(failing.clone()).await;
        hub.register(healthy.clone()).await;

        let delivered = hub.broadcast(&record(1, 1_000)).await;
        assert_eq!(delivered, 1);
        assert_eq!(healthy.received().len(), 1);
        assert_eq!(hub.subscriber_count().await, 1);

        // Evicted subscriber gets nothing on later broadcasts
        hub.broadcast(&record(2, 2_000)).await;
        assert_eq!(failing.received().len(), 0);
        assert_eq!(healthy.received().len(), 2);
    }

    #[tokio::test]
    async fn test_closed_subscriber_is_evicted() {
        let hub = PulseHub::new();
        let closed = Arc::new(MockSubscriber::new());
        closed.set_closed();
        hub.register(closed.clone()).await;

        let delivered = hub.broadcast(&record(1, 1_000)).await;

        assert_eq!(delivered, 0);
        assert_eq!(closed.received().len(), 0);
        assert_eq!(hub.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_unregister_stops_delivery() {
        let hub = PulseHub::new();
        let subscriber = Arc::new(MockSubscriber::new());
        let id = hub.register(subscriber.clone()).await;

        hub.broadcast(&record(1, 1_000)).await;
        hub.unregister(id).await;
        hub.broadcast(&record(2, 2_000)).await;

        assert_eq!(subscriber.received().len(), 1);
    }

    #[tokio::test]
    async fn test_broadcasts_arrive_in_append_order() {
        let hub = PulseHub::new();
        let subscriber = Arc::new(MockSubscriber::new());
        hub.register(subscriber.clone()).await;

        for i in 1..=5 {
            hub.broadcast(&record(i, i * 1_000)).await;
        }

        let ids: Vec<i64> = subscriber
            .received()
            .iter()
            .map(|json| match serde_json::from_str(json).unwrap() {
                HubMessage::Pulse { pulse } => pulse.id,
                other => panic!("expected PULSE, got {:?}", other),
            })
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_broadcast_with_no_subscribers_is_harmless() {
        let hub = PulseHub::new();
        assert_eq!(hub.broadcast(&record(1, 1_000)).await, 0);
    }
}

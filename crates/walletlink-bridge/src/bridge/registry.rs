//! Notification registry: fan-out of push messages to subscribers.
//!
//! Listeners are keyed by an opaque `SubscriptionId`, so the same closure
//! registered twice yields two entries that are removed independently.
//! Delivery works on a snapshot of the set taken before any callback runs.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde_json::Value;
use tokio::sync::mpsc;

use walletlink_core::error::BridgeError;
use walletlink_core::protocol::frame::decode_payload;

use crate::obs::BridgeMetrics;

pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn get(self) -> u64 {
        self.0
    }
}

pub struct NotificationRegistry {
    listeners: Mutex<BTreeMap<SubscriptionId, Listener>>,
    next_id: AtomicU64,
    metrics: Arc<BridgeMetrics>,
}

impl NotificationRegistry {
    pub fn new(metrics: Arc<BridgeMetrics>) -> Self {
        Self {
            listeners: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            metrics,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<SubscriptionId, Listener>> {
        // Callbacks never run under this lock, so poisoning carries no torn state.
        self.listeners.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn subscribe<F>(self: &Arc<Self>, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let len = {
            let mut set = self.lock();
            set.insert(id, Arc::new(callback));
            set.len()
        };
        tracing::debug!(subscription = id.0, listeners = len, "listener subscribed");
        Subscription {
            id,
            registry: Arc::downgrade(self),
        }
    }

    /// Queue-backed subscription for async consumers.
    ///
    /// Delivery is lossy: when the queue is full the message is dropped for
    /// this subscriber only.
    pub fn subscribe_channel(self: &Arc<Self>, capacity: usize) -> (Subscription, mpsc::Receiver<Value>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let sub = self.subscribe(move |msg| {
            if let Err(e) = tx.try_send(msg.clone()) {
                tracing::debug!(error = %e, "push dropped for queued subscriber");
            }
        });
        (sub, rx)
    }

    fn remove(&self, id: SubscriptionId) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            tracing::debug!(subscription = id.0, "listener unsubscribed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Deliver `msg` to every current listener. Returns how many listeners
    /// completed without panicking.
    pub fn publish(&self, msg: &Value) -> usize {
        let snapshot: Vec<(SubscriptionId, Listener)> = self
            .lock()
            .iter()
            .map(|(id, l)| (*id, Arc::clone(l)))
            .collect();

        if snapshot.is_empty() {
            self.metrics.pushes.inc(&[("outcome", "dropped")]);
            tracing::debug!("push dropped: no listeners");
            return 0;
        }

        let mut delivered = 0;
        for (id, listener) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener(msg))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    let err = BridgeError::ListenerError(panic_message(panic.as_ref()));
                    self.metrics.listener_panics.inc(&[]);
                    tracing::warn!(subscription = id.0, error = %err, "listener panicked");
                }
            }
        }
        let outcome = if delivered == 0 { "failed" } else { "delivered" };
        self.metrics.pushes.inc(&[("outcome", outcome)]);
        delivered
    }

    /// Decode a raw push payload and deliver it.
    pub fn publish_text(&self, payload: &str) -> usize {
        match decode_payload(payload) {
            Ok(msg) => self.publish(&msg),
            Err(e) => {
                self.metrics.pushes.inc(&[("outcome", "malformed")]);
                tracing::warn!(error = %e, "push payload failed to decode; dropped");
                0
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Disposer returned by `subscribe`. Not tied to drop: the listener stays
/// registered until `unsubscribe` is called.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: SubscriptionId,
    registry: Weak<NotificationRegistry>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove exactly this listener. Returns false if it was already gone.
    pub fn unsubscribe(&self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.remove(self.id),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn registry() -> Arc<NotificationRegistry> {
        Arc::new(NotificationRegistry::new(Arc::new(BridgeMetrics::default())))
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&Value) + Send + Sync + 'static) {
        let n = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&n);
        (n, move |_: &Value| {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn same_callback_twice_is_two_entries() {
        let r = registry();
        let (n, cb) = counter();
        let cb = Arc::new(cb);
        let (a, b) = (Arc::clone(&cb), Arc::clone(&cb));
        let s1 = r.subscribe(move |v| a(v));
        let _s2 = r.subscribe(move |v| b(v));

        assert!(s1.unsubscribe());
        r.publish(&Value::Null);
        assert_eq!(n.load(Ordering::SeqCst), 1);
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn panicking_listener_does_not_stop_fanout() {
        let r = registry();
        let (n, cb) = counter();
        let _bad = r.subscribe(|_| panic!("listener blew up"));
        let _good = r.subscribe(cb);

        assert_eq!(r.publish(&serde_json::json!({"subject": "x"})), 1);
        assert_eq!(n.load(Ordering::SeqCst), 1);
        assert_eq!(r.metrics.listener_panics.get(&[]), 1);
        assert_eq!(r.metrics.pushes.get(&[("outcome", "delivered")]), 1);
    }

    #[test]
    fn push_with_only_panicking_listeners_is_not_delivered() {
        let r = registry();
        let _bad = r.subscribe(|_| panic!("listener blew up"));

        assert_eq!(r.publish(&Value::Null), 0);
        assert_eq!(r.metrics.pushes.get(&[("outcome", "delivered")]), 0);
        assert_eq!(r.metrics.pushes.get(&[("outcome", "failed")]), 1);
    }

    #[test]
    fn listener_added_during_delivery_misses_current_message() {
        let r = registry();
        let (late_n, late_cb) = counter();
        let late_cb = Arc::new(late_cb);
        let r2 = Arc::clone(&r);
        let _adder = r.subscribe(move |_| {
            let cb = Arc::clone(&late_cb);
            let _ = r2.subscribe(move |v| cb(v));
        });

        r.publish(&Value::Null);
        assert_eq!(late_n.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn malformed_push_is_counted_and_dropped() {
        let r = registry();
        let (n, cb) = counter();
        let _s = r.subscribe(cb);
        assert_eq!(r.publish_text("{nope"), 0);
        assert_eq!(n.load(Ordering::SeqCst), 0);
        assert_eq!(r.metrics.pushes.get(&[("outcome", "malformed")]), 1);
    }

    #[tokio::test]
    async fn channel_subscription_receives_pushes() {
        let r = registry();
        let (sub, mut rx) = r.subscribe_channel(4);
        r.publish_text("{\"n\":1}");
        assert_eq!(rx.recv().await, Some(serde_json::json!({"n": 1})));
        assert!(sub.unsubscribe());
        assert!(!sub.unsubscribe());
    }
}

//! Pending-call table for the call multiplexer.
//!
//! Every entry is inserted and removed with a single map operation, so no
//! read-modify-write of the table ever straddles an `.await`. Capacity is
//! reserved with an atomic counter before the insert, and a registration
//! that races `fail_all` backs itself out.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;

use walletlink_core::error::{BridgeError, Result};
use walletlink_core::protocol::frame::decode_payload;
use walletlink_core::CallId;

type Waiter = oneshot::Sender<Result<Value>>;

pub(crate) struct PendingTable {
    calls: DashMap<CallId, Waiter>,
    next_id: AtomicU64,
    in_flight: AtomicUsize,
    max_pending: usize,
    closed: AtomicBool,
}

impl PendingTable {
    pub(crate) fn new(max_pending: usize) -> Self {
        Self {
            calls: DashMap::new(),
            next_id: AtomicU64::new(1),
            in_flight: AtomicUsize::new(0),
            max_pending,
            closed: AtomicBool::new(false),
        }
    }

    /// Allocate the next id and park a waiter for it.
    pub(crate) fn register(&self) -> Result<(CallId, oneshot::Receiver<Result<Value>>)> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BridgeError::ChannelClosed);
        }
        let max = self.max_pending;
        let len = self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
            .map_err(|len| {
                tracing::warn!(
                    pending_len = len,
                    max_pending = max,
                    "too many pending calls; refusing new call"
                );
                BridgeError::TooManyPending { limit: max }
            })?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.calls.insert(id, tx);

        // `fail_all` may have swept the table between the check above and
        // the insert; nobody would ever answer this entry.
        if self.closed.load(Ordering::SeqCst) {
            let _ = self.take(id);
            return Err(BridgeError::ChannelClosed);
        }
        tracing::debug!(id, pending_len = len + 1, "registered pending call");
        Ok((id, rx))
    }

    /// Remove the entry for `id`, releasing its capacity slot.
    fn take(&self, id: CallId) -> Option<Waiter> {
        let (_, tx) = self.calls.remove(&id)?;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Some(tx)
    }

    /// Hand a response to its waiter. Returns false when no call is waiting
    /// on `id` (already answered, timed out, abandoned, or never issued).
    pub(crate) fn resolve(&self, id: CallId, payload: &str) -> bool {
        let Some(tx) = self.take(id) else {
            return false;
        };
        let res = decode_payload(payload);
        if let Err(e) = &res {
            tracing::warn!(id, error = %e, "response payload failed to decode");
        }
        // Receiver gone means the caller stopped waiting between remove and send.
        let _ = tx.send(res);
        tracing::debug!(id, "resolved pending call");
        true
    }

    /// Drop the entry for `id` if it is still there.
    pub(crate) fn abandon(&self, id: CallId) -> bool {
        self.take(id).is_some()
    }

    /// Mark the table closed and fail every waiter with `err`.
    pub(crate) fn fail_all(&self, err: BridgeError) -> usize {
        self.closed.store(true, Ordering::SeqCst);
        let ids: Vec<CallId> = self.calls.iter().map(|e| *e.key()).collect();
        let mut failed = 0;
        for id in ids {
            if let Some(tx) = self.take(id) {
                let _ = tx.send(Err(err.clone()));
                failed += 1;
            }
        }
        failed
    }

    pub(crate) fn len(&self) -> usize {
        self.calls.len()
    }

    pub(crate) fn ids(&self) -> Vec<CallId> {
        let mut ids: Vec<CallId> = self.calls.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }
}

/// Removes the pending entry when the call future finishes or is dropped.
pub(crate) struct PendingGuard<'a> {
    pub(crate) table: &'a PendingTable,
    pub(crate) id: CallId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.table.abandon(self.id) {
            tracing::debug!(id = self.id, "pending call abandoned");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_start_at_one_and_increase() {
        let t = PendingTable::new(8);
        let (a, _ra) = t.register().unwrap();
        let (b, _rb) = t.register().unwrap();
        assert_eq!((a, b), (1, 2));
        assert!(t.abandon(a));
        let (c, _rc) = t.register().unwrap();
        assert_eq!(c, 3);
        assert_eq!(t.ids(), vec![2, 3]);
    }

    #[test]
    fn resolve_removes_exactly_once() {
        let t = PendingTable::new(8);
        let (id, mut rx) = t.register().unwrap();
        assert!(t.resolve(id, "{\"ok\":true}"));
        assert!(!t.resolve(id, "{\"ok\":false}"));
        let v = rx.try_recv().unwrap().unwrap();
        assert_eq!(v, serde_json::json!({"ok": true}));
        assert_eq!(t.len(), 0);
    }

    #[test]
    fn limit_is_enforced() {
        let t = PendingTable::new(1);
        let _first = t.register().unwrap();
        let err = t.register().unwrap_err();
        assert!(matches!(err, BridgeError::TooManyPending { limit: 1 }));
    }

    #[test]
    fn fail_all_closes_table() {
        let t = PendingTable::new(4);
        let (_, mut rx) = t.register().unwrap();
        assert_eq!(t.fail_all(BridgeError::ChannelClosed), 1);
        assert!(matches!(rx.try_recv().unwrap(), Err(BridgeError::ChannelClosed)));
        assert!(matches!(t.register(), Err(BridgeError::ChannelClosed)));
    }

    #[test]
    fn concurrent_registers_respect_the_limit() {
        let t = PendingTable::new(8);
        let ok = std::thread::scope(|s| {
            let workers: Vec<_> = (0..32)
                .map(|_| s.spawn(|| t.register().map(|(id, _rx)| id).ok()))
                .collect();
            workers
                .into_iter()
                .filter_map(|w| w.join().unwrap())
                .count()
        });
        assert_eq!(ok, 8);
        assert_eq!(t.len(), 8);

        // Refused registrations burn no ids; slots come back as entries leave.
        assert_eq!(t.ids(), (1..=8).collect::<Vec<_>>());
        assert!(t.register().is_err());
        assert!(t.abandon(1));
        assert!(t.register().is_ok());
    }

    #[test]
    fn register_racing_fail_all_leaves_no_orphans() {
        for _ in 0..200 {
            let t = PendingTable::new(1024);
            let receivers = std::thread::scope(|s| {
                let callers: Vec<_> = (0..4)
                    .map(|_| {
                        s.spawn(|| {
                            (0..16)
                                .filter_map(|_| t.register().ok())
                                .map(|(_, rx)| rx)
                                .collect::<Vec<_>>()
                        })
                    })
                    .collect();
                s.spawn(|| t.fail_all(BridgeError::ChannelClosed));
                callers
                    .into_iter()
                    .flat_map(|c| c.join().unwrap())
                    .collect::<Vec<_>>()
            });

            assert_eq!(t.len(), 0);
            for mut rx in receivers {
                assert!(matches!(rx.try_recv().unwrap(), Err(BridgeError::ChannelClosed)));
            }
        }
    }
}

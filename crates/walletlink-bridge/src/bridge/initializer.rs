//! Channel initializer: lazy, exactly-once bring-up of the host channel.
//!
//! Fast path is a lock-free `OnceLock` read. Concurrent callers that miss it
//! queue on a single async mutex; whoever gets it first performs bring-up,
//! everyone after finds the channel ready (or the recorded failure).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::timeout;

use walletlink_core::error::{BridgeError, Result};

use crate::host::{HostBridge, HostEvent, Invoke};

/// Bridge lifecycle. `Ready` is terminal; `Failed` is terminal unless
/// re-probing is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Absent,
    Initializing,
    Ready,
    Failed,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Absent => "absent",
            Phase::Initializing => "initializing",
            Phase::Ready => "ready",
            Phase::Failed => "failed",
        }
    }
}

/// Handle to the ready channel. Cheap to clone.
#[derive(Clone)]
pub struct Channel {
    tx: mpsc::Sender<Invoke>,
    host: &'static str,
}

impl Channel {
    pub fn host(&self) -> &'static str {
        self.host
    }

    pub(crate) async fn send(&self, inv: Invoke) -> Result<()> {
        self.tx
            .send(inv)
            .await
            .map_err(|_| BridgeError::ChannelClosed)
    }
}

pub(crate) struct ChannelInitializer {
    host: Arc<dyn HostBridge>,
    open_timeout: Duration,
    event_buffer: usize,
    reprobe: bool,
    ready: OnceLock<Channel>,
    /// Held for the whole bring-up; stores the last failure reason.
    bring_up_lock: Mutex<Option<String>>,
    phase: watch::Sender<Phase>,
    constructions: AtomicU64,
}

impl ChannelInitializer {
    pub(crate) fn new(
        host: Arc<dyn HostBridge>,
        open_timeout: Duration,
        event_buffer: usize,
        reprobe: bool,
    ) -> Self {
        let (phase, _) = watch::channel(Phase::Absent);
        Self {
            host,
            open_timeout,
            event_buffer,
            reprobe,
            ready: OnceLock::new(),
            bring_up_lock: Mutex::new(None),
            phase,
            constructions: AtomicU64::new(0),
        }
    }

    pub(crate) fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    pub(crate) fn watch_phase(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    pub(crate) fn constructions(&self) -> u64 {
        self.constructions.load(Ordering::SeqCst)
    }

    /// Return the ready channel, bringing it up on first use.
    ///
    /// `attach` receives the inbound event stream exactly once, right after
    /// the channel opens and before any caller can send on it.
    pub(crate) async fn ensure<F>(&self, attach: F) -> Result<Channel>
    where
        F: FnOnce(mpsc::Receiver<HostEvent>),
    {
        if let Some(ch) = self.ready.get() {
            return Ok(ch.clone());
        }

        let mut failure = self.bring_up_lock.lock().await;
        if let Some(ch) = self.ready.get() {
            return Ok(ch.clone());
        }
        if let Some(reason) = failure.as_ref() {
            if !self.reprobe {
                return Err(BridgeError::ChannelUnavailable(reason.clone()));
            }
            tracing::info!(host = self.host.name(), "re-probing host after failure");
        }

        let previous = self.phase.send_replace(Phase::Initializing);
        let rollback = PhaseRollback {
            phase: &self.phase,
            previous,
        };
        let res = self.bring_up(attach).await;
        std::mem::forget(rollback);

        match res {
            Ok(ch) => {
                *failure = None;
                Ok(ch)
            }
            Err(e) => {
                let reason = match e {
                    BridgeError::ChannelUnavailable(reason) => reason,
                    other => other.to_string(),
                };
                tracing::warn!(host = self.host.name(), %reason, "channel bring-up failed");
                *failure = Some(reason.clone());
                self.phase.send_replace(Phase::Failed);
                Err(BridgeError::ChannelUnavailable(reason))
            }
        }
    }

    async fn bring_up<F>(&self, attach: F) -> Result<Channel>
    where
        F: FnOnce(mpsc::Receiver<HostEvent>),
    {
        let name = self.host.name();
        if !self.host.is_present() {
            return Err(BridgeError::ChannelUnavailable(format!(
                "host bridge '{name}' not present"
            )));
        }

        self.constructions.fetch_add(1, Ordering::SeqCst);
        let link = timeout(self.open_timeout, self.host.open(self.event_buffer))
            .await
            .map_err(|_| {
                BridgeError::ChannelUnavailable(format!(
                    "host bridge '{name}' did not open within {}ms",
                    self.open_timeout.as_millis()
                ))
            })??;

        attach(link.rx);
        let channel = Channel {
            tx: link.tx,
            host: name,
        };
        // Only reachable while holding `bring_up_lock` with `ready` unset.
        let _ = self.ready.set(channel.clone());
        self.phase.send_replace(Phase::Ready);
        tracing::info!(host = name, "channel ready");
        Ok(channel)
    }
}

/// Restores the prior phase if the caller driving bring-up is dropped
/// before it finishes.
struct PhaseRollback<'a> {
    phase: &'a watch::Sender<Phase>,
    previous: Phase,
}

impl Drop for PhaseRollback<'_> {
    fn drop(&mut self) {
        self.phase.send_replace(self.previous);
        tracing::debug!(phase = self.previous.as_str(), "bring-up cancelled");
    }
}

//! The bridge: one owned transport object per process.
//!
//! Control flow for a call: allocate id → register pending entry → ensure
//! the channel is ready → send `(id, query)` → wait (bounded) for the event
//! pump to resolve the entry. The event pump is spawned exactly once, by the
//! initializer, and also fans pushes out to the notification registry.

mod initializer;
mod multiplexer;
mod registry;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

use walletlink_core::error::{BridgeError, Result};
use walletlink_core::protocol::query::Query;
use walletlink_core::CallId;

use crate::config::BridgeSection;
use crate::host::{HostBridge, HostEvent, Invoke};
use crate::obs::BridgeMetrics;

pub use initializer::{Channel, Phase};
pub use registry::{Listener, NotificationRegistry, Subscription, SubscriptionId};

use initializer::ChannelInitializer;
use multiplexer::{PendingGuard, PendingTable};

pub struct Bridge {
    init: ChannelInitializer,
    pending: Arc<PendingTable>,
    registry: Arc<NotificationRegistry>,
    metrics: Arc<BridgeMetrics>,
    call_timeout: Duration,
}

impl Bridge {
    pub fn new(host: Arc<dyn HostBridge>, cfg: &BridgeSection) -> Self {
        let metrics = Arc::new(BridgeMetrics::default());
        Self {
            init: ChannelInitializer::new(
                host,
                cfg.open_timeout(),
                cfg.event_buffer,
                cfg.reprobe_on_failure,
            ),
            pending: Arc::new(PendingTable::new(cfg.max_pending)),
            registry: Arc::new(NotificationRegistry::new(Arc::clone(&metrics))),
            metrics,
            call_timeout: cfg.call_timeout(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.init.phase()
    }

    pub fn watch_phase(&self) -> watch::Receiver<Phase> {
        self.init.watch_phase()
    }

    /// Number of times a channel construction was attempted.
    pub fn channel_constructions(&self) -> u64 {
        self.init.constructions()
    }

    pub fn metrics(&self) -> &BridgeMetrics {
        &self.metrics
    }

    /// Ids of calls still waiting for a response, ascending.
    pub fn pending_ids(&self) -> Vec<CallId> {
        self.pending.ids()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn listener_count(&self) -> usize {
        self.registry.len()
    }

    /// Prometheus text for this bridge, including live gauges.
    pub fn render_metrics(&self) -> String {
        let ready = u64::from(self.phase() == Phase::Ready);
        self.metrics.render(&[
            ("walletlink_pending_calls", self.pending.len() as u64),
            ("walletlink_listeners", self.registry.len() as u64),
            ("walletlink_channel_ready", ready),
        ])
    }

    /// Bring the channel up if needed and return it.
    pub async fn ensure_channel(&self) -> Result<Channel> {
        self.init
            .ensure(|rx| {
                self.metrics.channel_constructions.inc(&[]);
                self.spawn_event_pump(rx);
            })
            .await
    }

    fn spawn_event_pump(&self, mut rx: mpsc::Receiver<HostEvent>) {
        let pending = Arc::clone(&self.pending);
        let registry = Arc::clone(&self.registry);
        let metrics = Arc::clone(&self.metrics);

        tokio::spawn(async move {
            while let Some(ev) = rx.recv().await {
                match ev {
                    HostEvent::Response { id, payload } => {
                        if !pending.resolve(id, &payload) {
                            metrics.late_responses.inc(&[]);
                            tracing::warn!(id, "response for unknown or finished call dropped");
                        }
                    }
                    HostEvent::Push { payload } => {
                        registry.publish_text(&payload);
                    }
                }
            }
            let failed = pending.fail_all(BridgeError::ChannelClosed);
            tracing::warn!(failed, "host channel closed");
        });
    }

    /// Send `query` and wait for its response.
    pub async fn call(&self, query: &str) -> Result<Value> {
        let started = Instant::now();
        let res = self.call_inner(query).await;

        let outcome = match &res {
            Ok(_) => "ok",
            Err(e) => e.code().as_str(),
        };
        self.metrics.calls.inc(&[("outcome", outcome)]);
        self.metrics.call_duration.observe(&[], started.elapsed());
        res
    }

    async fn call_inner(&self, query: &str) -> Result<Value> {
        let (id, rx) = self.pending.register()?;
        let _guard = PendingGuard {
            table: self.pending.as_ref(),
            id,
        };

        let channel = self.ensure_channel().await?;

        // One deadline covers both a full invoke queue and the response wait.
        let exchange = async {
            channel
                .send(Invoke {
                    id,
                    query: query.to_owned(),
                })
                .await?;
            tracing::debug!(id, host = channel.host(), "call sent");
            rx.await.map_err(|_| BridgeError::ChannelClosed)?
        };

        match timeout(self.call_timeout, exchange).await {
            Ok(res) => res,
            Err(_) => {
                let timeout_ms = self.call_timeout.as_millis() as u64;
                tracing::warn!(id, timeout_ms, "call timed out");
                Err(BridgeError::CallTimedOut { id, timeout_ms })
            }
        }
    }

    /// `call`, decoding the response into `T`.
    pub async fn call_as<T: DeserializeOwned>(&self, query: &str) -> Result<T> {
        let v = self.call(query).await?;
        serde_json::from_value(v).map_err(|e| BridgeError::MalformedResponse(e.to_string()))
    }

    pub async fn get(&self, endpoint: &str) -> Result<Value> {
        self.call(&Query::get(endpoint).to_text()?).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> Result<Value> {
        self.call(&Query::post(endpoint, body)?.to_text()?).await
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.registry.subscribe(callback)
    }

    pub fn subscribe_channel(&self, capacity: usize) -> (Subscription, mpsc::Receiver<Value>) {
        self.registry.subscribe_channel(capacity)
    }
}

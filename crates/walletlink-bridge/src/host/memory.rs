use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use walletlink_core::error::{BridgeError, Result};
use walletlink_core::CallId;

use super::{HostBridge, HostEvent, HostLink, Invoke};

/// In-process host: the backend is whoever holds the paired `MemoryBackend`.
pub struct MemoryHost {
    present: bool,
    open_delay: Duration,
    opens: AtomicUsize,
    invoke_tx: mpsc::Sender<Invoke>,
    event_rx: Mutex<Option<mpsc::Receiver<HostEvent>>>,
}

impl MemoryHost {
    pub fn new(buffer: usize) -> (Self, MemoryBackend) {
        let (invoke_tx, invoke_rx) = mpsc::channel(buffer.max(1));
        let (event_tx, event_rx) = mpsc::channel(buffer.max(1));
        let host = Self {
            present: true,
            open_delay: Duration::ZERO,
            opens: AtomicUsize::new(0),
            invoke_tx,
            event_rx: Mutex::new(Some(event_rx)),
        };
        let backend = MemoryBackend {
            invokes: invoke_rx,
            events: event_tx,
        };
        (host, backend)
    }

    /// A host that is not there, as when running outside the wallet shell.
    pub fn absent() -> Self {
        let (host, _backend) = Self::new(1);
        Self {
            present: false,
            ..host
        }
    }

    /// Delay `open` so concurrent bring-ups overlap.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// How many times `open` actually ran.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HostBridge for MemoryHost {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn is_present(&self) -> bool {
        self.present
    }

    async fn open(&self, _buffer: usize) -> Result<HostLink> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        let rx = self
            .event_rx
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
            .ok_or_else(|| BridgeError::Internal("memory host already opened".into()))?;
        Ok(HostLink {
            tx: self.invoke_tx.clone(),
            rx,
        })
    }
}

/// Backend side of a `MemoryHost`.
pub struct MemoryBackend {
    invokes: mpsc::Receiver<Invoke>,
    events: mpsc::Sender<HostEvent>,
}

impl MemoryBackend {
    /// Next call sent by the bridge, `None` once the bridge side is gone.
    pub async fn next_call(&mut self) -> Option<Invoke> {
        self.invokes.recv().await
    }

    pub async fn respond(&self, id: CallId, payload: impl Into<String>) -> Result<()> {
        self.send(HostEvent::Response {
            id,
            payload: payload.into(),
        })
        .await
    }

    pub async fn push(&self, payload: impl Into<String>) -> Result<()> {
        self.send(HostEvent::Push {
            payload: payload.into(),
        })
        .await
    }

    /// Event sender, for pushing from other tasks.
    pub fn events(&self) -> mpsc::Sender<HostEvent> {
        self.events.clone()
    }

    /// Answer every call with `handler(query)` until the bridge goes away.
    pub fn serve<F>(mut self, handler: F) -> JoinHandle<()>
    where
        F: Fn(&str) -> String + Send + 'static,
    {
        tokio::spawn(async move {
            while let Some(call) = self.invokes.recv().await {
                let payload = handler(&call.query);
                if self.respond(call.id, payload).await.is_err() {
                    break;
                }
            }
        })
    }

    async fn send(&self, ev: HostEvent) -> Result<()> {
        self.events
            .send(ev)
            .await
            .map_err(|_| BridgeError::ChannelClosed)
    }
}

//! Host bridges: the environment-provided entry point that can open the
//! duplex channel to the backend.
//!
//! A host only has to report whether it is present and, once, open a
//! `HostLink`: a sender for outbound invokes and a receiver for inbound
//! response/push events. Everything above this seam (correlation, fan-out,
//! timeouts) is host-agnostic.

mod memory;
mod tcp;

use async_trait::async_trait;
use tokio::sync::mpsc;

use walletlink_core::error::Result;
use walletlink_core::CallId;

pub use memory::{MemoryBackend, MemoryHost};
pub use tcp::{link_over_stream, TcpHost};

/// Outbound call, the only primitive the bridge sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoke {
    pub id: CallId,
    pub query: String,
}

/// Inbound event from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Response { id: CallId, payload: String },
    Push { payload: String },
}

/// An opened channel. Dropping `rx`'s sender side (host gone) ends the link.
pub struct HostLink {
    pub tx: mpsc::Sender<Invoke>,
    pub rx: mpsc::Receiver<HostEvent>,
}

#[async_trait]
pub trait HostBridge: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap, side-effect free probe.
    fn is_present(&self) -> bool;

    /// Open the channel. Called at most once per successful bring-up.
    async fn open(&self, buffer: usize) -> Result<HostLink>;
}

//! Shared application state for the bridge binary and ops endpoints.

use std::sync::Arc;

use crate::bridge::Bridge;
use crate::config::BridgeConfig;
use crate::host::{HostBridge, TcpHost};

#[derive(Clone)]
pub struct AppState {
    cfg: Arc<BridgeConfig>,
    bridge: Arc<Bridge>,
}

impl AppState {
    /// Build state backed by the TCP host described in `cfg.host`.
    pub fn new(cfg: BridgeConfig) -> Self {
        let host: Arc<dyn HostBridge> = Arc::new(TcpHost::from_config(&cfg.host));
        Self::with_host(cfg, host)
    }

    pub fn with_host(cfg: BridgeConfig, host: Arc<dyn HostBridge>) -> Self {
        if !host.is_present() {
            tracing::warn!(host = host.name(), "host bridge not present; calls will fail");
        }
        let bridge = Arc::new(Bridge::new(host, &cfg.bridge));
        Self {
            cfg: Arc::new(cfg),
            bridge,
        }
    }

    pub fn cfg(&self) -> &BridgeConfig {
        &self.cfg
    }

    pub fn bridge(&self) -> Arc<Bridge> {
        Arc::clone(&self.bridge)
    }
}

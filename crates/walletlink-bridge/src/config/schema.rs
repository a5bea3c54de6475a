use std::time::Duration;

use serde::Deserialize;
use walletlink_core::error::{BridgeError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    pub version: u32,

    #[serde(default)]
    pub bridge: BridgeSection,

    #[serde(default)]
    pub host: HostSection,

    #[serde(default)]
    pub ops: OpsSection,
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(BridgeError::UnsupportedVersion);
        }

        self.bridge.validate()?;
        self.host.validate()?;
        self.ops.validate()?;

        Ok(())
    }
}

/// Call multiplexer and channel bring-up tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeSection {
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,

    #[serde(default = "default_max_pending")]
    pub max_pending: usize,

    /// Probe the host again after a failed bring-up instead of failing fast forever.
    #[serde(default)]
    pub reprobe_on_failure: bool,

    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_call_timeout_ms(),
            open_timeout_ms: default_open_timeout_ms(),
            max_pending: default_max_pending(),
            reprobe_on_failure: false,
            event_buffer: default_event_buffer(),
        }
    }
}

impl BridgeSection {
    pub fn validate(&self) -> Result<()> {
        if !(100..=600_000).contains(&self.call_timeout_ms) {
            return Err(BridgeError::BadRequest(
                "bridge.call_timeout_ms must be between 100 and 600000".into(),
            ));
        }
        if !(100..=120_000).contains(&self.open_timeout_ms) {
            return Err(BridgeError::BadRequest(
                "bridge.open_timeout_ms must be between 100 and 120000".into(),
            ));
        }
        if self.max_pending == 0 {
            return Err(BridgeError::BadRequest("bridge.max_pending must be >= 1".into()));
        }
        if self.event_buffer == 0 {
            return Err(BridgeError::BadRequest("bridge.event_buffer must be >= 1".into()));
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }
}

fn default_call_timeout_ms() -> u64 {
    30_000
}
fn default_open_timeout_ms() -> u64 {
    5_000
}
fn default_max_pending() -> usize {
    4096
}
fn default_event_buffer() -> usize {
    256
}

/// Where the backend lives. No address means the host bridge is absent.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostSection {
    #[serde(default)]
    pub addr: Option<String>,

    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            addr: None,
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl HostSection {
    pub fn validate(&self) -> Result<()> {
        if self.max_frame_bytes < 64 {
            return Err(BridgeError::BadRequest(
                "host.max_frame_bytes must be >= 64".into(),
            ));
        }
        if let Some(addr) = &self.addr {
            if addr.trim().is_empty() {
                return Err(BridgeError::BadRequest("host.addr must not be empty".into()));
            }
        }
        Ok(())
    }
}

fn default_max_frame_bytes() -> usize {
    1024 * 1024
}

/// Optional HTTP ops endpoints (`/healthz`, `/readyz`, `/metrics`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpsSection {
    #[serde(default)]
    pub listen: Option<String>,
}

impl OpsSection {
    pub fn validate(&self) -> Result<()> {
        if let Some(listen) = &self.listen {
            listen.parse::<std::net::SocketAddr>().map_err(|_| {
                BridgeError::BadRequest("ops.listen must be a valid SocketAddr".into())
            })?;
        }
        Ok(())
    }
}

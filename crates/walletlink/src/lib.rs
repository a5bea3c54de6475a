//! Top-level facade crate for walletlink.
//!
//! Re-exports core types and the bridge library so users can depend on a single crate.

pub mod core {
    pub use walletlink_core::*;
}

pub mod bridge {
    pub use walletlink_bridge::*;
}

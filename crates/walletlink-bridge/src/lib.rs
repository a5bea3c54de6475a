//! walletlink bridge library entry.
//!
//! This crate wires the host bridges, the call multiplexer, the notification
//! registry, and the ops surface into one transport object. It is consumed
//! by the console binary (`main.rs`), by embedding UIs, and by integration
//! tests.

pub mod app_state;
pub mod bridge;
pub mod config;
pub mod host;
pub mod obs;
pub mod ops;
pub mod router;

pub use bridge::{Bridge, Phase, Subscription, SubscriptionId};

//! walletlink core: wire frames, query envelopes, and the shared error type.
//!
//! This crate defines the contracts shared by the bridge runtime and any
//! backend that speaks to it. It carries no runtime or transport
//! dependencies so a backend implementation can reuse the frame codec
//! without pulling in tokio.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths surface as `BridgeError`/`Result` so a malformed frame
//! from the backend never takes down the UI process.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{BridgeError, ErrorCode, Result};

/// Correlation identifier linking a call to its response.
pub type CallId = u64;

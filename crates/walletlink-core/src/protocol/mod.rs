//! Protocol modules.
//!
//! - `frame`: the line-delimited JSON frames exchanged with the backend
//!   (call / response / push) and payload decoding.
//! - `query`: the `{method, endpoint, body}` query envelope the wallet UI
//!   sends as call text.
//!
//! All decoders are panic-free: malformed input is reported as
//! `BridgeError` so a misbehaving backend cannot crash the caller.

pub mod frame;
pub mod query;

//! Lightweight in-process metrics (dependency-free).
//!
//! Counters and histograms are atomics rendered as Prometheus text by the
//! `/metrics` ops handler.

pub mod metrics;

pub use metrics::BridgeMetrics;

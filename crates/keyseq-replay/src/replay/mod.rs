//! Streaming-edit replay driven through a [`keyseq`] write coordinator.
//!
//! ## Structure
//!
//! - [`config`] - CLI arguments and validated runtime configuration.
//! - [`telemetry`] - `tracing` subscriber setup.
//! - [`store`] - file-backed document store the writes land in.
//! - [`producer`] - one simulated streaming producer per document.
//! - [`report`] - per-document and aggregate outcome accounting.

pub mod config;
pub mod producer;
pub mod report;
pub mod store;
pub mod telemetry;

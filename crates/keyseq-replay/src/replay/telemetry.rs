//! Log output for the replay binary.
//!
//! Events are printed in human-readable form through `tracing_subscriber::fmt`.
//! The filter defaults to `info` and can be overridden with `RUST_LOG`, e.g.
//! `RUST_LOG=keyseq=trace,keyseq_replay=debug` to also see every accepted,
//! skipped and evicted write inside the coordinator.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_telemetry() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true)
                .pretty(),
        )
        .try_init()?;
    Ok(())
}

#![doc = include_str!("../README.md")]

mod replay;

use anyhow::{Context, bail};
use clap::Parser;
use keyseq::{CoordinatorConfig, TokioWriteCoordinator, WriteCoordinator};
use replay::config::{CliArgs, ReplayConfig};
use replay::producer::run_replay;
use replay::report::ReplayReport;
use replay::store::DocumentStore;
use replay::telemetry::init_telemetry;
use std::sync::Arc;
use tokio::signal;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ReplayConfig::try_from(args)?;

    init_telemetry()?;
    log_startup_info(&config);

    let store = DocumentStore::open(&config.output_dir)
        .await
        .with_context(|| format!("failed to open store at {}", config.output_dir.display()))?;

    let mut coordinator_config = CoordinatorConfig::new();
    if let Some(limit) = config.max_pending {
        coordinator_config = coordinator_config.with_max_pending_per_key(limit);
    }
    let coordinator: TokioWriteCoordinator<String> =
        WriteCoordinator::with_tokio_config(coordinator_config);

    let report = tokio::select! {
        report = run_replay(coordinator.clone(), store, Arc::new(config)) => report?,
        () = shutdown_signal() => {
            tracing::warn!(
                active_keys = coordinator.active_keys(),
                "Replay interrupted before every document drained"
            );
            bail!("replay interrupted");
        }
    };

    log_report(&report)?;

    if !report.is_success() {
        bail!(
            "{} of {} documents failed verification",
            report.totals.unverified,
            report.totals.documents
        );
    }

    let leftover = coordinator.active_keys();
    if leftover > 0 {
        bail!("{leftover} keys still hold queue state after every document drained");
    }

    tracing::info!("Replay finished, every document verified");
    Ok(())
}

fn log_startup_info(config: &ReplayConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting replay with full config: {:#?}", config);
    } else {
        tracing::info!(
            "Starting replay of {} documents x {} edits into {}",
            config.documents,
            config.edits_per_document,
            config.output_dir.display()
        );
    }
}

fn log_report(report: &ReplayReport) -> anyhow::Result<()> {
    let totals = &report.totals;
    tracing::info!(
        documents = totals.documents,
        written = totals.written,
        failed = totals.failed,
        skipped = totals.skipped,
        deferred = totals.deferred,
        unverified = totals.unverified,
        "Replay complete"
    );
    let rendered = serde_json::to_string_pretty(report).context("failed to render report")?;
    tracing::debug!("Full report:\n{rendered}");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }
}

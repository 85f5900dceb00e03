//! `run` command implementation.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let app = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    info!(
        sinks = app.sinks.len(),
        exclude_filters = app.exclude_filters.len(),
        descriptions = app.descriptions.is_some(),
        filter_error_policy = ?app.filter_error_policy,
        "Configuration loaded"
    );

    let pipeline = Pipeline::new(PipelineConfig {
        app,
        events: args.events.clone(),
        objects: args.objects.clone(),
        integration_version: args.integration_version.clone(),
    });

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        for line in pipeline.check()? {
            println!("{line}");
        }
        return Ok(());
    }

    // Metric handles bind to the recorder present when they are created.
    if let Some(addr) = parse_metrics_addr(&args.metrics_addr)? {
        observability::init_metrics_only(addr)?;
    }

    let stop = CancellationToken::new();
    tokio::spawn(watch_shutdown(stop.clone()));

    info!("Starting routers...");
    let stats = pipeline.run(stop.clone()).await;
    // Lets the signal watcher task exit.
    stop.cancel();

    let stats = stats.context("Pipeline execution failed")?;
    info!(
        processed = stats.processed(),
        failed_deliveries = stats.failed_deliveries(),
        duration_secs = stats.duration.as_secs_f64(),
        "Pipeline completed"
    );
    stats.print_summary();

    info!("kube-events finished");
    Ok(())
}

/// `off` or empty disables the exporter
fn parse_metrics_addr(raw: &str) -> Result<Option<SocketAddr>> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("off") {
        return Ok(None);
    }
    raw.parse()
        .map(Some)
        .with_context(|| format!("Invalid metrics address: {raw}"))
}

/// Cancel `stop` on Ctrl+C or SIGTERM
async fn watch_shutdown(stop: CancellationToken) {
    tokio::select! {
        _ = shutdown_signal() => {
            warn!("Received shutdown signal, stopping routers...");
            stop.cancel();
        }
        _ = stop.cancelled() => {}
    }
}

/// Resolves on Ctrl+C or SIGTERM; a handler that cannot be installed never fires
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

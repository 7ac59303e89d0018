// blockchain-exporter/src/main.rs

//! Exporter binary.
//!
//! Reads its configuration from the environment, polls the node on a fixed
//! interval in a background task, and serves the resulting metrics on
//! `GET /metrics`.
//!
//! There is no graceful shutdown: a fatal node failure (strict policy), a
//! collector panic, a bind failure or a signal ends the process, and a
//! supervisor is expected to restart it.

use std::future::Future;
use std::io;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use tokio::task::JoinHandle;

use collector::{
    CollectorError, ExporterConfig, HttpNodeRpc, MetricsRegistry, bind_metrics_listener,
    serve_metrics, wallet_provider,
};

const DEFAULT_LOG_FILTER: &str = "blockchain_exporter=info,collector=info";

#[tokio::main]
async fn main() {
    // Basic tracing setup.
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string()),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cfg = ExporterConfig::from_env().context("failed to read configuration")?;

    // ---------------------------
    // Metrics
    // ---------------------------

    let metrics = Arc::new(
        MetricsRegistry::new(cfg.wallet.is_enabled())
            .context("failed to initialise metrics registry")?,
    );

    // ---------------------------
    // Node RPC client + wallet provider
    // ---------------------------

    let rpc = Arc::new(HttpNodeRpc::new(&cfg.rpc).context("failed to create node RPC client")?);
    let wallet = wallet_provider(&cfg, rpc.clone()).context("failed to create wallet provider")?;

    // ---------------------------
    // Collector loop
    // ---------------------------

    let poller = collector::DefaultCollector::new(
        rpc,
        wallet,
        metrics.clone(),
        cfg.chain.clone(),
        cfg.failure_policy,
    );
    let collector_task = tokio::spawn(poller.run(cfg.interval));

    // ---------------------------
    // Metrics server
    // ---------------------------

    let listener = bind_metrics_listener(&cfg.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.listen_addr))?;

    match listener.local_addr() {
        Ok(local) => tracing::info!("now listening on http://{local}/metrics"),
        Err(_) => tracing::info!("now listening on {}", cfg.listen_addr),
    }

    run_until_failure(collector_task, serve_metrics(listener, metrics)).await
}

/// Drives the metrics server while watching the collector task.
///
/// Returns as soon as either side stops: the server on an accept error,
/// the collector on a fatal failure, an invalid period or a panic.
async fn run_until_failure<S>(
    collector: JoinHandle<Result<(), CollectorError>>,
    server: S,
) -> anyhow::Result<()>
where
    S: Future<Output = io::Result<()>>,
{
    tokio::select! {
        res = server => res.context("metrics server error"),
        joined = collector => match joined {
            Ok(Ok(())) => Err(anyhow!("collector loop exited")),
            Ok(Err(e)) => Err(e).context("collector stopped"),
            Err(e) => Err(e).context("collector task panicked"),
        },
    }
}

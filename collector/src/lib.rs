//! Collector library crate.
//!
//! This crate provides the building blocks of the blockchain node
//! exporter:
//!
//! - environment configuration (`config`),
//! - JSON-RPC access to the node (`rpc`),
//! - wallet balance providers (`wallet`),
//! - Prometheus series and the `/metrics` HTTP exporter (`metrics`),
//! - and the periodic collector loop (`poller`).
//!
//! The binary composes these pieces: it reads an [`ExporterConfig`], spawns
//! a [`Collector`] and serves the shared [`MetricsRegistry`].

pub mod config;
pub mod metrics;
pub mod poller;
pub mod rpc;
pub mod wallet;

// Re-export top-level configuration types.
pub use config::{ConfigError, ExporterConfig, RpcConfig, WalletSelection, WalletSource};

// Re-export metrics registry and the HTTP exporter.
pub use metrics::{ExporterMetrics, MetricsRegistry, bind_metrics_listener, serve_metrics};

// Re-export the collector loop.
pub use poller::{Collector, CollectorError, FailurePolicy, TickReport, WalletOutcome};

// Re-export node access.
pub use rpc::{HttpNodeRpc, NodeRpc, RpcError};
pub use wallet::{WalletBalanceProvider, wallet_provider};

/// Collector polling the node over HTTP, as wired by the binary.
pub type DefaultCollector = Collector<HttpNodeRpc>;

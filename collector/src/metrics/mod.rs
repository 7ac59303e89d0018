//! Metrics and HTTP exposition for the exporter.
//!
//! This module defines the Prometheus series the collector loop writes and
//! a small HTTP server that serves `/metrics` in Prometheus text format.
//!
//! Typical usage:
//!
//! ```ignore
//! use std::sync::Arc;
//! use collector::metrics::{MetricsRegistry, bind_metrics_listener, serve_metrics};
//!
//! let registry = Arc::new(MetricsRegistry::new(true)?);
//! let listener = bind_metrics_listener(":9112").await?;
//! tokio::spawn(serve_metrics(listener, registry.clone()));
//!
//! registry.node.block_count.with_label_values(&["bitcoin-mainnet"]).set(840_000.0);
//! ```

pub mod prometheus;

pub use self::prometheus::{ExporterMetrics, MetricsRegistry, bind_metrics_listener, serve_metrics};

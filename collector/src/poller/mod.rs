//! The collector loop.
//!
//! On every tick the [`Collector`] queries the node for chain height,
//! mempool contents and peers, optionally asks a wallet provider for a
//! balance, and writes the results into the shared [`MetricsRegistry`].
//!
//! [`MetricsRegistry`]: crate::metrics::MetricsRegistry

pub mod collector;
pub mod error;
pub mod policy;

pub use collector::{Collector, NodeSnapshot, TickReport, WalletOutcome};
pub use error::CollectorError;
pub use policy::FailurePolicy;

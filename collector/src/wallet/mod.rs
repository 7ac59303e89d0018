//! Wallet balance providers.
//!
//! The collector only needs "a number or a failure" for the configured
//! wallet. How that number is fetched differs between deployments, so the
//! transport is hidden behind [`WalletBalanceProvider`]:
//!
//! - [`ClientWalletBalance`] uses the structured [`crate::rpc::NodeRpc::get_balance`] call,
//! - [`RawWalletBalance`] sends a hand-built `getbalance` request and accepts
//!   either a plain number or an object keyed by currency as the result.
//!
//! The provider is chosen once at startup by [`wallet_provider`].

pub mod native;
pub mod raw;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{ExporterConfig, WalletSelection, WalletSource};
use crate::rpc::{HttpNodeRpc, RpcResult};

pub use native::ClientWalletBalance;
pub use raw::RawWalletBalance;

/// Source of the configured wallet's balance.
#[async_trait]
pub trait WalletBalanceProvider: Send + Sync {
    /// Value of the `wallet` label; empty for the node's default wallet.
    fn label(&self) -> &str;

    /// Current balance, in whole coins.
    async fn balance(&self) -> RpcResult<f64>;
}

/// Builds the wallet provider selected by `cfg`, or `None` when wallet
/// polling is disabled.
pub fn wallet_provider(
    cfg: &ExporterConfig,
    rpc: Arc<HttpNodeRpc>,
) -> RpcResult<Option<Box<dyn WalletBalanceProvider>>> {
    if cfg.wallet == WalletSelection::Disabled {
        return Ok(None);
    }

    let provider: Box<dyn WalletBalanceProvider> = match cfg.wallet_source {
        WalletSource::Client => Box::new(ClientWalletBalance::new(rpc, cfg.wallet.clone())),
        WalletSource::Raw => Box::new(RawWalletBalance::new(&rpc, &cfg.wallet)?),
    };

    tracing::info!(
        wallet = provider.label(),
        source = ?cfg.wallet_source,
        "wallet balance polling enabled"
    );
    Ok(Some(provider))
}

//! Wallet balance through the structured node client.

use std::sync::Arc;

use async_trait::async_trait;

use super::WalletBalanceProvider;
use crate::config::WalletSelection;
use crate::rpc::{NodeRpc, RpcResult};

/// Reads the balance with [`NodeRpc::get_balance`].
pub struct ClientWalletBalance<R> {
    rpc: Arc<R>,
    wallet: WalletSelection,
}

impl<R> ClientWalletBalance<R> {
    pub fn new(rpc: Arc<R>, wallet: WalletSelection) -> Self {
        Self { rpc, wallet }
    }
}

#[async_trait]
impl<R> WalletBalanceProvider for ClientWalletBalance<R>
where
    R: NodeRpc,
{
    fn label(&self) -> &str {
        self.wallet.label()
    }

    async fn balance(&self) -> RpcResult<f64> {
        self.rpc.get_balance(self.wallet.endpoint_name()).await
    }
}

//! Wallet balance through a hand-built JSON-RPC request.
//!
//! Some node forks return `getbalance` as a plain number, others as an
//! object keyed by currency (`{"bitcoin": 1.5, ...}`). Both are accepted.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::{Map, Value};

use super::WalletBalanceProvider;
use crate::config::WalletSelection;
use crate::rpc::{Credentials, HttpNodeRpc, RpcError, RpcRequest, RpcResult, methods, request_rpc};

/// Currency key looked up when `getbalance` returns an object.
pub const BALANCE_CURRENCY_FIELD: &str = "bitcoin";

/// Reads the balance with a raw `getbalance ["*", 1]` call.
pub struct RawWalletBalance {
    client: Client,
    url: Url,
    credentials: Credentials,
    label: String,
    body: String,
}

impl RawWalletBalance {
    /// Targets `wallet` on the node `rpc` points at, reusing its HTTP client
    /// and credentials.
    pub fn new(rpc: &HttpNodeRpc, wallet: &WalletSelection) -> RpcResult<Self> {
        let request = RpcRequest::new(methods::GET_BALANCE, vec![Value::from("*"), Value::from(1)]);
        Ok(Self {
            client: rpc.client().clone(),
            url: rpc.endpoint(wallet.endpoint_name())?,
            credentials: rpc.credentials().clone(),
            label: wallet.label().to_string(),
            body: serde_json::to_string(&request)?,
        })
    }
}

#[async_trait]
impl WalletBalanceProvider for RawWalletBalance {
    fn label(&self) -> &str {
        &self.label
    }

    async fn balance(&self) -> RpcResult<f64> {
        let data = request_rpc(
            &self.client,
            self.url.clone(),
            &self.credentials,
            self.body.clone(),
        )
        .await?;
        balance_from_response(&data)
    }
}

/// Extracts the balance from a decoded `getbalance` response object.
pub fn balance_from_response(data: &Map<String, Value>) -> RpcResult<f64> {
    match data.get("result") {
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| RpcError::UnexpectedShape(format!("balance {n} is not a float"))),
        Some(Value::Object(by_currency)) => by_currency
            .get(BALANCE_CURRENCY_FIELD)
            .and_then(Value::as_f64)
            .ok_or_else(|| {
                RpcError::UnexpectedShape(format!(
                    "balance object has no numeric {BALANCE_CURRENCY_FIELD:?} field"
                ))
            }),
        Some(other) => Err(RpcError::UnexpectedShape(format!("balance result is {other}"))),
        None => Err(RpcError::UnexpectedShape("response has no result".into())),
    }
}

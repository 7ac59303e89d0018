//! HTTP-based JSON-RPC client for the node.
//!
//! This implementation of [`NodeRpc`] posts JSON-RPC 1.0 envelopes to the
//! node's RPC port over plain HTTP with Basic auth. Wallet-scoped calls go
//! to `/wallet/<name>`; everything else goes to `/`.
//!
//! Bitcoin Core answers RPC-level failures with HTTP 500 *and* a JSON body
//! carrying the `error` object, so the body is parsed before the status
//! code is considered.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{Credentials, NodeRpc, RpcError, RpcRequest, RpcResponse, RpcResult, methods};
use crate::config::RpcConfig;

/// `reqwest`-backed node client.
///
/// Cloning is cheap: the underlying connection pool is shared.
#[derive(Clone, Debug)]
pub struct HttpNodeRpc {
    base_url: Url,
    credentials: Credentials,
    client: Client,
}

impl HttpNodeRpc {
    /// Constructs a client for `cfg.host` (a bare `host:port`, no scheme).
    ///
    /// No timeout is set unless `cfg.timeout` is given, in which case it
    /// bounds every request.
    pub fn new(cfg: &RpcConfig) -> RpcResult<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = cfg.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| RpcError::Transport(format!("failed to build HTTP client: {e}")))?;

        Self::with_client(client, cfg)
    }

    /// Same as [`HttpNodeRpc::new`] but reuses an existing `reqwest` client.
    pub fn with_client(client: Client, cfg: &RpcConfig) -> RpcResult<Self> {
        let base_url = base_url(&cfg.host)?;
        Ok(Self {
            base_url,
            credentials: Credentials {
                user: cfg.user.clone(),
                password: cfg.password.clone(),
            },
            client,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Node URL for a call, scoped to `wallet` when given.
    pub fn endpoint(&self, wallet: Option<&str>) -> RpcResult<Url> {
        let mut url = self.base_url.clone();
        if let Some(name) = wallet {
            url.path_segments_mut()
                .map_err(|_| RpcError::Transport("RPC URL cannot take a wallet path".into()))?
                .pop_if_empty()
                .push("wallet")
                .push(name);
        }
        Ok(url)
    }

    /// Issues one JSON-RPC call and decodes its `result` as `T`.
    pub async fn call<T: DeserializeOwned>(
        &self,
        wallet: Option<&str>,
        method: &str,
        params: Vec<Value>,
    ) -> RpcResult<T> {
        let url = self.endpoint(wallet)?;
        let request = RpcRequest::new(method, params);

        let resp = self
            .client
            .post(url)
            .basic_auth(&self.credentials.user, Some(&self.credentials.password))
            .json(&request)
            .send()
            .await
            .map_err(|e| RpcError::Transport(format!("{method}: {e}")))?;

        let status = resp.status();
        let body = resp.bytes().await?;

        let envelope: RpcResponse<T> = match serde_json::from_slice(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => return Err(RpcError::Status(status.as_u16())),
            Err(e) => return Err(RpcError::Protocol(format!("{method}: {e}"))),
        };

        envelope.into_result()
    }
}

fn base_url(host: &str) -> RpcResult<Url> {
    let host = host.trim_end_matches('/');
    Url::parse(&format!("http://{host}/"))
        .map_err(|e| RpcError::Transport(format!("invalid RPC host {host:?}: {e}")))
}

#[async_trait]
impl NodeRpc for HttpNodeRpc {
    async fn get_block_count(&self) -> RpcResult<u64> {
        self.call(None, methods::GET_BLOCK_COUNT, Vec::new()).await
    }

    async fn get_raw_mempool(&self) -> RpcResult<Vec<String>> {
        self.call(None, methods::GET_RAW_MEMPOOL, Vec::new()).await
    }

    async fn get_peer_info(&self) -> RpcResult<Vec<Value>> {
        self.call(None, methods::GET_PEER_INFO, Vec::new()).await
    }

    async fn get_balance(&self, wallet: Option<&str>) -> RpcResult<f64> {
        self.call(wallet, methods::GET_BALANCE, vec![Value::from("*")]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rpc_config(host: &str) -> RpcConfig {
        RpcConfig {
            host: host.to_string(),
            user: "alice".to_string(),
            password: "secret".to_string(),
            timeout: None,
        }
    }

    #[test]
    fn endpoint_without_wallet_is_root() {
        let rpc = HttpNodeRpc::new(&rpc_config("127.0.0.1:8332")).expect("client");
        let url = rpc.endpoint(None).expect("url");
        assert_eq!(url.as_str(), "http://127.0.0.1:8332/");
    }

    #[test]
    fn endpoint_with_wallet_appends_wallet_path() {
        let rpc = HttpNodeRpc::new(&rpc_config("node:18332")).expect("client");
        let url = rpc.endpoint(Some("cold storage")).expect("url");
        assert_eq!(url.as_str(), "http://node:18332/wallet/cold%20storage");
    }

    #[test]
    fn invalid_host_is_rejected() {
        let err = HttpNodeRpc::new(&rpc_config("bad host:xx")).unwrap_err();
        assert!(matches!(err, RpcError::Transport(_)));
    }
}

//! JSON-RPC access to the upstream node.
//!
//! This module defines the [`NodeRpc`] trait the collector loop polls, a
//! `reqwest`-backed implementation ([`http::HttpNodeRpc`]), and a raw
//! request helper ([`raw::request_rpc`]) for calls the structured client
//! does not expose.
//!
//! All calls use the JSON-RPC 1.0 envelope understood by Bitcoin Core and
//! its forks:
//!
//! ```json
//! {"jsonrpc":"1.0","id":"bitcoin-prometheus-exporter","method":"getblockcount","params":[]}
//! ```

pub mod error;
pub mod http;
pub mod raw;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use error::{RpcError, RpcResult};
pub use http::HttpNodeRpc;
pub use raw::request_rpc;

/// JSON-RPC protocol version sent in every envelope.
pub const JSONRPC_VERSION: &str = "1.0";

/// Request id sent in every envelope. Responses are not matched against it.
pub const REQUEST_ID: &str = "bitcoin-prometheus-exporter";

/// Method names used by the collector.
pub mod methods {
    pub const GET_BLOCK_COUNT: &str = "getblockcount";
    pub const GET_RAW_MEMPOOL: &str = "getrawmempool";
    pub const GET_PEER_INFO: &str = "getpeerinfo";
    pub const GET_BALANCE: &str = "getbalance";
}

/// Queries the collector issues against the node on every tick.
///
/// Implementations must be shareable with the spawned collector task.
#[async_trait]
pub trait NodeRpc: Send + Sync {
    /// Height of the locally validated chain.
    async fn get_block_count(&self) -> RpcResult<u64>;

    /// Transaction ids currently in the mempool.
    async fn get_raw_mempool(&self) -> RpcResult<Vec<String>>;

    /// One entry per connected peer. Only the length is used.
    async fn get_peer_info(&self) -> RpcResult<Vec<Value>>;

    /// Balance of `wallet`, or of the node's default wallet when `None`.
    async fn get_balance(&self, wallet: Option<&str>) -> RpcResult<f64>;
}

/// HTTP Basic credentials for the node's RPC port.
#[derive(Clone, Debug, Default)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

/// Outgoing JSON-RPC envelope.
#[derive(Debug, Serialize)]
pub struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: &'static str,
    method: &'a str,
    params: Vec<Value>,
}

impl<'a> RpcRequest<'a> {
    pub fn new(method: &'a str, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: REQUEST_ID,
            method,
            params,
        }
    }
}

/// `error` member of a JSON-RPC response.
#[derive(Debug, Deserialize)]
pub struct RpcErrorObject {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

impl From<RpcErrorObject> for RpcError {
    fn from(err: RpcErrorObject) -> Self {
        RpcError::Node {
            code: err.code,
            message: err.message,
        }
    }
}

/// Incoming JSON-RPC envelope with a typed `result`.
#[derive(Debug, Deserialize)]
pub struct RpcResponse<T> {
    pub result: Option<T>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

impl<T> RpcResponse<T> {
    /// Converts the envelope into the call outcome. A non-null `error` wins
    /// over any `result`.
    pub fn into_result(self) -> RpcResult<T> {
        if let Some(err) = self.error {
            return Err(err.into());
        }
        self.result
            .ok_or_else(|| RpcError::Protocol("response carries neither result nor error".into()))
    }
}

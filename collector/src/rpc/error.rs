use thiserror::Error;

/// Errors returned while talking to the node's JSON-RPC interface.
#[derive(Error, Debug)]
pub enum RpcError {
    /// The request could not be built or sent (connection refused, timeout, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The node answered with a non-success status and no parseable JSON-RPC body.
    #[error("node returned HTTP status {0}")]
    Status(u16),

    /// The response body was not the JSON we expected.
    #[error("malformed response: {0}")]
    Protocol(String),

    /// The node returned a non-null `error` object.
    #[error("node error {code}: {message}")]
    Node { code: i64, message: String },

    /// The call succeeded but `result` had a shape we cannot turn into a number.
    #[error("unexpected result shape: {0}")]
    UnexpectedShape(String),
}

impl From<reqwest::Error> for RpcError {
    fn from(err: reqwest::Error) -> Self {
        RpcError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        RpcError::Protocol(err.to_string())
    }
}

pub type RpcResult<T> = Result<T, RpcError>;

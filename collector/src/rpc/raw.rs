//! Ad hoc JSON-RPC requests.
//!
//! Used for node features the structured client does not model. The caller
//! supplies a ready-made JSON body; the helper only sends it and checks the
//! `error` member of the reply.

use reqwest::{Client, Url, header};
use serde_json::{Map, Value};

use super::{Credentials, RpcError, RpcErrorObject, RpcResult};

/// POSTs `body` to `url` and returns the decoded response object.
///
/// Fails when the request cannot be sent, when the body is not a JSON
/// object, or when the object carries a non-null `error`. There is no retry
/// and no timeout beyond whatever `client` was built with.
pub async fn request_rpc(
    client: &Client,
    url: Url,
    credentials: &Credentials,
    body: String,
) -> RpcResult<Map<String, Value>> {
    let resp = client
        .post(url.clone())
        .basic_auth(&credentials.user, Some(&credentials.password))
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .send()
        .await
        .map_err(|e| RpcError::Transport(format!("POST {url} failed: {e}")))?;

    let bytes = resp.bytes().await?;
    let data: Map<String, Value> = serde_json::from_slice(&bytes)
        .map_err(|e| RpcError::Protocol(format!("failed to parse JSON response: {e}")))?;

    match data.get("error") {
        None | Some(Value::Null) => Ok(data),
        Some(err) => {
            tracing::debug!(body = %String::from_utf8_lossy(&bytes), "node rejected raw RPC call");
            Err(node_error(err))
        }
    }
}

fn node_error(err: &Value) -> RpcError {
    match serde_json::from_value::<RpcErrorObject>(err.clone()) {
        Ok(obj) => obj.into(),
        Err(_) => RpcError::Node {
            code: 0,
            message: err.to_string(),
        },
    }
}

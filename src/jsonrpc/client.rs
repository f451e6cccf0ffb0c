//! Minimal JSON-RPC client for talking to a running web service

use serde_json::{json, Value};
use thiserror::Error;

use crate::jsonrpc::envelope::{JsonRpcRequest, JsonRpcResponse};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("JSON-RPC response must contain 'result' or 'error': {0}")]
    MalformedResponse(String),
    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
}

/// Calls `method` on the resource at `url` and returns its `result`.
pub async fn jsonrpc_client_call(
    url: &str,
    method: &str,
    params: Value,
) -> Result<Value, ClientError> {
    let request = JsonRpcRequest::new(method, params, json!(1));
    let body = reqwest::Client::new()
        .post(url)
        .json(&request)
        .send()
        .await?
        .text()
        .await?;

    match serde_json::from_str::<JsonRpcResponse>(&body) {
        Ok(JsonRpcResponse::Result { result, .. }) => Ok(result),
        Ok(JsonRpcResponse::Error { error, .. }) => Err(ClientError::Rpc {
            code: error.code,
            message: error.message,
        }),
        Err(_) => Err(ClientError::MalformedResponse(body)),
    }
}

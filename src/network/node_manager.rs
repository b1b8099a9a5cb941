//! HTTP + JSON-RPC client shared by adapters and the market aggregator.

use reqwest::Client;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::core::errors::WalletError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RpcError {
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
}

impl RpcError {
    /// The node answered and explicitly refused the request.
    pub fn is_rejection(&self) -> bool {
        matches!(self, RpcError::Rpc { .. })
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RpcError::Timeout
        } else if err.is_decode() {
            RpcError::Malformed(err.to_string())
        } else {
            RpcError::Transport(err.to_string())
        }
    }
}

fn truncate(body: &str) -> String {
    const MAX: usize = 300;
    if body.len() <= MAX {
        body.to_string()
    } else {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    }
}

/// Every call carries the timeout fixed at construction.
#[derive(Debug)]
pub struct NodeManager {
    client: Client,
    next_id: AtomicU64,
}

impl NodeManager {
    pub fn new(timeout: Duration) -> Result<Self, WalletError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("nexus-wallet/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WalletError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, next_id: AtomicU64::new(1) })
    }

    /// GET returning JSON. Non-2xx is an error.
    pub async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Value, RpcError> {
        debug!(%url, "GET");
        let resp = self.client.get(url).query(query).send().await.map_err(RpcError::from_reqwest)?;
        let status = resp.status();
        let text = resp.text().await.map_err(RpcError::from_reqwest)?;
        if !status.is_success() {
            return Err(RpcError::Status { status: status.as_u16(), body: truncate(&text) });
        }
        serde_json::from_str(&text).map_err(|e| RpcError::Malformed(e.to_string()))
    }

    /// POST a JSON body. Providers report refusals as JSON on 4xx, so those
    /// bodies are returned; a 5xx is always an error.
    pub async fn post_json(&self, url: &str, body: &Value) -> Result<Value, RpcError> {
        debug!(%url, "POST");
        let resp = self.client.post(url).json(body).send().await.map_err(RpcError::from_reqwest)?;
        let status = resp.status();
        let text = resp.text().await.map_err(RpcError::from_reqwest)?;
        if status.is_server_error() {
            return Err(RpcError::Status { status: status.as_u16(), body: truncate(&text) });
        }
        match serde_json::from_str::<Value>(&text) {
            Ok(v) => Ok(v),
            Err(_) if !status.is_success() => {
                Err(RpcError::Status { status: status.as_u16(), body: truncate(&text) })
            }
            Err(e) => Err(RpcError::Malformed(e.to_string())),
        }
    }

    /// JSON-RPC 2.0 call. `error` is checked before `result` is trusted.
    pub async fn json_rpc(&self, url: &str, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let body = self.post_json(url, &payload).await?;
        if let Some(err) = body.get("error").filter(|e| !e.is_null()) {
            let code = err.get("code").and_then(Value::as_i64).unwrap_or(0);
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string());
            return Err(RpcError::Rpc { code, message });
        }
        match body.get("result") {
            Some(result) => Ok(result.clone()),
            None => Err(RpcError::Malformed(format!("no result in {}", truncate(&body.to_string())))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn json_rpc_checks_error_before_result() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(POST).path("/").body_contains("eth_blockNumber");
            then.status(200).json_body(json!({
                "jsonrpc": "2.0", "id": 1,
                "result": "0x10",
                "error": {"code": -32000, "message": "header not found"}
            }));
        });
        let node = NodeManager::new(Duration::from_secs(5)).unwrap();
        let err = node.json_rpc(&server.url("/"), "eth_blockNumber", json!([])).await.unwrap_err();
        assert_eq!(err, RpcError::Rpc { code: -32000, message: "header not found".into() });
        assert!(err.is_rejection());
        m.assert();
    }

    #[tokio::test]
    async fn json_rpc_returns_result() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/rpc");
            then.status(200).json_body(json!({"jsonrpc": "2.0", "id": 1, "result": "0x2a"}));
        });
        let node = NodeManager::new(Duration::from_secs(5)).unwrap();
        let v = node.json_rpc(&server.url("/rpc"), "eth_chainId", json!([])).await.unwrap();
        assert_eq!(v, json!("0x2a"));
    }

    #[tokio::test]
    async fn get_json_non_success_is_status_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/missing");
            then.status(404).body("not here");
        });
        let node = NodeManager::new(Duration::from_secs(5)).unwrap();
        let err = node.get_json(&server.url("/missing"), &[]).await.unwrap_err();
        assert!(matches!(err, RpcError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn post_json_keeps_error_bodies() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/txs/new");
            then.status(400).json_body(json!({"errors": [{"error": "bad input"}]}));
        });
        let node = NodeManager::new(Duration::from_secs(5)).unwrap();
        let v = node.post_json(&server.url("/txs/new"), &json!({})).await.unwrap();
        assert_eq!(v["errors"][0]["error"], "bad input");
    }

    #[tokio::test]
    async fn post_json_server_error_is_status_even_with_json_body() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/rpc");
            then.status(503).json_body(json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32005, "message": "overloaded"}}));
        });
        let node = NodeManager::new(Duration::from_secs(5)).unwrap();
        let err = node.json_rpc(&server.url("/rpc"), "eth_gasPrice", json!([])).await.unwrap_err();
        assert!(matches!(err, RpcError::Status { status: 503, .. }));
        assert!(!err.is_rejection());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "é".repeat(400);
        assert!(truncate(&s).ends_with("..."));
    }
}

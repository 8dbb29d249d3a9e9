//! JSON-RPC client for the engine's RPC endpoint.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::error::ErrorCode;

/// RPC client errors
#[derive(Error, Debug)]
pub enum RpcError {
    /// HTTP request error
    #[error("http request failed: {0}")]
    Http(reqwest::Error),

    /// JSON parsing error
    #[error("json parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    /// Error object returned by the engine
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Invalid response
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("rpc request timed out")]
    Timeout,

    /// No RPC endpoint configured, or the adapter is not running
    #[error("engine rpc is not available")]
    Unavailable,
}

impl From<reqwest::Error> for RpcError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RpcError::Timeout
        } else if err.is_decode() {
            RpcError::InvalidResponse(err.to_string())
        } else {
            RpcError::Http(err)
        }
    }
}

impl RpcError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RpcError::Timeout => ErrorCode::RpcTimeout,
            RpcError::Http(_) | RpcError::Rpc { .. } | RpcError::Unavailable => {
                ErrorCode::RpcCallFailed
            }
            RpcError::Json(_) | RpcError::InvalidResponse(_) => ErrorCode::RpcBadResponse,
            RpcError::Url(_) => ErrorCode::Config,
        }
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

/// Client for one engine RPC endpoint. Cheap to clone.
#[derive(Clone)]
pub struct CometRpcClient {
    http: HttpClient,
    url: Url,
    next_id: Arc<AtomicU64>,
}

impl CometRpcClient {
    pub fn new(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let url = Url::parse(&format!("http://{host}:{port}/"))?;
        let http = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Make a JSON-RPC call and return its `result`
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        debug!(method, id = request.id, "rpc call");

        let response = self
            .http
            .post(self.url.clone())
            .json(&request)
            .send()
            .await?;
        let body = response.bytes().await?;
        let rpc_response: RpcResponse = serde_json::from_slice(&body)?;

        if let Some(error) = rpc_response.error {
            let message = match error.data {
                Some(Value::String(data)) if !data.is_empty() => {
                    format!("{}: {}", error.message, data)
                }
                _ => error.message,
            };
            return Err(RpcError::Rpc {
                code: error.code,
                message,
            });
        }
        rpc_response
            .result
            .ok_or_else(|| RpcError::InvalidResponse("missing result field".to_string()))
    }

    /// Liveness check; the engine answers `{}` once its RPC is up
    pub async fn health(&self) -> Result<()> {
        self.call("health", json!({})).await.map(|_| ())
    }

    /// Submit a transaction to the mempool without waiting for CheckTx.
    ///
    /// Returns the full result and the transaction hash (uppercase hex).
    pub async fn broadcast_tx_async(&self, tx: &[u8]) -> Result<(Value, String)> {
        let result = self
            .call("broadcast_tx_async", json!({ "tx": STANDARD.encode(tx) }))
            .await?;
        let hash = result
            .get("hash")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::InvalidResponse("broadcast result has no hash".to_string()))?
            .to_uppercase();
        Ok((result, hash))
    }

    /// Look up a committed transaction by its hex hash
    pub async fn tx(&self, hash_hex: &str) -> Result<Value> {
        let hash = hex::decode(hash_hex)
            .map_err(|e| RpcError::InvalidResponse(format!("bad transaction hash: {e}")))?;
        self.call("tx", json!({ "hash": STANDARD.encode(hash), "prove": false }))
            .await
    }

    pub async fn block(&self, height: u64) -> Result<Value> {
        self.call("block", json!({ "height": height.to_string() }))
            .await
    }

    /// Latest header known to the node. `None` when the block store is empty.
    pub async fn header(&self) -> Result<Option<Value>> {
        let result = self.call("header", json!({})).await?;
        match result.get("header") {
            None | Some(Value::Null) => Ok(None),
            Some(header) => Ok(Some(header.clone())),
        }
    }

    /// Height of the latest stored block, 0 for an empty store
    pub async fn latest_height(&self) -> Result<u64> {
        match self.header().await? {
            None => Ok(0),
            Some(header) => parse_height(&header["height"]),
        }
    }
}

/// Heights come back as decimal strings; accept plain numbers too.
pub fn parse_height(value: &Value) -> Result<u64> {
    match value {
        Value::String(s) => s
            .parse()
            .map_err(|_| RpcError::InvalidResponse(format!("bad height {s:?}"))),
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| RpcError::InvalidResponse(format!("bad height {n}"))),
        other => Err(RpcError::InvalidResponse(format!("bad height {other}"))),
    }
}

/// Whether a `tx` result reports successful execution
pub fn tx_succeeded(result: &Value) -> bool {
    match &result["tx_result"]["code"] {
        Value::Null => result.get("tx_result").is_some(),
        code => code.as_u64() == Some(0),
    }
}

//! Starknet JSON-RPC implementation of [`ChainClient`].
//!
//! Only the handful of methods the session protocol needs are spoken:
//!
//! | Method | Used by |
//! |--------|---------|
//! | `starknet_chainId` | [`ChainContext::chain_id`](crate::chain::ChainContext::chain_id) |
//! | `starknet_getBlockWithTxHashes` | block timestamp |
//! | `starknet_call` | cache lookups, reads |
//! | `starknet_getNonce` | transaction details |
//! | `starknet_addInvokeTransaction` | submission |
//! | `starknet_getTransactionReceipt` | receipts |
//!
//! Contract and validation errors (codes 40, 41 and 55) are mapped to
//! [`ChainError::Reverted`] with the node's reason text.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use starksession::{Call, Felt, InvokeTransactionV3};
use tracing::debug;

use crate::chain::{ChainClient, Receipt};
use crate::config::DappConfig;
use crate::error::ChainError;

/// JSON-RPC error codes that carry a revert reason.
const REVERT_CODES: [i64; 3] = [40, 41, 55];

/// `TXN_HASH_NOT_FOUND`: the node has not seen the transaction yet.
const TXN_HASH_NOT_FOUND: i64 = 29;

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

impl RpcErrorBody {
    fn into_error(self) -> ChainError {
        if !REVERT_CODES.contains(&self.code) {
            return ChainError::Rpc { code: self.code, message: self.message };
        }
        let reason = match self.data {
            Some(Value::String(reason)) => reason,
            Some(Value::Object(data)) => data
                .get("revert_error")
                .or_else(|| data.get("execution_error"))
                .and_then(Value::as_str)
                .map(str::to_owned)
                .unwrap_or(self.message),
            _ => self.message,
        };
        ChainError::Reverted(reason)
    }
}

#[derive(Debug, Deserialize)]
struct BlockHeader {
    timestamp: u64,
}

#[derive(Debug, Deserialize)]
struct AddInvokeResult {
    transaction_hash: Felt,
}

/// Broadcast form of an invoke v3 transaction.
#[derive(Serialize)]
struct BroadcastedInvoke<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    version: &'static str,
    #[serde(flatten)]
    transaction: &'a InvokeTransactionV3,
}

/// JSON-RPC client over HTTP.
pub struct JsonRpcClient {
    client: Client,
    url: String,
    next_id: AtomicU64,
    receipt_timeout: Duration,
}

impl JsonRpcClient {
    /// Create a client for `url` with a per-request `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ChainError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url: url.into(), next_id: AtomicU64::new(1), receipt_timeout: timeout })
    }

    pub fn from_config(config: &DappConfig) -> Result<Self, ChainError> {
        Self::new(config.rpc_url.clone(), config.rpc_timeout())
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!("rpc: {method} #{id}");
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        let response = self.client.post(&self.url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChainError::Rpc { code: i64::from(status.as_u16()), message: format!("HTTP {status}") });
        }
        let response: RpcResponse<T> = response.json().await?;
        match (response.result, response.error) {
            (_, Some(error)) => Err(error.into_error()),
            (Some(result), None) => Ok(result),
            (None, None) => Err(ChainError::Malformed(format!("{method}: neither result nor error"))),
        }
    }
}

#[async_trait]
impl ChainClient for JsonRpcClient {
    async fn chain_id(&self) -> Result<Felt, ChainError> {
        self.request("starknet_chainId", json!([])).await
    }

    async fn block_timestamp(&self) -> Result<u64, ChainError> {
        let block: BlockHeader = self
            .request("starknet_getBlockWithTxHashes", json!({ "block_id": "latest" }))
            .await?;
        Ok(block.timestamp)
    }

    async fn call(&self, call: &Call) -> Result<Vec<Felt>, ChainError> {
        let params = json!({
            "request": {
                "contract_address": call.to,
                "entry_point_selector": call.selector,
                "calldata": call.calldata,
            },
            "block_id": "latest",
        });
        self.request("starknet_call", params).await
    }

    async fn nonce(&self, account: Felt) -> Result<Felt, ChainError> {
        self.request("starknet_getNonce", json!({ "block_id": "latest", "contract_address": account }))
            .await
    }

    async fn add_invoke_transaction(&self, transaction: &InvokeTransactionV3) -> Result<Felt, ChainError> {
        let broadcast = BroadcastedInvoke { kind: "INVOKE", version: "0x3", transaction };
        let result: AddInvokeResult = self
            .request("starknet_addInvokeTransaction", json!({ "invoke_transaction": broadcast }))
            .await?;
        Ok(result.transaction_hash)
    }

    /// Poll until the node knows the transaction or the request timeout
    /// elapses.
    async fn transaction_receipt(&self, transaction_hash: Felt) -> Result<Receipt, ChainError> {
        let deadline = tokio::time::Instant::now() + self.receipt_timeout;
        loop {
            let result = self
                .request("starknet_getTransactionReceipt", json!({ "transaction_hash": transaction_hash }))
                .await;
            match result {
                Err(ChainError::Rpc { code: TXN_HASH_NOT_FOUND, .. })
                    if tokio::time::Instant::now() < deadline =>
                {
                    tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
                }
                other => return other,
            }
        }
    }
}

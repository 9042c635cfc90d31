//! Starknet JSON-RPC front end for the [`Devnet`].
//!
//! Speaks the subset of methods `JsonRpcClient` uses plus two clock
//! controls:
//!
//! | Method | Devnet operation |
//! |--------|------------------|
//! | `starknet_chainId` | [`Devnet::chain_id`] |
//! | `starknet_getBlockWithTxHashes` | [`Devnet::now`] as the block timestamp |
//! | `starknet_call` | [`Devnet::call`] |
//! | `starknet_getNonce` | [`Devnet::nonce`] |
//! | `starknet_addInvokeTransaction` | [`Devnet::add_invoke_transaction`] |
//! | `starknet_getTransactionReceipt` | [`Devnet::receipt`] |
//! | `devnet_setTime` | [`Devnet::set_time`] |
//! | `devnet_increaseTime` | [`Devnet::increase_time`] |

use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use starksession::{Call, Felt, InvokeTransactionV3};

use crate::devnet::{Devnet, DevnetError};

/// JSON-RPC error with its Starknet error code.
#[derive(Debug)]
struct RpcFailure {
    code: i64,
    message: String,
    data: Option<Value>,
}

impl RpcFailure {
    fn invalid_params(message: impl Into<String>) -> Self {
        Self { code: -32602, message: message.into(), data: None }
    }

    fn into_body(self, id: Value) -> Value {
        let mut error = json!({ "code": self.code, "message": self.message });
        if let Some(data) = self.data {
            error["data"] = data;
        }
        json!({ "jsonrpc": "2.0", "id": id, "error": error })
    }
}

impl From<DevnetError> for RpcFailure {
    fn from(e: DevnetError) -> Self {
        let message = e.to_string();
        match e {
            DevnetError::ContractNotFound(_) => Self { code: 20, message: "Contract not found".into(), data: None },
            DevnetError::TransactionNotFound(_) => {
                Self { code: 29, message: "Transaction hash not found".into(), data: None }
            }
            DevnetError::Contract(revert) => Self {
                code: 40,
                message: "Contract error".into(),
                data: Some(json!({ "revert_error": revert.0 })),
            },
            DevnetError::InvalidNonce { .. } => Self { code: 52, message, data: None },
            DevnetError::Validation(revert) => Self {
                code: 55,
                message: "Account validation failed".into(),
                data: Some(Value::String(revert.0)),
            },
        }
    }
}

#[derive(Deserialize)]
struct RpcRequest {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Deserialize)]
struct FunctionCall {
    contract_address: Felt,
    entry_point_selector: Felt,
    #[serde(default)]
    calldata: Vec<Felt>,
}

#[derive(Deserialize)]
struct CallParams {
    request: FunctionCall,
}

#[derive(Deserialize)]
struct NonceParams {
    contract_address: Felt,
}

#[derive(Deserialize)]
struct InvokeParams {
    invoke_transaction: InvokeTransactionV3,
}

#[derive(Deserialize)]
struct ReceiptParams {
    transaction_hash: Felt,
}

#[derive(Deserialize)]
struct TimeParams {
    time: u64,
}

fn params<T: DeserializeOwned>(value: Value) -> Result<T, RpcFailure> {
    serde_json::from_value(value).map_err(|e| RpcFailure::invalid_params(e.to_string()))
}

fn dispatch(devnet: &Devnet, method: &str, raw: Value) -> Result<Value, RpcFailure> {
    match method {
        "starknet_chainId" => Ok(json!(devnet.chain_id())),
        "starknet_getBlockWithTxHashes" => Ok(json!({ "timestamp": devnet.now() })),
        "starknet_call" => {
            let CallParams { request } = params(raw)?;
            let call = Call {
                to: request.contract_address,
                selector: request.entry_point_selector,
                calldata: request.calldata,
            };
            Ok(json!(devnet.call(&call)?))
        }
        "starknet_getNonce" => {
            let NonceParams { contract_address } = params(raw)?;
            Ok(json!(devnet.nonce(contract_address)?))
        }
        "starknet_addInvokeTransaction" => {
            let InvokeParams { invoke_transaction } = params(raw)?;
            let hash = devnet.add_invoke_transaction(&invoke_transaction)?;
            Ok(json!({ "transaction_hash": hash }))
        }
        "starknet_getTransactionReceipt" => {
            let ReceiptParams { transaction_hash } = params(raw)?;
            Ok(json!(devnet.receipt(transaction_hash)?))
        }
        "devnet_setTime" => {
            let TimeParams { time } = params(raw)?;
            devnet.set_time(time);
            Ok(json!({ "block_timestamp": time }))
        }
        "devnet_increaseTime" => {
            let TimeParams { time } = params(raw)?;
            devnet.increase_time(time);
            Ok(json!({ "block_timestamp": devnet.now() }))
        }
        other => Err(RpcFailure { code: -32601, message: format!("method not found: {other}"), data: None }),
    }
}

async fn handle(State(devnet): State<Arc<Devnet>>, Json(request): Json<RpcRequest>) -> Json<Value> {
    let body = match dispatch(&devnet, &request.method, request.params) {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": request.id, "result": result }),
        Err(failure) => failure.into_body(request.id),
    };
    Json(body)
}

/// Router serving JSON-RPC at `/` and `/rpc`.
pub fn build_router(devnet: Arc<Devnet>) -> Router {
    Router::new()
        .route("/", post(handle))
        .route("/rpc", post(handle))
        .with_state(devnet)
}

//! Chain access: the [`ChainClient`] collaborator and the [`ChainContext`]
//! handle every service receives.
//!
//! # Implementations
//!
//! | Type | When to use |
//! |------|-------------|
//! | [`JsonRpcClient`] | Any Starknet JSON-RPC node |
//! | in-process devnet | Conformance suite (`starksession-conformance`) |
//!
//! [`JsonRpcClient`]: crate::rpc::JsonRpcClient

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use starksession::session::cache_lookup_call;
use starksession::{Call, Felt, InvokeTransactionV3};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::ChainError;

// ---------------------------------------------------------------------------
// Receipts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Succeeded,
    Reverted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub transaction_hash: Felt,
    pub execution_status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revert_reason: Option<String>,
}

// ---------------------------------------------------------------------------
// ChainClient
// ---------------------------------------------------------------------------

/// The network operations the session protocol needs, and nothing more.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn chain_id(&self) -> Result<Felt, ChainError>;

    /// Timestamp of the latest block.
    async fn block_timestamp(&self) -> Result<u64, ChainError>;

    /// Read-only call against the latest block.
    async fn call(&self, call: &Call) -> Result<Vec<Felt>, ChainError>;

    async fn nonce(&self, account: Felt) -> Result<Felt, ChainError>;

    /// Submit a signed transaction and return its hash.
    async fn add_invoke_transaction(&self, transaction: &InvokeTransactionV3) -> Result<Felt, ChainError>;

    async fn transaction_receipt(&self, transaction_hash: Felt) -> Result<Receipt, ChainError>;
}

// ---------------------------------------------------------------------------
// ChainContext
// ---------------------------------------------------------------------------

/// Read-only connection handle, created once and cloned into every service.
///
/// The chain id is fetched on first use and reused for the life of the
/// handle and all its clones.
#[derive(Clone)]
pub struct ChainContext {
    client: Arc<dyn ChainClient>,
    chain_id: Arc<OnceCell<Felt>>,
}

impl ChainContext {
    pub fn new(client: Arc<dyn ChainClient>) -> Self {
        Self { client, chain_id: Arc::new(OnceCell::new()) }
    }

    pub fn client(&self) -> &dyn ChainClient {
        self.client.as_ref()
    }

    pub async fn chain_id(&self) -> Result<Felt, ChainError> {
        self.chain_id
            .get_or_try_init(|| async {
                let chain_id = self.client.chain_id().await?;
                debug!("chain: id {}", chain_id.to_hex_string());
                Ok::<_, ChainError>(chain_id)
            })
            .await
            .copied()
    }

    pub async fn now(&self) -> Result<u64, ChainError> {
        self.client.block_timestamp().await
    }

    /// Whether `account` holds a cached approval of `session_hash` under
    /// `owner_guid`.
    pub async fn is_session_cached(
        &self,
        account: Felt,
        session_hash: Felt,
        owner_guid: Felt,
    ) -> Result<bool, ChainError> {
        let result = self
            .client
            .call(&cache_lookup_call(account, session_hash, owner_guid))
            .await?;
        let cached = result
            .first()
            .map(|flag| *flag != Felt::ZERO)
            .ok_or_else(|| ChainError::Malformed("empty cache lookup result".into()))?;
        debug!(
            "chain: session {} cached={cached}",
            session_hash.to_hex_string()
        );
        Ok(cached)
    }

    /// Submit `transaction` and wait for its receipt. A reverted receipt is
    /// returned as [`ChainError::Reverted`] with the reason untouched.
    pub async fn submit(&self, transaction: &InvokeTransactionV3) -> Result<Receipt, ChainError> {
        let hash = self.client.add_invoke_transaction(transaction).await?;
        info!("chain: submitted {}", hash.to_hex_string());
        let receipt = self.client.transaction_receipt(hash).await?;
        match receipt.execution_status {
            ExecutionStatus::Succeeded => Ok(receipt),
            ExecutionStatus::Reverted => {
                let reason = receipt.revert_reason.unwrap_or_default();
                warn!("chain: {} reverted: {reason}", hash.to_hex_string());
                Err(ChainError::Reverted(reason))
            }
        }
    }
}

impl std::fmt::Debug for ChainContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainContext")
            .field("chain_id", &self.chain_id.get())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Accounts that build, sign and submit invoke v3 transactions.
//!
//! How a transaction gets signed is pluggable through [`TransactionSigner`]:
//! the owner's multi-signer signs the transaction hash directly, while the
//! dapp's [`SessionSigner`](crate::dapp::SessionSigner) produces a session
//! token.

use std::sync::Arc;

use async_trait::async_trait;
use starksession::session::revoke_session_call;
use starksession::transaction::ResourceBounds;
use starksession::{ArgentSigner, Call, Felt, InvokeDetailsV3, RawSigner, ResourceBoundsMapping};
use tracing::info;

use crate::chain::{ChainContext, Receipt};
use crate::error::ServiceError;

/// Produces the signature of an invoke transaction.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    async fn sign_transaction(&self, calls: &[Call], details: &InvokeDetailsV3) -> Result<Vec<Felt>, ServiceError>;
}

#[async_trait]
impl TransactionSigner for ArgentSigner {
    async fn sign_transaction(&self, calls: &[Call], details: &InvokeDetailsV3) -> Result<Vec<Felt>, ServiceError> {
        Ok(self.sign_raw(&details.transaction_hash(calls))?)
    }
}

/// Signs the transaction hash with any [`RawSigner`], including closures.
pub struct HashSigner<S>(pub S);

#[async_trait]
impl<S: RawSigner> TransactionSigner for HashSigner<S> {
    async fn sign_transaction(&self, calls: &[Call], details: &InvokeDetailsV3) -> Result<Vec<Felt>, ServiceError> {
        Ok(self.0.sign_raw(&details.transaction_hash(calls))?)
    }
}

/// Fixed bounds used until fee estimation is wired in.
pub fn default_resource_bounds() -> ResourceBoundsMapping {
    ResourceBoundsMapping {
        l1_gas: ResourceBounds { max_amount: 10_000, max_price_per_unit: 100_000_000_000_000 },
        l2_gas: ResourceBounds { max_amount: 100_000_000, max_price_per_unit: 10_000_000_000 },
        l1_data_gas: Some(ResourceBounds { max_amount: 10_000, max_price_per_unit: 1_000_000_000 }),
    }
}

#[derive(Clone)]
pub struct Account {
    address: Felt,
    chain: ChainContext,
    signer: Arc<dyn TransactionSigner>,
    resource_bounds: ResourceBoundsMapping,
}

impl Account {
    pub fn new(address: Felt, chain: ChainContext, signer: Arc<dyn TransactionSigner>) -> Self {
        Self { address, chain, signer, resource_bounds: default_resource_bounds() }
    }

    pub fn address(&self) -> Felt {
        self.address
    }

    pub fn chain(&self) -> &ChainContext {
        &self.chain
    }

    /// The same account, signing through `signer`.
    pub fn with_signer(&self, signer: Arc<dyn TransactionSigner>) -> Self {
        Self { signer, ..self.clone() }
    }

    pub fn with_resource_bounds(mut self, resource_bounds: ResourceBoundsMapping) -> Self {
        self.resource_bounds = resource_bounds;
        self
    }

    /// Everything a signer needs besides the calls: sender, chain id, the
    /// account's current nonce and fee bounds.
    pub async fn signer_details(&self) -> Result<InvokeDetailsV3, ServiceError> {
        let chain_id = self.chain.chain_id().await?;
        let nonce = self.chain.client().nonce(self.address).await?;
        Ok(InvokeDetailsV3::new(self.address, chain_id, nonce, self.resource_bounds))
    }

    /// Sign and submit `calls` as one multicall, waiting for the receipt.
    pub async fn execute(&self, calls: Vec<Call>) -> Result<Receipt, ServiceError> {
        let details = self.signer_details().await?;
        let signature = self.signer.sign_transaction(&calls, &details).await?;
        info!(
            "account: {} executing {} calls at nonce {}",
            self.address.to_hex_string(),
            calls.len(),
            details.nonce
        );
        let transaction = details.into_transaction(&calls, signature);
        Ok(self.chain.submit(&transaction).await?)
    }

    /// Read-only call.
    pub async fn call(&self, call: &Call) -> Result<Vec<Felt>, ServiceError> {
        Ok(self.chain.client().call(call).await?)
    }

    /// Revoke a session. The account calls itself, so only its own signer
    /// can do this.
    pub async fn revoke_session(&self, session_hash: Felt) -> Result<Receipt, ServiceError> {
        self.execute(vec![revoke_session_call(self.address, session_hash)]).await
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use starksession::signer::parse_signatures;
    use starksession::{AssertionFormat, KeyPair, Normalization, SignerError, SignerType};

    use super::*;
    use crate::chain::tests::ScriptedChain;

    fn account(chain: Arc<ScriptedChain>, signer: Arc<dyn TransactionSigner>) -> Account {
        Account::new(Felt::from(0xacc0u64), ChainContext::new(chain), signer)
    }

    #[tokio::test]
    async fn owner_signature_covers_transaction_hash() {
        let chain = Arc::new(ScriptedChain::default());
        let signer = ArgentSigner::new(KeyPair::random(SignerType::Starknet), None);
        let account = account(chain.clone(), Arc::new(signer));
        let calls = vec![Call::new(Felt::from(9u64), "set_number", vec![Felt::ONE])];

        account.execute(calls.clone()).await.unwrap();

        let submitted = chain.submitted.lock().unwrap()[0].clone();
        let hash = submitted.transaction_hash(Felt::from_bytes_be_slice(b"SN_SEPOLIA"));
        let signatures = parse_signatures(&submitted.signature, AssertionFormat::JsonClientData).unwrap();
        assert_eq!(submitted.calls().unwrap(), calls);
        assert!(signatures[0].verify(&hash, Normalization::Canonical));
    }

    #[tokio::test]
    async fn closure_signer_returns_fixed_signature() {
        let chain = Arc::new(ScriptedChain::default());
        let fixed = |_: &Felt| -> Result<Vec<Felt>, SignerError> { Ok(vec![Felt::from(42u64)]) };
        let account = account(chain.clone(), Arc::new(HashSigner(fixed)));
        account.execute(vec![]).await.unwrap();
        assert_eq!(chain.submitted.lock().unwrap()[0].signature, vec![Felt::from(42u64)]);
    }

    #[tokio::test]
    async fn revert_reason_is_passed_through() {
        let chain = Arc::new(ScriptedChain::default());
        *chain.revert.lock().unwrap() = Some("session/revoked".into());
        let signer = ArgentSigner::new(KeyPair::random(SignerType::Starknet), None);
        let account = account(chain, Arc::new(signer));
        let err = account.revoke_session(Felt::ONE).await.unwrap_err();
        assert_eq!(err.revert_reason(), Some("session/revoked"));
    }
}

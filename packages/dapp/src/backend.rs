//! Backend / guardian co-signer.
//!
//! The backend holds the account's guardian key. Before co-signing it checks
//! every call against the session's allow-list; a call outside the list is
//! refused before any network round-trip.

use starksession::token::binding_hash;
use starksession::{
    BindingSource, Call, Felt, Session, Signer, SignerSignature, StarknetKeyPair,
};
use tracing::{debug, warn};

use crate::chain::ChainContext;
use crate::error::ServiceError;

pub struct BackendService {
    guardian: StarknetKeyPair,
    chain: ChainContext,
}

impl BackendService {
    pub fn new(guardian: StarknetKeyPair, chain: ChainContext) -> Self {
        Self { guardian, chain }
    }

    /// Descriptor of the guardian key, as registered on the account.
    pub fn guardian_signer(&self) -> Signer {
        self.guardian.signer()
    }

    pub fn guardian_guid(&self) -> Felt {
        self.guardian.guid()
    }

    /// Fail on the first call `session` does not cover.
    pub fn check_policy(&self, calls: &[Call], session: &Session) -> Result<(), ServiceError> {
        match calls.iter().find(|call| !session.covers(call)) {
            Some(call) => {
                warn!(
                    "backend: refusing {}::{}",
                    call.to.to_hex_string(),
                    call.selector.to_hex_string()
                );
                Err(ServiceError::PolicyViolation {
                    contract: call.to.to_hex_string(),
                    selector: call.selector.to_hex_string(),
                })
            }
            None => Ok(()),
        }
    }

    /// Co-sign `calls` executed by `account` under `session`.
    ///
    /// The signed value is `binding_hash(source, session_hash, cache_field)`,
    /// where the source hash comes from `source`.
    pub async fn co_sign(
        &self,
        account: Felt,
        calls: &[Call],
        source: &BindingSource,
        session: &Session,
        cache_field: Felt,
    ) -> Result<SignerSignature, ServiceError> {
        self.check_policy(calls, session)?;

        let chain_id = self.chain.chain_id().await?;
        let source_hash = source.source_hash(calls, chain_id, account);
        let session_hash = session.message_hash(chain_id, account);
        let binding = binding_hash(source_hash, session_hash, cache_field);
        debug!(
            "backend: co-signing {} calls for {}",
            calls.len(),
            account.to_hex_string()
        );

        let signature = self.guardian.sign(&binding)?;
        Ok(SignerSignature::Starknet { pubkey: self.guardian.public_key(), signature })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use starksession::session::{AllowedMethod, DEFAULT_METADATA};
    use starksession::{InvokeDetailsV3, Normalization, OutsideExecution, Revision};

    use super::*;
    use crate::chain::tests::ScriptedChain;

    const NOW: u64 = 1_700_000_000;

    fn dapp() -> Felt {
        Felt::from(0xda99u64)
    }

    fn session() -> Session {
        Session::new(
            vec![AllowedMethod::new(dapp(), "set_number")],
            NOW + 150,
            Felt::from(3u64),
            DEFAULT_METADATA,
            NOW,
        )
        .unwrap()
    }

    fn backend(chain: Arc<ScriptedChain>) -> BackendService {
        BackendService::new(StarknetKeyPair::random(), ChainContext::new(chain))
    }

    #[tokio::test]
    async fn uncovered_call_fails_without_network() {
        let chain = Arc::new(ScriptedChain::default());
        let backend = backend(chain.clone());
        let calls = vec![Call::new(dapp(), "increase_number", vec![Felt::ONE])];
        let source = BindingSource::OutsideExecution {
            envelope: OutsideExecution::new(calls.clone()),
            revision: Revision::V1,
        };
        let err = backend
            .co_sign(Felt::ONE, &calls, &source, &session(), Felt::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::PolicyViolation { .. }));
        assert_eq!(chain.network_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn signature_verifies_over_binding() {
        let chain = Arc::new(ScriptedChain::default());
        let backend = backend(chain);
        let account = Felt::from(0xacc0u64);
        let chain_id = Felt::from_bytes_be_slice(b"SN_SEPOLIA");
        let calls = vec![Call::new(dapp(), "set_number", vec![Felt::TWO])];
        let details = InvokeDetailsV3::new(account, chain_id, Felt::ZERO, Default::default());
        let source = BindingSource::Transaction(details.clone());

        let signature = backend
            .co_sign(account, &calls, &source, &session(), Felt::ZERO)
            .await
            .unwrap();
        let expected = binding_hash(
            details.transaction_hash(&calls),
            session().message_hash(chain_id, account),
            Felt::ZERO,
        );
        assert_eq!(signature.signer(), backend.guardian_signer());
        assert!(signature.verify(&expected, Normalization::Canonical));
        assert!(!signature.verify(&Felt::ONE, Normalization::Canonical));
    }
}

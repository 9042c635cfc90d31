//! Dapp-side session service.
//!
//! The dapp holds the session private key. It builds session requests for the
//! owner to approve, then turns every approved session into session tokens:
//! it gets the backend's co-signature, signs the same binding hash with the
//! session key and decides whether the owner approval can be left out
//! because the account already caches it.

use std::sync::Arc;

use async_trait::async_trait;
use starksession::session::AllowedMethod;
use starksession::token::{binding_hash, cache_field};
use starksession::{
    BindingSource, Call, Felt, InvokeDetailsV3, OutsideExecution, Revision, Session,
    SessionToken, SignerSignature, StarknetKeyPair,
};
use tracing::{debug, info};

use crate::account::{Account, TransactionSigner};
use crate::backend::BackendService;
use crate::chain::ChainContext;
use crate::config::DappConfig;
use crate::error::ServiceError;
use crate::rpc::JsonRpcClient;
use crate::telemetry;

#[derive(Clone)]
pub struct DappService {
    backend: Arc<BackendService>,
    session_key: StarknetKeyPair,
    chain: ChainContext,
    config: DappConfig,
}

impl DappService {
    pub fn new(
        backend: Arc<BackendService>,
        session_key: StarknetKeyPair,
        chain: ChainContext,
        config: DappConfig,
    ) -> Self {
        Self { backend, session_key, chain, config }
    }

    /// Connect to `config.rpc_url` and run the backend on the same chain
    /// context.
    pub fn connect(
        config: DappConfig,
        guardian: StarknetKeyPair,
        session_key: StarknetKeyPair,
    ) -> Result<Self, ServiceError> {
        let client = JsonRpcClient::from_config(&config)?;
        let chain = ChainContext::new(Arc::new(client));
        let backend = Arc::new(BackendService::new(guardian, chain.clone()));
        info!(
            "dapp: rpc {} (timeout {}s, session ttl {}s, legacy tokens {})",
            config.rpc_url, config.rpc_timeout_secs, config.session_ttl_secs, config.legacy_tokens
        );
        Ok(Self::new(backend, session_key, chain, config))
    }

    /// Process entry point: install tracing, read [`DappConfig::from_env`]
    /// and [`connect`](Self::connect).
    pub fn from_env(guardian: StarknetKeyPair, session_key: StarknetKeyPair) -> Result<Self, ServiceError> {
        telemetry::init();
        Self::connect(DappConfig::from_env(), guardian, session_key)
    }

    pub fn chain(&self) -> &ChainContext {
        &self.chain
    }

    pub fn config(&self) -> &DappConfig {
        &self.config
    }

    pub fn session_key_guid(&self) -> Felt {
        self.session_key.guid()
    }

    pub fn backend(&self) -> &BackendService {
        &self.backend
    }

    /// Session request for this dapp's key, expiring at `expires_at`.
    pub fn create_session_request(
        &self,
        allowed_methods: Vec<AllowedMethod>,
        expires_at: u64,
        now: u64,
    ) -> Result<Session, ServiceError> {
        let session = Session::new(
            allowed_methods,
            expires_at,
            self.session_key.guid(),
            self.config.metadata.clone(),
            now,
        )?
        .with_legacy_format(self.config.legacy_tokens);
        Ok(session)
    }

    /// Session request expiring one configured TTL after the latest block.
    pub async fn request_session(&self, allowed_methods: Vec<AllowedMethod>) -> Result<Session, ServiceError> {
        let now = self.chain.now().await?;
        self.create_session_request(allowed_methods, now + self.config.session_ttl_secs, now)
    }

    /// Build the session token authorizing `calls` from `account`.
    ///
    /// `authorization` is the owner's approval of `session`. A non-zero
    /// `cache_owner_guid` asks the account to cache that approval; when it
    /// already does, the approval is left out of the token. Outside
    /// executions always carry the approval.
    pub async fn session_token(
        &self,
        account: Felt,
        calls: &[Call],
        session: &Session,
        authorization: &[Felt],
        cache_owner_guid: Felt,
        source: &BindingSource,
    ) -> Result<SessionToken, ServiceError> {
        self.backend.check_policy(calls, session)?;
        let cache = cache_field(cache_owner_guid, session.is_legacy_format());

        let guardian_signature = self
            .backend
            .co_sign(account, calls, source, session, cache)
            .await?;

        let chain_id = self.chain.chain_id().await?;
        let session_hash = session.message_hash(chain_id, account);
        let binding = binding_hash(source.source_hash(calls, chain_id, account), session_hash, cache);
        let session_signature = SignerSignature::Starknet {
            pubkey: self.session_key.public_key(),
            signature: self.session_key.sign(&binding)?,
        };

        let cached = if source.is_outside_execution() || cache_owner_guid == Felt::ZERO {
            false
        } else {
            self.chain
                .is_session_cached(account, session_hash, cache_owner_guid)
                .await?
        };
        debug!(
            "dapp: session {} cached={cached}",
            session_hash.to_hex_string()
        );

        let token = SessionToken::assemble(
            session,
            calls,
            cache_owner_guid,
            authorization,
            cached,
            session_signature,
            guardian_signature,
        )?;
        info!(
            "dapp: token for {} calls on {}",
            calls.len(),
            account.to_hex_string()
        );
        Ok(token)
    }

    /// Token for the next transaction `account` would send, with the binding
    /// resolved from the account's own signer details.
    pub async fn session_token_for(
        &self,
        account: &Account,
        calls: &[Call],
        session: &Session,
        authorization: &[Felt],
        cache_owner_guid: Felt,
    ) -> Result<SessionToken, ServiceError> {
        self.backend.check_policy(calls, session)?;
        let details = account.signer_details().await?;
        let source = BindingSource::Transaction(details);
        self.session_token(account.address(), calls, session, authorization, cache_owner_guid, &source)
            .await
    }

    /// A [`TransactionSigner`] that signs every transaction with a session
    /// token for `session`.
    pub fn session_signer(&self, session: Session, authorization: Vec<Felt>, cache_owner_guid: Felt) -> SessionSigner {
        SessionSigner { dapp: self.clone(), session, authorization, cache_owner_guid }
    }

    /// The `execute_from_outside` call a relayer submits to run `envelope`
    /// on `account` under `session`.
    pub async fn outside_execution_call(
        &self,
        account: Felt,
        session: &Session,
        authorization: &[Felt],
        envelope: OutsideExecution,
        revision: Revision,
        cache_owner_guid: Felt,
    ) -> Result<Call, ServiceError> {
        let source = BindingSource::OutsideExecution { envelope: envelope.clone(), revision };
        let token = self
            .session_token(account, &envelope.calls, session, authorization, cache_owner_guid, &source)
            .await?;
        let signature = token.compile(&envelope.calls)?;
        Ok(envelope.to_call(account, &signature, revision))
    }
}

impl std::fmt::Debug for DappService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DappService")
            .field("session_key", &self.session_key.public_key())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Signs transactions with session tokens.
pub struct SessionSigner {
    dapp: DappService,
    session: Session,
    authorization: Vec<Felt>,
    cache_owner_guid: Felt,
}

impl SessionSigner {
    pub fn session(&self) -> &Session {
        &self.session
    }
}

#[async_trait]
impl TransactionSigner for SessionSigner {
    async fn sign_transaction(&self, calls: &[Call], details: &InvokeDetailsV3) -> Result<Vec<Felt>, ServiceError> {
        let source = BindingSource::Transaction(details.clone());
        let token = self
            .dapp
            .session_token(
                details.sender_address,
                calls,
                &self.session,
                &self.authorization,
                self.cache_owner_guid,
                &source,
            )
            .await?;
        Ok(token.compile(calls)?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use starksession::outside::parse_outside_calldata;
    use starksession::{AssertionFormat, Normalization, TokenError};

    use super::*;
    use crate::chain::tests::ScriptedChain;

    const NOW: u64 = 1_700_000_000;

    fn owner_guid() -> Felt {
        Felt::from(0x0ea1u64)
    }

    fn mock_dapp() -> Felt {
        Felt::from(0xda99u64)
    }

    fn account() -> Felt {
        Felt::from(0xacc0u64)
    }

    fn service(chain: Arc<ScriptedChain>, legacy_tokens: bool) -> DappService {
        let chain = ChainContext::new(chain);
        let backend = Arc::new(BackendService::new(StarknetKeyPair::random(), chain.clone()));
        let config = DappConfig { legacy_tokens, ..DappConfig::default() };
        DappService::new(backend, StarknetKeyPair::random(), chain, config)
    }

    fn session(dapp: &DappService) -> Session {
        dapp.create_session_request(
            vec![
                AllowedMethod::new(mock_dapp(), "set_number"),
                AllowedMethod::new(mock_dapp(), "set_number_double"),
            ],
            NOW + 150,
            NOW,
        )
        .unwrap()
    }

    fn transaction_source() -> BindingSource {
        let chain_id = Felt::from_bytes_be_slice(b"SN_SEPOLIA");
        BindingSource::Transaction(InvokeDetailsV3::new(account(), chain_id, Felt::ZERO, Default::default()))
    }

    fn set_number() -> Vec<Call> {
        vec![Call::new(mock_dapp(), "set_number", vec![Felt::from(42u64)])]
    }

    #[tokio::test]
    async fn request_session_expires_one_ttl_after_latest_block() {
        let dapp = service(Arc::new(ScriptedChain::default()), false);
        let session = dapp.request_session(vec![]).await.unwrap();
        assert_eq!(session.expires_at(), NOW + 3600);
        assert_eq!(session.session_key_guid(), dapp.session_key_guid());
        assert_eq!(session.root(), Felt::ZERO);
    }

    #[tokio::test]
    async fn uncovered_call_is_refused_before_any_network_call() {
        let chain = Arc::new(ScriptedChain::default());
        let dapp = service(chain.clone(), false);
        let session = session(&dapp);
        let calls = vec![Call::new(mock_dapp(), "increase_number", vec![Felt::ONE])];
        let err = dapp
            .session_token(account(), &calls, &session, &[Felt::ONE], owner_guid(), &transaction_source())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::PolicyViolation { .. }));
        assert_eq!(chain.network_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn session_signature_commits_to_binding() {
        let dapp = service(Arc::new(ScriptedChain::default()), false);
        let session = session(&dapp);
        let source = transaction_source();
        let token = dapp
            .session_token(account(), &set_number(), &session, &[Felt::ONE], owner_guid(), &source)
            .await
            .unwrap();

        let chain_id = Felt::from_bytes_be_slice(b"SN_SEPOLIA");
        let binding = binding_hash(
            source.source_hash(&set_number(), chain_id, account()),
            session.message_hash(chain_id, account()),
            owner_guid(),
        );
        assert_eq!(token.session_signature.signer().guid(), session.session_key_guid());
        assert!(token.session_signature.verify(&binding, Normalization::Canonical));
        assert!(token.guardian_signature.verify(&binding, Normalization::Canonical));
        assert_eq!(token.proofs.len(), 1);
    }

    #[tokio::test]
    async fn cached_approval_is_left_out() {
        let chain = Arc::new(ScriptedChain::default());
        let dapp = service(chain.clone(), false);
        let session = session(&dapp);

        let first = dapp
            .session_token(account(), &set_number(), &session, &[Felt::ONE], owner_guid(), &transaction_source())
            .await
            .unwrap();
        *chain.cached.lock().unwrap() = true;
        let second = dapp
            .session_token(account(), &set_number(), &session, &[Felt::ONE], owner_guid(), &transaction_source())
            .await
            .unwrap();

        assert!(!first.is_authorization_omitted());
        assert!(second.is_authorization_omitted());
        assert!(second.encode().len() < first.encode().len());
    }

    #[tokio::test]
    async fn zero_owner_guid_skips_cache_lookup() {
        let chain = Arc::new(ScriptedChain::default());
        *chain.cached.lock().unwrap() = true;
        let dapp = service(chain.clone(), false);
        let session = session(&dapp);
        let token = dapp
            .session_token(account(), &set_number(), &session, &[Felt::ONE], Felt::ZERO, &transaction_source())
            .await
            .unwrap();
        assert!(!token.is_authorization_omitted());
    }

    #[tokio::test]
    async fn outside_execution_always_carries_approval() {
        let chain = Arc::new(ScriptedChain::default());
        *chain.cached.lock().unwrap() = true;
        let dapp = service(chain, false);
        let session = session(&dapp);
        let envelope = OutsideExecution::new(set_number());

        let call = dapp
            .outside_execution_call(account(), &session, &[Felt::ONE], envelope.clone(), Revision::V1, owner_guid())
            .await
            .unwrap();

        assert_eq!(call.to, account());
        let (parsed, signature) = parse_outside_calldata(&call.calldata).unwrap();
        assert_eq!(parsed, envelope);
        let token = SessionToken::decode(&signature, false, AssertionFormat::JsonClientData).unwrap();
        assert_eq!(token.session_authorization, vec![Felt::ONE]);
    }

    #[tokio::test]
    async fn legacy_tokens_carry_a_flag() {
        let dapp = service(Arc::new(ScriptedChain::default()), true);
        let session = session(&dapp);
        assert!(session.is_legacy_format());
        let token = dapp
            .session_token(account(), &set_number(), &session, &[Felt::ONE], owner_guid(), &transaction_source())
            .await
            .unwrap();
        assert_eq!(token.cache_field(), Felt::ONE);
        let decoded = SessionToken::decode(&token.encode(), true, AssertionFormat::JsonClientData).unwrap();
        assert_eq!(decoded.cache_owner_guid, Felt::ONE);
    }

    #[tokio::test]
    async fn session_signer_signs_submitted_transactions() {
        let chain = Arc::new(ScriptedChain::default());
        let dapp = service(chain.clone(), false);
        let session = session(&dapp);
        let signer = dapp.session_signer(session, vec![Felt::ONE], owner_guid());
        let account = crate::account::Account::new(account(), ChainContext::new(chain.clone()), Arc::new(signer));

        account.execute(set_number()).await.unwrap();

        let submitted = chain.submitted.lock().unwrap()[0].clone();
        assert!(SessionToken::is_session_token(&submitted.signature));
    }

    #[tokio::test]
    async fn token_for_account_binds_its_next_transaction() {
        let chain = Arc::new(ScriptedChain::default());
        let dapp = service(chain.clone(), false);
        let session = session(&dapp);
        let owner = starksession::ArgentSigner::new(
            starksession::KeyPair::random(starksession::SignerType::Starknet),
            None,
        );
        let account = Account::new(account(), ChainContext::new(chain), Arc::new(owner));

        let token = dapp
            .session_token_for(&account, &set_number(), &session, &[Felt::ONE], Felt::ZERO)
            .await
            .unwrap();

        let details = account.signer_details().await.unwrap();
        let chain_id = details.chain_id;
        let binding = binding_hash(
            details.transaction_hash(&set_number()),
            session.message_hash(chain_id, account.address()),
            Felt::ZERO,
        );
        assert!(token.session_signature.verify(&binding, Normalization::Canonical));
    }

    #[test]
    fn binding_needs_exactly_one_source() {
        let envelope = OutsideExecution::new(set_number());
        let details = InvokeDetailsV3::new(account(), Felt::ONE, Felt::ZERO, Default::default());
        assert!(matches!(
            BindingSource::from_parts(Some(details), Some((envelope, Revision::V1))),
            Err(TokenError::AmbiguousBinding)
        ));
        assert!(matches!(BindingSource::from_parts(None, None), Err(TokenError::AmbiguousBinding)));
    }
}

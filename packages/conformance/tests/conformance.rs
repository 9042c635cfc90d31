//! End-to-end conformance tests for session tokens.
//!
//! Each test spawns an ephemeral in-process devnet (real TCP, real HTTP) via
//! [`starksession_conformance::spawn_devnet`] and drives it with the same
//! services a deployment uses: a `DappService` connected from a `DappConfig`,
//! `OwnerWallet`, `BackendService` and `Account`.
//!
//! # Coverage
//!
//! | Test | Behaviour |
//! |------|-----------|
//! | `scenario_a_session_calls_succeed` | two session-signed calls, stored value 4 |
//! | `scenario_b_expired_session_is_rejected` | `session/expired`, state unchanged |
//! | `scenario_c_revoked_session_is_rejected` | `session/revoked`, `session/already-revoked` |
//! | `scenario_d_unaligned_proofs` | local and verifier-side `unaligned-proofs` |
//! | `scenario_e_outside_execution_caller` | any-caller sentinel vs. fixed caller |
//! | `outside_execution_window_is_enforced` | `argent/invalid-timestamp` |
//! | `outside_execution_revision_mismatch` | wrong entry point breaks the binding |
//! | `cached_approval_is_reused` | cache set once, later tokens omit the approval |
//! | `zero_owner_guid_never_caches` | cache slot zero disables caching |
//! | `legacy_token_layout` | `cache_authorization: bool` accounts |
//! | `every_owner_scheme_approves_sessions` | secp256k1, secp256r1, EIP-191, WebAuthn owners |
//! | `wrong_guardian_is_rejected` | `session/guardian-key-mismatch` |
//! | `foreign_approval_is_rejected` | `session/invalid-auth` |
//! | `uncovered_call_never_reaches_the_chain` | local policy violation |

use std::sync::Arc;

use starksession::session::AllowedMethod;
use starksession::{
    selector, ArgentSigner, BindingSource, Call, Felt, KeyPair, OutsideExecution, Revision, Session,
    SignerType, StarknetKeyPair, TokenError,
};
use starksession_conformance::{devnet_chain_id, spawn_devnet, AccountSetup, Devnet};
use starksession_dapp::{
    Account, BackendService, ChainContext, DappConfig, DappService, OwnerWallet, ServiceError,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Fixture {
    devnet: Arc<Devnet>,
    chain: ChainContext,
    /// The account, signing with owner + guardian.
    account: Account,
    wallet: OwnerWallet,
    dapp: DappService,
    mock_dapp: Felt,
}

impl Fixture {
    fn address(&self) -> Felt {
        self.account.address()
    }

    fn owner_guid(&self) -> Felt {
        self.wallet.owner_guid()
    }

    fn session(&self, entrypoints: &[&str]) -> Session {
        let allowed = entrypoints
            .iter()
            .map(|name| AllowedMethod::new(self.mock_dapp, *name))
            .collect();
        let now = self.devnet.now();
        self.dapp.create_session_request(allowed, now + 150, now).unwrap()
    }

    fn session_hash(&self, session: &Session) -> Felt {
        session.message_hash(devnet_chain_id(), self.address())
    }

    /// The same account, signing with session tokens for `session`.
    fn session_account(&self, session: &Session, authorization: Vec<Felt>, cache_owner_guid: Felt) -> Account {
        let signer = self.dapp.session_signer(session.clone(), authorization, cache_owner_guid);
        self.account.with_signer(Arc::new(signer))
    }

    /// A second account with its own owner, used as a relayer.
    fn relayer(&self) -> Account {
        let key = KeyPair::random(SignerType::Starknet);
        let address = self.devnet.deploy_account(AccountSetup::new(key.signer(), None));
        Account::new(address, self.chain.clone(), Arc::new(ArgentSigner::new(key, None)))
    }

    fn number(&self) -> Felt {
        self.devnet.number(self.mock_dapp, self.address())
    }

    fn set_number_double(&self, value: u64) -> Call {
        Call::new(self.mock_dapp, "set_number_double", vec![Felt::from(value)])
    }
}

async fn fixture_with(owner: KeyPair, legacy_tokens: bool) -> Fixture {
    let (rpc_url, devnet) = spawn_devnet().await;
    let config = DappConfig { rpc_url, rpc_timeout_secs: 5, legacy_tokens, ..DappConfig::default() };
    let guardian = StarknetKeyPair::random();
    let dapp = DappService::connect(config, guardian.clone(), StarknetKeyPair::random()).unwrap();
    let chain = dapp.chain().clone();

    let mut setup = AccountSetup::new(owner.signer(), Some(guardian.signer()));
    if legacy_tokens {
        setup = setup.legacy_tokens();
    }
    let address = devnet.deploy_account(setup);
    let mock_dapp = devnet.deploy_mock_dapp();

    let argent = ArgentSigner::new(owner, Some(KeyPair::Starknet(guardian.clone())));
    let account = Account::new(address, chain.clone(), Arc::new(argent.clone()));
    let wallet = OwnerWallet::new(address, argent, chain.clone());

    Fixture { devnet, chain, account, wallet, dapp, mock_dapp }
}

async fn fixture() -> Fixture {
    fixture_with(KeyPair::random(SignerType::Starknet), false).await
}

fn revert_reason(err: &ServiceError) -> &str {
    err.revert_reason().unwrap_or_else(|| panic!("expected a revert, got {err:?}"))
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scenario_a_session_calls_succeed() {
    let fx = fixture().await;
    let session = fx.session(&["set_number", "set_number_double"]);
    let authorization = fx.wallet.approve_session(&session).await.unwrap();
    let account = fx.session_account(&session, authorization, fx.owner_guid());

    account.execute(vec![fx.set_number_double(2)]).await.unwrap();
    account.execute(vec![fx.set_number_double(2)]).await.unwrap();

    let stored = account
        .call(&Call::new(fx.mock_dapp, "get_number", vec![fx.address()]))
        .await
        .unwrap();
    assert_eq!(stored, vec![Felt::from(4u64)]);
}

#[tokio::test]
async fn scenario_b_expired_session_is_rejected() {
    let fx = fixture().await;
    let session = fx.session(&["set_number_double"]);
    let authorization = fx.wallet.approve_session(&session).await.unwrap();
    let account = fx.session_account(&session, authorization, fx.owner_guid());
    account.execute(vec![fx.set_number_double(2)]).await.unwrap();

    fx.devnet.increase_time(151);
    let err = account.execute(vec![fx.set_number_double(5)]).await.unwrap_err();

    assert_eq!(revert_reason(&err), "session/expired");
    assert_eq!(fx.number(), Felt::from(4u64));
}

#[tokio::test]
async fn scenario_c_revoked_session_is_rejected() {
    let fx = fixture().await;
    let session = fx.session(&["set_number_double"]);
    let authorization = fx.wallet.approve_session(&session).await.unwrap();
    let account = fx.session_account(&session, authorization, fx.owner_guid());

    fx.account.revoke_session(fx.session_hash(&session)).await.unwrap();
    assert!(fx.devnet.is_revoked(fx.address(), fx.session_hash(&session)));

    let err = account.execute(vec![fx.set_number_double(2)]).await.unwrap_err();
    assert_eq!(revert_reason(&err), "session/revoked");
    assert_eq!(fx.number(), Felt::ZERO);

    let err = fx.account.revoke_session(fx.session_hash(&session)).await.unwrap_err();
    assert_eq!(revert_reason(&err), "session/already-revoked");
}

#[tokio::test]
async fn scenario_d_unaligned_proofs() {
    let fx = fixture().await;
    let session = fx.session(&["set_number_double"]);
    let authorization = fx.wallet.approve_session(&session).await.unwrap();
    let one_call = vec![fx.set_number_double(2)];
    let two_calls = vec![fx.set_number_double(2), fx.set_number_double(3)];

    let details = fx.account.signer_details().await.unwrap();
    let token = fx
        .dapp
        .session_token(
            fx.address(),
            &one_call,
            &session,
            &authorization,
            fx.owner_guid(),
            &BindingSource::Transaction(details.clone()),
        )
        .await
        .unwrap();

    assert!(matches!(
        token.compile(&two_calls),
        Err(TokenError::UnalignedProofs { proofs: 1, calls: 2 })
    ));

    let transaction = details.into_transaction(&two_calls, token.encode());
    let err = fx.chain.submit(&transaction).await.unwrap_err();
    assert_eq!(err.revert_reason(), Some("session/unaligned-proofs"));
    assert_eq!(fx.number(), Felt::ZERO);
}

#[tokio::test]
async fn scenario_e_outside_execution_caller() {
    let fx = fixture().await;
    let session = fx.session(&["set_number_double"]);
    let authorization = fx.wallet.approve_session(&session).await.unwrap();
    let relayer = fx.relayer();
    let other = fx.relayer();

    let anyone = OutsideExecution::new(vec![fx.set_number_double(2)]);
    let call = fx
        .dapp
        .outside_execution_call(fx.address(), &session, &authorization, anyone, Revision::V1, fx.owner_guid())
        .await
        .unwrap();
    relayer.execute(vec![call]).await.unwrap();
    assert_eq!(fx.number(), Felt::from(4u64));

    let pinned = OutsideExecution::new(vec![fx.set_number_double(3)]).with_caller(relayer.address());
    let call = fx
        .dapp
        .outside_execution_call(fx.address(), &session, &authorization, pinned, Revision::V1, fx.owner_guid())
        .await
        .unwrap();
    let err = other.execute(vec![call.clone()]).await.unwrap_err();
    assert_eq!(revert_reason(&err), "argent/invalid-caller");
    assert_eq!(fx.number(), Felt::from(4u64));

    relayer.execute(vec![call]).await.unwrap();
    assert_eq!(fx.number(), Felt::from(6u64));
}

// ---------------------------------------------------------------------------
// Outside execution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn outside_execution_window_is_enforced() {
    let fx = fixture().await;
    let session = fx.session(&["set_number_double"]);
    let authorization = fx.wallet.approve_session(&session).await.unwrap();
    let now = fx.devnet.now();

    let later = OutsideExecution::new(vec![fx.set_number_double(2)]).with_window(now + 10, now + 100);
    let call = fx
        .dapp
        .outside_execution_call(fx.address(), &session, &authorization, later, Revision::V0, fx.owner_guid())
        .await
        .unwrap();
    let err = fx.relayer().execute(vec![call]).await.unwrap_err();
    assert_eq!(revert_reason(&err), "argent/invalid-timestamp");
}

#[tokio::test]
async fn outside_execution_revision_mismatch() {
    let fx = fixture().await;
    let session = fx.session(&["set_number_double"]);
    let authorization = fx.wallet.approve_session(&session).await.unwrap();

    let envelope = OutsideExecution::new(vec![fx.set_number_double(2)]);
    let call = fx
        .dapp
        .outside_execution_call(fx.address(), &session, &authorization, envelope, Revision::V1, fx.owner_guid())
        .await
        .unwrap();
    let as_v0 = Call { selector: selector("execute_from_outside"), ..call };

    let err = fx.relayer().execute(vec![as_v0]).await.unwrap_err();
    assert_eq!(revert_reason(&err), "session/invalid-session-sig");
    assert_eq!(fx.number(), Felt::ZERO);
}

// ---------------------------------------------------------------------------
// Authorization cache
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cached_approval_is_reused() {
    let fx = fixture().await;
    let session = fx.session(&["set_number_double"]);
    let authorization = fx.wallet.approve_session(&session).await.unwrap();
    let session_hash = fx.session_hash(&session);
    assert!(!fx.devnet.is_cached(fx.address(), session_hash, fx.owner_guid()));

    let account = fx.session_account(&session, authorization.clone(), fx.owner_guid());
    account.execute(vec![fx.set_number_double(2)]).await.unwrap();
    assert!(fx.devnet.is_cached(fx.address(), session_hash, fx.owner_guid()));

    let details = fx.account.signer_details().await.unwrap();
    let token = fx
        .dapp
        .session_token(
            fx.address(),
            &[fx.set_number_double(3)],
            &session,
            &authorization,
            fx.owner_guid(),
            &BindingSource::Transaction(details),
        )
        .await
        .unwrap();
    assert!(token.is_authorization_omitted());

    account.execute(vec![fx.set_number_double(3)]).await.unwrap();
    assert!(fx.devnet.is_cached(fx.address(), session_hash, fx.owner_guid()));
    assert_eq!(fx.number(), Felt::from(6u64));
}

#[tokio::test]
async fn zero_owner_guid_never_caches() {
    let fx = fixture().await;
    let session = fx.session(&["set_number_double"]);
    let authorization = fx.wallet.approve_session(&session).await.unwrap();
    let account = fx.session_account(&session, authorization, Felt::ZERO);

    account.execute(vec![fx.set_number_double(2)]).await.unwrap();
    account.execute(vec![fx.set_number_double(3)]).await.unwrap();

    assert!(!fx.devnet.is_cached(fx.address(), fx.session_hash(&session), fx.owner_guid()));
    assert_eq!(fx.number(), Felt::from(6u64));
}

#[tokio::test]
async fn legacy_token_layout() {
    let fx = fixture_with(KeyPair::random(SignerType::Starknet), true).await;
    let session = fx.session(&["set_number_double"]);
    assert!(session.is_legacy_format());
    let authorization = fx.wallet.approve_session(&session).await.unwrap();
    let account = fx.session_account(&session, authorization, fx.owner_guid());

    account.execute(vec![fx.set_number_double(2)]).await.unwrap();
    account.execute(vec![fx.set_number_double(4)]).await.unwrap();

    assert!(fx.devnet.is_cached(fx.address(), fx.session_hash(&session), fx.owner_guid()));
    assert_eq!(fx.number(), Felt::from(8u64));
}

// ---------------------------------------------------------------------------
// Signers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn every_owner_scheme_approves_sessions() {
    for scheme in [SignerType::Secp256k1, SignerType::Secp256r1, SignerType::Eip191, SignerType::Webauthn] {
        let fx = fixture_with(KeyPair::random(scheme), false).await;
        let session = fx.session(&["set_number_double"]);
        let authorization = fx.wallet.approve_session(&session).await.unwrap();
        let account = fx.session_account(&session, authorization, fx.owner_guid());

        account.execute(vec![fx.set_number_double(2)]).await.unwrap();
        assert_eq!(fx.number(), Felt::from(4u64), "{scheme}");
    }
}

#[tokio::test]
async fn wrong_guardian_is_rejected() {
    let fx = fixture().await;
    let rogue_backend = Arc::new(BackendService::new(StarknetKeyPair::random(), fx.chain.clone()));
    let rogue_dapp = DappService::new(rogue_backend, StarknetKeyPair::random(), fx.chain.clone(), DappConfig::default());
    let now = fx.devnet.now();
    let session = rogue_dapp
        .create_session_request(vec![AllowedMethod::new(fx.mock_dapp, "set_number_double")], now + 150, now)
        .unwrap();
    let authorization = fx.wallet.approve_session(&session).await.unwrap();

    let signer = rogue_dapp.session_signer(session, authorization, fx.owner_guid());
    let err = fx
        .account
        .with_signer(Arc::new(signer))
        .execute(vec![fx.set_number_double(2)])
        .await
        .unwrap_err();
    assert_eq!(revert_reason(&err), "session/guardian-key-mismatch");
}

#[tokio::test]
async fn foreign_approval_is_rejected() {
    let fx = fixture().await;
    let session = fx.session(&["set_number_double"]);
    let stranger = OwnerWallet::new(
        fx.address(),
        ArgentSigner::new(KeyPair::random(SignerType::Starknet), None),
        fx.chain.clone(),
    );
    let authorization = stranger.approve_session(&session).await.unwrap();
    let account = fx.session_account(&session, authorization, fx.owner_guid());

    let err = account.execute(vec![fx.set_number_double(2)]).await.unwrap_err();
    assert_eq!(revert_reason(&err), "session/invalid-auth");
    assert!(!fx.devnet.is_cached(fx.address(), fx.session_hash(&session), fx.owner_guid()));
}

#[tokio::test]
async fn uncovered_call_never_reaches_the_chain() {
    let fx = fixture().await;
    let session = fx.session(&["set_number_double"]);
    let authorization = fx.wallet.approve_session(&session).await.unwrap();
    let account = fx.session_account(&session, authorization, fx.owner_guid());

    let err = account
        .execute(vec![Call::new(fx.mock_dapp, "increase_number", vec![Felt::ONE])])
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::PolicyViolation { .. }));
    assert_eq!(fx.devnet.nonce(fx.address()).unwrap(), Felt::ZERO);
}

//! In-memory chain: accounts, mock dapps, an adjustable clock and receipts.
//!
//! All state lives behind one [`RwLock`]. A transaction is validated first;
//! a validation failure rejects it outright and leaves the nonce untouched.
//! Once validated the nonce is bumped and the calls run; a revert rolls back
//! everything the calls did and is recorded in the receipt.

use std::collections::HashMap;
use std::sync::RwLock;

use starksession::outside::{entrypoint, parse_outside_calldata};
use starksession::{
    selector, AssertionFormat, Call, Felt, InvokeTransactionV3, Revision, SessionToken, Signer,
};
use starksession_dapp::{ExecutionStatus, Receipt};
use tracing::{debug, info};

use crate::mock_dapp::MockDapp;
use crate::verifier::{AccountState, Revert};

/// Clock value of a fresh devnet.
pub const GENESIS_TIME: u64 = 1_700_000_000;

const FIRST_ADDRESS: u64 = 0x1000;

#[derive(Debug, thiserror::Error)]
pub enum DevnetError {
    #[error("contract {} not found", .0.to_hex_string())]
    ContractNotFound(Felt),

    #[error("invalid nonce: expected {expected}, got {got}")]
    InvalidNonce { expected: Felt, got: Felt },

    /// The account refused to validate the transaction.
    #[error("validation failed: {0}")]
    Validation(Revert),

    /// A read-only call failed.
    #[error("contract error: {0}")]
    Contract(Revert),

    #[error("transaction {} not found", .0.to_hex_string())]
    TransactionNotFound(Felt),
}

/// How a verifier account is deployed.
#[derive(Debug, Clone)]
pub struct AccountSetup {
    owner: Signer,
    guardian: Option<Signer>,
    legacy_tokens: bool,
    assertion_format: AssertionFormat,
}

impl AccountSetup {
    pub fn new(owner: Signer, guardian: Option<Signer>) -> Self {
        Self { owner, guardian, legacy_tokens: false, assertion_format: AssertionFormat::default() }
    }

    /// Read session tokens in the legacy `cache_authorization: bool` layout.
    pub fn legacy_tokens(mut self) -> Self {
        self.legacy_tokens = true;
        self
    }

    pub fn assertion_format(mut self, format: AssertionFormat) -> Self {
        self.assertion_format = format;
        self
    }
}

#[derive(Debug, Clone)]
struct Inner {
    now: u64,
    next_address: u64,
    accounts: HashMap<Felt, AccountState>,
    dapps: HashMap<Felt, MockDapp>,
    receipts: HashMap<Felt, Receipt>,
}

impl Inner {
    fn new() -> Self {
        Self {
            now: GENESIS_TIME,
            next_address: FIRST_ADDRESS,
            accounts: HashMap::new(),
            dapps: HashMap::new(),
            receipts: HashMap::new(),
        }
    }

    fn allocate_address(&mut self) -> Felt {
        let address = Felt::from(self.next_address);
        self.next_address += 1;
        address
    }

    fn account(&self, address: &Felt) -> Result<&AccountState, Revert> {
        self.accounts
            .get(address)
            .ok_or_else(|| Revert(format!("CONTRACT_NOT_DEPLOYED {}", address.to_hex_string())))
    }

    fn account_mut(&mut self, address: &Felt) -> Result<&mut AccountState, Revert> {
        self.accounts
            .get_mut(address)
            .ok_or_else(|| Revert(format!("CONTRACT_NOT_DEPLOYED {}", address.to_hex_string())))
    }
}

pub struct Devnet {
    chain_id: Felt,
    inner: RwLock<Inner>,
}

impl Devnet {
    pub fn new(chain_id: Felt) -> Self {
        Self { chain_id, inner: RwLock::new(Inner::new()) }
    }

    pub fn chain_id(&self) -> Felt {
        self.chain_id
    }

    // -----------------------------------------------------------------------
    // Clock
    // -----------------------------------------------------------------------

    pub fn now(&self) -> u64 {
        self.inner.read().unwrap().now
    }

    pub fn set_time(&self, now: u64) {
        self.inner.write().unwrap().now = now;
    }

    pub fn increase_time(&self, seconds: u64) {
        self.inner.write().unwrap().now += seconds;
    }

    // -----------------------------------------------------------------------
    // Deployment and inspection
    // -----------------------------------------------------------------------

    pub fn deploy_account(&self, setup: AccountSetup) -> Felt {
        let mut inner = self.inner.write().unwrap();
        let address = inner.allocate_address();
        let mut state = AccountState::new(setup.owner, setup.guardian);
        state.legacy_tokens = setup.legacy_tokens;
        state.assertion_format = setup.assertion_format;
        inner.accounts.insert(address, state);
        info!("devnet: account deployed at {}", address.to_hex_string());
        address
    }

    pub fn deploy_mock_dapp(&self) -> Felt {
        let mut inner = self.inner.write().unwrap();
        let address = inner.allocate_address();
        inner.dapps.insert(address, MockDapp::default());
        address
    }

    /// `MockDapp` storage slot of `user`, zero when unset or undeployed.
    pub fn number(&self, dapp: Felt, user: Felt) -> Felt {
        let inner = self.inner.read().unwrap();
        inner.dapps.get(&dapp).map(|d| d.number(&user)).unwrap_or(Felt::ZERO)
    }

    pub fn is_revoked(&self, account: Felt, session_hash: Felt) -> bool {
        let inner = self.inner.read().unwrap();
        inner.accounts.get(&account).is_some_and(|state| state.revoked.contains(&session_hash))
    }

    pub fn is_cached(&self, account: Felt, session_hash: Felt, owner_guid: Felt) -> bool {
        let inner = self.inner.read().unwrap();
        inner.accounts.get(&account).is_some_and(|state| state.is_cached(session_hash, owner_guid))
    }

    // -----------------------------------------------------------------------
    // RPC surface
    // -----------------------------------------------------------------------

    pub fn nonce(&self, account: Felt) -> Result<Felt, DevnetError> {
        let inner = self.inner.read().unwrap();
        inner
            .accounts
            .get(&account)
            .map(|state| state.nonce)
            .ok_or(DevnetError::ContractNotFound(account))
    }

    /// Read-only call against the current state.
    pub fn call(&self, call: &Call) -> Result<Vec<Felt>, DevnetError> {
        let inner = self.inner.read().unwrap();
        if let Some(dapp) = inner.dapps.get(&call.to) {
            return dapp.view(call).map_err(DevnetError::Contract);
        }
        let state = inner.accounts.get(&call.to).ok_or(DevnetError::ContractNotFound(call.to))?;
        if call.selector != selector("is_session_authorization_cached") {
            return Err(DevnetError::Contract(Revert::new("ENTRYPOINT_NOT_FOUND")));
        }
        match call.calldata.as_slice() {
            [session_hash, owner_guid] => {
                let cached = state.is_cached(*session_hash, *owner_guid);
                Ok(vec![if cached { Felt::ONE } else { Felt::ZERO }])
            }
            _ => Err(DevnetError::Contract(Revert::new("Failed to deserialize param #1"))),
        }
    }

    /// Validate and execute an invoke transaction, returning its hash.
    pub fn add_invoke_transaction(&self, transaction: &InvokeTransactionV3) -> Result<Felt, DevnetError> {
        let mut inner = self.inner.write().unwrap();
        let sender = transaction.sender_address;
        let now = inner.now;
        let state = inner.accounts.get(&sender).ok_or(DevnetError::ContractNotFound(sender))?;
        if transaction.nonce != state.nonce {
            return Err(DevnetError::InvalidNonce { expected: state.nonce, got: transaction.nonce });
        }

        let hash = transaction.transaction_hash(self.chain_id);
        let calls = transaction
            .calls()
            .map_err(|_| DevnetError::Validation(Revert::new("argent/invalid-calldata")))?;
        let to_cache = self
            .validate(state, sender, now, &calls, hash, &transaction.signature, "argent/invalid-signature")
            .map_err(DevnetError::Validation)?;

        let state = inner.account_mut(&sender).map_err(DevnetError::Validation)?;
        state.nonce += Felt::ONE;
        if let Some(entry) = to_cache {
            state.cached.insert(entry);
        }

        let snapshot = inner.clone();
        let mut outcome = Ok(());
        for call in &calls {
            if let Err(revert) = self.execute_call(&mut inner, sender, call) {
                outcome = Err(revert);
                break;
            }
        }
        let receipt = match outcome {
            Ok(()) => {
                debug!("devnet: {} succeeded", hash.to_hex_string());
                Receipt { transaction_hash: hash, execution_status: ExecutionStatus::Succeeded, revert_reason: None }
            }
            Err(Revert(reason)) => {
                info!("devnet: {} reverted: {reason}", hash.to_hex_string());
                *inner = snapshot;
                Receipt {
                    transaction_hash: hash,
                    execution_status: ExecutionStatus::Reverted,
                    revert_reason: Some(reason),
                }
            }
        };
        inner.receipts.insert(hash, receipt);
        Ok(hash)
    }

    pub fn receipt(&self, transaction_hash: Felt) -> Result<Receipt, DevnetError> {
        let inner = self.inner.read().unwrap();
        inner
            .receipts
            .get(&transaction_hash)
            .cloned()
            .ok_or(DevnetError::TransactionNotFound(transaction_hash))
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Session token or owner multisig, whichever `signature` is.
    #[allow(clippy::too_many_arguments)]
    fn validate(
        &self,
        state: &AccountState,
        account: Felt,
        now: u64,
        calls: &[Call],
        hash: Felt,
        signature: &[Felt],
        owner_failure: &str,
    ) -> Result<Option<(Felt, Felt)>, Revert> {
        if SessionToken::is_session_token(signature) {
            return state.validate_session(self.chain_id, account, now, calls, hash, signature);
        }
        if state.check_multisig(&hash, signature) {
            Ok(None)
        } else {
            Err(Revert::new(owner_failure))
        }
    }

    fn execute_call(&self, inner: &mut Inner, caller: Felt, call: &Call) -> Result<Vec<Felt>, Revert> {
        if let Some(dapp) = inner.dapps.get_mut(&call.to) {
            return dapp.execute(caller, call);
        }
        let account = call.to;
        inner.account(&account)?;

        if call.selector == selector("revoke_session") {
            if caller != account {
                return Err(Revert::new("argent/only-self"));
            }
            let session_hash = *call
                .calldata
                .first()
                .ok_or_else(|| Revert::new("argent/invalid-calldata"))?;
            if !inner.account_mut(&account)?.revoked.insert(session_hash) {
                return Err(Revert::new("session/already-revoked"));
            }
            return Ok(Vec::new());
        }
        for revision in [Revision::V0, Revision::V1] {
            if call.selector == selector(entrypoint(revision)) {
                return self.execute_from_outside(inner, caller, account, revision, &call.calldata);
            }
        }
        Err(Revert::new("ENTRYPOINT_NOT_FOUND"))
    }

    fn execute_from_outside(
        &self,
        inner: &mut Inner,
        caller: Felt,
        account: Felt,
        revision: Revision,
        calldata: &[Felt],
    ) -> Result<Vec<Felt>, Revert> {
        let (envelope, signature) =
            parse_outside_calldata(calldata).map_err(|_| Revert::new("argent/invalid-calldata"))?;
        let now = inner.now;
        let state = inner.account(&account)?;

        if !envelope.accepts_caller(&caller) {
            return Err(Revert::new("argent/invalid-caller"));
        }
        if !envelope.is_open_at(now) {
            return Err(Revert::new("argent/invalid-timestamp"));
        }
        if state.outside_nonces.contains(&envelope.nonce) {
            return Err(Revert::new("argent/duplicated-outside-nonce"));
        }
        let hash = envelope.message_hash(self.chain_id, account, revision);
        let to_cache = self.validate(state, account, now, &envelope.calls, hash, &signature, "argent/invalid-owner-sig")?;

        let state = inner.account_mut(&account)?;
        state.outside_nonces.insert(envelope.nonce);
        if let Some(entry) = to_cache {
            state.cached.insert(entry);
        }

        let mut results = Vec::new();
        for call in &envelope.calls {
            results.extend(self.execute_call(inner, account, call)?);
        }
        Ok(results)
    }
}

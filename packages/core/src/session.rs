//! Sessions: time-boxed, method-scoped delegations to a session key.
//!
//! A [`Session`] is built once by the dapp, approved once by the account
//! owner over its typed-data hash, and then referenced by every session
//! token. It never changes after construction.
//!
//! # Typed data
//!
//! Sessions hash under SNIP-12 revision 1 with the domain
//! `SessionAccount.session`. The domain version is the short string `"1"`
//! (`0x31`) while the revision field is the number `1`; deployed verifiers
//! expect exactly that mix.
//!
//! ```text
//! "Session"("Expires At":"timestamp","Allowed Methods":"merkletree","Metadata":"string","Session Key":"felt")
//! "Allowed Method"("Contract Address":"ContractAddress","selector":"selector")
//! ```

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use starknet_crypto::poseidon_hash_many;
use starknet_types_core::felt::Felt;
use thiserror::Error;

use crate::calldata::{CairoDeserialize, CairoSerialize, CalldataError, CalldataReader};
use crate::encoding::{selector, ByteArray};
use crate::merkle::{verify_proof, MerkleTree};
use crate::transaction::Call;
use crate::typed_data::{type_hash, Domain, Revision};

pub const SESSION_DOMAIN_NAME: &str = "SessionAccount.session";

const SESSION_TYPE: &str = concat!(
    r#""Session"("Expires At":"timestamp","Allowed Methods":"merkletree","#,
    r#""Metadata":"string","Session Key":"felt")"#
);

const ALLOWED_METHOD_TYPE: &str =
    r#""Allowed Method"("Contract Address":"ContractAddress","selector":"selector")"#;

pub static SESSION_TYPE_HASH: LazyLock<Felt> = LazyLock::new(|| type_hash(SESSION_TYPE));

pub static ALLOWED_METHOD_HASH: LazyLock<Felt> = LazyLock::new(|| type_hash(ALLOWED_METHOD_TYPE));

/// Metadata attached to sessions requested without explicit metadata.
pub const DEFAULT_METADATA: &str = r#"{"metadata":"metadata","max_fee":0}"#;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session expires at {expires_at}, which is not after {now}")]
    AlreadyExpired { expires_at: u64, now: u64 },
    #[error("allowed method #{index} has a zero contract address")]
    ZeroContract { index: usize },
    #[error("allowed method #{index} has an empty entrypoint")]
    EmptyEntrypoint { index: usize },
    #[error("call to {contract}::{selector} is not covered by the session")]
    MethodNotAllowed { contract: String, selector: String },
}

/// Session domain for a chain.
pub fn session_domain(chain_id: Felt) -> Domain {
    Domain {
        name: Felt::from_bytes_be_slice(SESSION_DOMAIN_NAME.as_bytes()),
        version: Felt::from_bytes_be_slice(b"1"),
        chain_id,
        revision: Revision::V1,
    }
}

/// Call revoking `session_hash` on `account`. The account must call itself.
pub fn revoke_session_call(account: Felt, session_hash: Felt) -> Call {
    Call::new(account, "revoke_session", vec![session_hash])
}

/// Read-only call asking `account` whether the approval of `session_hash`
/// is cached under `owner_guid`.
pub fn cache_lookup_call(account: Felt, session_hash: Felt, owner_guid: Felt) -> Call {
    Call::new(account, "is_session_authorization_cached", vec![session_hash, owner_guid])
}

// ---------------------------------------------------------------------------
// AllowedMethod
// ---------------------------------------------------------------------------

/// A `(contract, entrypoint)` pair the session key may call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AllowedMethod {
    pub contract_address: Felt,
    pub entrypoint: String,
}

impl AllowedMethod {
    pub fn new(contract_address: Felt, entrypoint: impl Into<String>) -> Self {
        Self { contract_address, entrypoint: entrypoint.into() }
    }

    pub fn selector(&self) -> Felt {
        selector(&self.entrypoint)
    }

    pub fn leaf(&self) -> Felt {
        method_leaf(self.contract_address, self.selector())
    }

    pub fn covers(&self, call: &Call) -> bool {
        self.contract_address == call.to && self.selector() == call.selector
    }
}

/// Merkle leaf for a `(contract, selector)` pair: the revision-1 struct hash
/// of an `Allowed Method`.
pub fn method_leaf(contract_address: Felt, selector: Felt) -> Felt {
    poseidon_hash_many(&[*ALLOWED_METHOD_HASH, contract_address, selector])
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    expires_at: u64,
    allowed_methods: Vec<AllowedMethod>,
    metadata: String,
    session_key_guid: Felt,
    legacy_format: bool,
    tree: MerkleTree,
}

impl Session {
    /// Build a session, rejecting an expiry at or before `now` and malformed
    /// entries. An empty allow-list is valid and permits no calls.
    pub fn new(
        allowed_methods: Vec<AllowedMethod>,
        expires_at: u64,
        session_key_guid: Felt,
        metadata: impl Into<String>,
        now: u64,
    ) -> Result<Self, SessionError> {
        if expires_at <= now {
            return Err(SessionError::AlreadyExpired { expires_at, now });
        }
        for (index, method) in allowed_methods.iter().enumerate() {
            if method.contract_address == Felt::ZERO {
                return Err(SessionError::ZeroContract { index });
            }
            if method.entrypoint.is_empty() {
                return Err(SessionError::EmptyEntrypoint { index });
            }
        }
        let tree = MerkleTree::new(allowed_methods.iter().map(AllowedMethod::leaf).collect());
        Ok(Self {
            expires_at,
            allowed_methods,
            metadata: metadata.into(),
            session_key_guid,
            legacy_format: false,
            tree,
        })
    }

    /// Mark the session as targeting accounts that still read the legacy
    /// token layout.
    pub fn with_legacy_format(mut self, legacy_format: bool) -> Self {
        self.legacy_format = legacy_format;
        self
    }

    pub fn expires_at(&self) -> u64 {
        self.expires_at
    }

    pub fn allowed_methods(&self) -> &[AllowedMethod] {
        &self.allowed_methods
    }

    pub fn metadata(&self) -> &str {
        &self.metadata
    }

    pub fn session_key_guid(&self) -> Felt {
        self.session_key_guid
    }

    pub fn is_legacy_format(&self) -> bool {
        self.legacy_format
    }

    pub fn root(&self) -> Felt {
        self.tree.root()
    }

    pub fn metadata_hash(&self) -> Felt {
        ByteArray::from(self.metadata.as_str()).hash()
    }

    pub fn covers(&self, call: &Call) -> bool {
        self.allowed_methods.iter().any(|method| method.covers(call))
    }

    /// Merkle proof for the allowed method `call` targets.
    pub fn proof_for(&self, call: &Call) -> Result<Vec<Felt>, SessionError> {
        self.tree
            .proof(&method_leaf(call.to, call.selector))
            .map_err(|_| SessionError::MethodNotAllowed {
                contract: call.to.to_hex_string(),
                selector: call.selector.to_hex_string(),
            })
    }

    pub fn proofs_for(&self, calls: &[Call]) -> Result<Vec<Vec<Felt>>, SessionError> {
        calls.iter().map(|call| self.proof_for(call)).collect()
    }

    pub fn to_on_chain(&self) -> OnChainSession {
        OnChainSession {
            expires_at: self.expires_at,
            allowed_methods_root: self.root(),
            metadata_hash: self.metadata_hash(),
            session_key_guid: self.session_key_guid,
        }
    }

    pub fn struct_hash(&self) -> Felt {
        self.to_on_chain().struct_hash()
    }

    /// Typed-data hash the owner approves and both co-signers bind to.
    pub fn message_hash(&self, chain_id: Felt, account: Felt) -> Felt {
        self.to_on_chain().message_hash(chain_id, account)
    }
}

/// The projection of a session the verifier receives in every token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnChainSession {
    pub expires_at: u64,
    pub allowed_methods_root: Felt,
    pub metadata_hash: Felt,
    pub session_key_guid: Felt,
}

impl OnChainSession {
    pub fn struct_hash(&self) -> Felt {
        poseidon_hash_many(&[
            *SESSION_TYPE_HASH,
            Felt::from(self.expires_at),
            self.allowed_methods_root,
            self.metadata_hash,
            self.session_key_guid,
        ])
    }

    pub fn message_hash(&self, chain_id: Felt, account: Felt) -> Felt {
        session_domain(chain_id).message_hash(account, self.struct_hash())
    }

    /// Check that `call` is a leaf of this session's allow-list.
    pub fn verify_call(&self, call: &Call, proof: &[Felt]) -> bool {
        verify_proof(&self.allowed_methods_root, &method_leaf(call.to, call.selector), proof)
    }
}

impl CairoSerialize for OnChainSession {
    fn serialize_to(&self, out: &mut Vec<Felt>) {
        self.expires_at.serialize_to(out);
        self.allowed_methods_root.serialize_to(out);
        self.metadata_hash.serialize_to(out);
        self.session_key_guid.serialize_to(out);
    }
}

impl CairoDeserialize for OnChainSession {
    fn deserialize_from(reader: &mut CalldataReader<'_>) -> Result<Self, CalldataError> {
        Ok(Self {
            expires_at: reader.read()?,
            allowed_methods_root: reader.read()?,
            metadata_hash: reader.read()?,
            session_key_guid: reader.read()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

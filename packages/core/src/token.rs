//! Session tokens and the binding hash both co-signers sign.
//!
//! A token is the signature blob of a session-signed transaction:
//!
//! ```text
//! ["session-token",
//!  OnChainSession { expires_at, allowed_methods_root, metadata_hash, session_key_guid },
//!  cache_owner_guid            | cache_authorization: bool   (legacy layout)
//!  session_authorization: Span<felt>    empty when the approval is cached
//!  session_signature: SignerSignature
//!  guardian_signature: SignerSignature
//!  proofs: Span<Span<felt>>             one per call, leaf to root]
//! ```
//!
//! The session key and the guardian sign the same binding:
//! `poseidon(source_hash, session_hash, cache_field)`, where the source is
//! either an invoke transaction hash or an outside-execution message hash.

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use starknet_crypto::poseidon_hash_many;
use starknet_types_core::felt::Felt;
use thiserror::Error;

use crate::calldata::{CairoSerialize, CalldataError, CalldataReader};
use crate::outside::OutsideExecution;
use crate::session::{OnChainSession, Session, SessionError};
use crate::signer::{AssertionFormat, SignerSignature};
use crate::transaction::{Call, InvokeDetailsV3};
use crate::typed_data::Revision;

/// First felt of every session token.
pub static SESSION_MAGIC: LazyLock<Felt> = LazyLock::new(|| Felt::from_bytes_be_slice(b"session-token"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("{proofs} proofs for {calls} calls")]
    UnalignedProofs { proofs: usize, calls: usize },
    #[error("signature is not a session token")]
    NotASessionToken,
    #[error("exactly one of a transaction or an outside execution must be bound")]
    AmbiguousBinding,
    #[error("malformed token calldata: {0}")]
    Calldata(#[from] CalldataError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

// ---------------------------------------------------------------------------
// Binding
// ---------------------------------------------------------------------------

/// What a session signature commits to besides the session itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingSource {
    Transaction(InvokeDetailsV3),
    OutsideExecution { envelope: OutsideExecution, revision: Revision },
}

impl BindingSource {
    /// Accept exactly one source. Supplying both or neither is a caller bug.
    pub fn from_parts(
        transaction: Option<InvokeDetailsV3>,
        outside: Option<(OutsideExecution, Revision)>,
    ) -> Result<Self, TokenError> {
        match (transaction, outside) {
            (Some(details), None) => Ok(BindingSource::Transaction(details)),
            (None, Some((envelope, revision))) => Ok(BindingSource::OutsideExecution { envelope, revision }),
            _ => Err(TokenError::AmbiguousBinding),
        }
    }

    /// Hash of the transaction or envelope executing `calls` from `account`.
    pub fn source_hash(&self, calls: &[Call], chain_id: Felt, account: Felt) -> Felt {
        match self {
            BindingSource::Transaction(details) => details.transaction_hash(calls),
            BindingSource::OutsideExecution { envelope, revision } => {
                envelope.message_hash(chain_id, account, *revision)
            }
        }
    }

    pub fn is_outside_execution(&self) -> bool {
        matches!(self, BindingSource::OutsideExecution { .. })
    }
}

/// Value written in the token's cache slot and mixed into the binding.
pub fn cache_field(cache_owner_guid: Felt, legacy_format: bool) -> Felt {
    match (legacy_format, cache_owner_guid == Felt::ZERO) {
        (false, _) => cache_owner_guid,
        (true, true) => Felt::ZERO,
        (true, false) => Felt::ONE,
    }
}

/// One-way combination of the source hash, the session hash and the cache
/// slot.
pub fn binding_hash(source_hash: Felt, session_hash: Felt, cache_field: Felt) -> Felt {
    poseidon_hash_many(&[source_hash, session_hash, cache_field])
}

// ---------------------------------------------------------------------------
// SessionToken
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken {
    pub session: OnChainSession,
    /// Owner GUID under which the approval is (or will be) cached; zero
    /// disables caching. Decoded legacy tokens hold 0 or 1.
    pub cache_owner_guid: Felt,
    pub legacy_format: bool,
    pub session_authorization: Vec<Felt>,
    pub session_signature: SignerSignature,
    pub guardian_signature: SignerSignature,
    pub proofs: Vec<Vec<Felt>>,
}

impl SessionToken {
    /// Build a token for `calls`, looking up one proof per call. The owner
    /// approval is dropped when `cached` is true.
    ///
    /// A call the session does not cover fails with
    /// [`SessionError::MethodNotAllowed`].
    #[allow(clippy::too_many_arguments)]
    pub fn assemble(
        session: &Session,
        calls: &[Call],
        cache_owner_guid: Felt,
        session_authorization: &[Felt],
        cached: bool,
        session_signature: SignerSignature,
        guardian_signature: SignerSignature,
    ) -> Result<Self, TokenError> {
        let proofs = session.proofs_for(calls)?;
        let token = Self {
            session: session.to_on_chain(),
            cache_owner_guid,
            legacy_format: session.is_legacy_format(),
            session_authorization: if cached { Vec::new() } else { session_authorization.to_vec() },
            session_signature,
            guardian_signature,
            proofs,
        };
        token.check_aligned(calls.len())?;
        Ok(token)
    }

    pub fn check_aligned(&self, call_count: usize) -> Result<(), TokenError> {
        if self.proofs.len() != call_count {
            return Err(TokenError::UnalignedProofs { proofs: self.proofs.len(), calls: call_count });
        }
        Ok(())
    }

    pub fn cache_field(&self) -> Felt {
        cache_field(self.cache_owner_guid, self.legacy_format)
    }

    pub fn is_authorization_omitted(&self) -> bool {
        self.session_authorization.is_empty()
    }

    /// Signature blob for a transaction executing `calls`.
    pub fn compile(&self, calls: &[Call]) -> Result<Vec<Felt>, TokenError> {
        self.check_aligned(calls.len())?;
        Ok(self.encode())
    }

    /// Signature blob without the alignment check.
    pub fn encode(&self) -> Vec<Felt> {
        let mut out = vec![*SESSION_MAGIC];
        self.serialize_to(&mut out);
        out
    }

    pub fn is_session_token(signature: &[Felt]) -> bool {
        signature.first() == Some(&*SESSION_MAGIC)
    }

    /// Parse a signature blob. WebAuthn signatures inside use `format`.
    pub fn decode(signature: &[Felt], legacy_format: bool, format: AssertionFormat) -> Result<Self, TokenError> {
        let (magic, body) = signature.split_first().ok_or(TokenError::NotASessionToken)?;
        if *magic != *SESSION_MAGIC {
            return Err(TokenError::NotASessionToken);
        }
        let mut reader = CalldataReader::new(body);
        let session = reader.read()?;
        let cache_owner_guid = if !legacy_format {
            reader.read()?
        } else if reader.read::<bool>()? {
            Felt::ONE
        } else {
            Felt::ZERO
        };
        let token = Self {
            session,
            cache_owner_guid,
            legacy_format,
            session_authorization: reader.read()?,
            session_signature: SignerSignature::read_with(&mut reader, format)?,
            guardian_signature: SignerSignature::read_with(&mut reader, format)?,
            proofs: reader.read()?,
        };
        reader.finish()?;
        Ok(token)
    }
}

impl CairoSerialize for SessionToken {
    fn serialize_to(&self, out: &mut Vec<Felt>) {
        self.session.serialize_to(out);
        if self.legacy_format {
            (self.cache_owner_guid != Felt::ZERO).serialize_to(out);
        } else {
            self.cache_owner_guid.serialize_to(out);
        }
        self.session_authorization.serialize_to(out);
        self.session_signature.serialize_to(out);
        self.guardian_signature.serialize_to(out);
        self.proofs.serialize_to(out);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Account-side validation: the checks a deployed account runs on an owner
//! multisig or a session token before it executes anything.
//!
//! Session tokens are checked in this order, and the first failure wins:
//!
//! | Check | Revert reason |
//! |-------|---------------|
//! | token parses | `session/invalid-token` |
//! | session not revoked | `session/revoked` |
//! | `now < expires_at` | `session/expired` |
//! | one proof per call | `session/unaligned-proofs` |
//! | every call in the allow-list | `session/invalid-call` |
//! | owner approval, unless cached | `session/invalid-auth` |
//! | session-key signature over the binding | `session/invalid-session-sig` |
//! | co-signer is the account's guardian | `session/guardian-key-mismatch` |
//! | guardian signature over the binding | `session/invalid-backend-sig` |

use std::collections::HashSet;

use starksession::signer::parse_signatures;
use starksession::token::binding_hash;
use starksession::{AssertionFormat, Call, Felt, Normalization, SessionToken, Signer};

/// A rejected transaction or call, with the reason reported to clients.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct Revert(pub String);

impl Revert {
    pub fn new(reason: &str) -> Self {
        Revert(reason.to_owned())
    }
}

/// Per-account verifier state.
#[derive(Debug, Clone)]
pub struct AccountState {
    pub owner: Signer,
    pub guardian: Option<Signer>,
    pub legacy_tokens: bool,
    pub assertion_format: AssertionFormat,
    pub nonce: Felt,
    pub revoked: HashSet<Felt>,
    /// `(session_hash, owner_guid)` pairs whose approval was already checked.
    pub cached: HashSet<(Felt, Felt)>,
    pub outside_nonces: HashSet<Felt>,
}

impl AccountState {
    pub fn new(owner: Signer, guardian: Option<Signer>) -> Self {
        Self {
            owner,
            guardian,
            legacy_tokens: false,
            assertion_format: AssertionFormat::default(),
            nonce: Felt::ZERO,
            revoked: HashSet::new(),
            cached: HashSet::new(),
            outside_nonces: HashSet::new(),
        }
    }

    pub fn is_cached(&self, session_hash: Felt, owner_guid: Felt) -> bool {
        self.cached.contains(&(session_hash, owner_guid))
    }

    /// Check a `[count, owner_sig, guardian_sig?]` array over `hash`: the
    /// owner first, then the guardian when the account has one.
    pub fn check_multisig(&self, hash: &Felt, signature: &[Felt]) -> bool {
        let Ok(signatures) = parse_signatures(signature, self.assertion_format) else {
            return false;
        };
        let expected: Vec<&Signer> = std::iter::once(&self.owner).chain(self.guardian.as_ref()).collect();
        signatures.len() == expected.len()
            && signatures
                .iter()
                .zip(expected)
                .all(|(sig, signer)| sig.signer() == *signer && sig.verify(hash, Normalization::Canonical))
    }

    /// Validate a session token authorizing `calls`, bound to `source_hash`.
    ///
    /// Returns the cache entry to record once the whole transaction is
    /// accepted. Nothing is mutated here.
    pub fn validate_session(
        &self,
        chain_id: Felt,
        account: Felt,
        now: u64,
        calls: &[Call],
        source_hash: Felt,
        signature: &[Felt],
    ) -> Result<Option<(Felt, Felt)>, Revert> {
        let token = SessionToken::decode(signature, self.legacy_tokens, self.assertion_format)
            .map_err(|_| Revert::new("session/invalid-token"))?;
        let session_hash = token.session.message_hash(chain_id, account);

        if self.revoked.contains(&session_hash) {
            return Err(Revert::new("session/revoked"));
        }
        if now >= token.session.expires_at {
            return Err(Revert::new("session/expired"));
        }
        if token.proofs.len() != calls.len() {
            return Err(Revert::new("session/unaligned-proofs"));
        }
        if !calls.iter().zip(&token.proofs).all(|(call, proof)| token.session.verify_call(call, proof)) {
            return Err(Revert::new("session/invalid-call"));
        }

        let cache = token.cache_field();
        let owner_guid = self.owner.guid();
        let mut to_cache = None;
        if cache == Felt::ZERO || !self.is_cached(session_hash, owner_guid) {
            if !token.legacy_format && cache != Felt::ZERO && token.cache_owner_guid != owner_guid {
                return Err(Revert::new("session/invalid-auth"));
            }
            if !self.check_multisig(&session_hash, &token.session_authorization) {
                return Err(Revert::new("session/invalid-auth"));
            }
            if cache != Felt::ZERO {
                to_cache = Some((session_hash, owner_guid));
            }
        }

        let binding = binding_hash(source_hash, session_hash, cache);
        let session_signer = token.session_signature.signer();
        if session_signer.guid() != token.session.session_key_guid
            || !token.session_signature.verify(&binding, Normalization::Canonical)
        {
            return Err(Revert::new("session/invalid-session-sig"));
        }

        match &self.guardian {
            Some(guardian) if *guardian == token.guardian_signature.signer() => {}
            _ => return Err(Revert::new("session/guardian-key-mismatch")),
        }
        if !token.guardian_signature.verify(&binding, Normalization::Canonical) {
            return Err(Revert::new("session/invalid-backend-sig"));
        }
        Ok(to_cache)
    }
}

#[cfg(test)]
mod tests {
    use starksession::{ArgentSigner, KeyPair, RawSigner, SignerType};

    use super::*;

    #[test]
    fn multisig_requires_owner_then_guardian() {
        let owner = KeyPair::random(SignerType::Secp256r1);
        let guardian = KeyPair::random(SignerType::Starknet);
        let state = AccountState::new(owner.signer(), Some(guardian.signer()));
        let hash = Felt::from(77u64);

        let both = ArgentSigner::new(owner.clone(), Some(guardian.clone())).sign_raw(&hash).unwrap();
        let swapped = ArgentSigner::new(guardian, Some(owner.clone())).sign_raw(&hash).unwrap();
        let owner_only = ArgentSigner::new(owner, None).sign_raw(&hash).unwrap();

        assert!(state.check_multisig(&hash, &both));
        assert!(!state.check_multisig(&Felt::from(78u64), &both));
        assert!(!state.check_multisig(&hash, &swapped));
        assert!(!state.check_multisig(&hash, &owner_only));
        assert!(!state.check_multisig(&hash, &[]));
    }

    #[test]
    fn foreign_signature_is_not_a_session_token() {
        let state = AccountState::new(KeyPair::random(SignerType::Starknet).signer(), None);
        let err = state
            .validate_session(Felt::ONE, Felt::TWO, 0, &[], Felt::ZERO, &[Felt::ONE, Felt::TWO])
            .unwrap_err();
        assert_eq!(err, Revert::new("session/invalid-token"));
    }
}

//! Native Stark-curve key pairs.

use std::fmt;

use rand::rngs::OsRng;
use rand::RngCore;
use starknet_crypto::{get_public_key, rfc6979_generate_k, sign, verify};
use starknet_types_core::felt::Felt;

use super::normalize::{is_low_s, normalize_s, Curve, Normalization, STARK_ORDER};
use super::{Signer, SignerError, StarknetSignature};
use crate::encoding::Uint256;

/// A Stark-curve private key and its public key.
#[derive(Clone, PartialEq, Eq)]
pub struct StarknetKeyPair {
    private_key: Felt,
    public_key: Felt,
}

impl StarknetKeyPair {
    /// Generate a fresh key from 248 random bits, always below the curve order.
    pub fn random() -> Self {
        loop {
            let mut bytes = [0u8; 31];
            OsRng.fill_bytes(&mut bytes);
            let private_key = Felt::from_bytes_be_slice(&bytes);
            if private_key != Felt::ZERO {
                return Self { private_key, public_key: get_public_key(&private_key) };
            }
        }
    }

    pub fn from_private_key(private_key: Felt) -> Result<Self, SignerError> {
        if private_key == Felt::ZERO {
            return Err(SignerError::InvalidPrivateKey("zero".into()));
        }
        if Uint256::from_felt(&private_key).to_u256() >= STARK_ORDER {
            return Err(SignerError::InvalidPrivateKey("not below the curve order".into()));
        }
        Ok(Self { private_key, public_key: get_public_key(&private_key) })
    }

    pub fn public_key(&self) -> Felt {
        self.public_key
    }

    pub fn signer(&self) -> Signer {
        Signer::Starknet { pubkey: self.public_key }
    }

    pub fn guid(&self) -> Felt {
        self.signer().guid()
    }

    /// Deterministic (RFC 6979) signature over `hash`.
    /// The result is always in low-S form.
    pub fn sign(&self, hash: &Felt) -> Result<StarknetSignature, SignerError> {
        let k = rfc6979_generate_k(hash, &self.private_key, None);
        let signature = sign(&self.private_key, hash, &k)
            .map_err(|e| SignerError::Signing(format!("{e:?}")))?;
        let (s, _) = normalize_s(Curve::Stark, Uint256::from_felt(&signature.s).to_u256(), false);
        Ok(StarknetSignature { r: signature.r, s: Felt::from_bytes_be(&s.to_be_bytes::<32>()) })
    }
}

impl fmt::Debug for StarknetKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StarknetKeyPair")
            .field("public_key", &self.public_key.to_hex_string())
            .finish_non_exhaustive()
    }
}

/// Check a Stark signature; a canonical verifier also demands low S.
pub fn verify_starknet(
    pubkey: &Felt,
    hash: &Felt,
    signature: &StarknetSignature,
    mode: Normalization,
) -> bool {
    if mode.is_canonical() && !is_low_s(Curve::Stark, Uint256::from_felt(&signature.s).to_u256()) {
        return false;
    }
    verify(pubkey, hash, &signature.r, &signature.s).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash() -> Felt {
        Felt::from_hex("0x2d6479c0758efbb5aa07d35ed5454d728637fceab7ba544d3ea95403a5630a8").unwrap()
    }

    #[test]
    fn signing_is_deterministic_and_verifies() {
        let key = StarknetKeyPair::random();
        let first = key.sign(&hash()).unwrap();
        let second = key.sign(&hash()).unwrap();
        assert_eq!(first, second);
        assert!(verify_starknet(&key.public_key(), &hash(), &first, Normalization::Canonical));
    }

    #[test]
    fn signature_has_low_s() {
        for _ in 0..8 {
            let key = StarknetKeyPair::random();
            let sig = key.sign(&hash()).unwrap();
            assert!(is_low_s(Curve::Stark, Uint256::from_felt(&sig.s).to_u256()));
        }
    }

    #[test]
    fn wrong_key_does_not_verify() {
        let key = StarknetKeyPair::random();
        let other = StarknetKeyPair::random();
        let sig = key.sign(&hash()).unwrap();
        assert!(!verify_starknet(&other.public_key(), &hash(), &sig, Normalization::Raw));
    }

    #[test]
    fn zero_private_key_is_rejected() {
        assert!(matches!(
            StarknetKeyPair::from_private_key(Felt::ZERO),
            Err(SignerError::InvalidPrivateKey(_))
        ));
    }

    #[test]
    fn debug_output_hides_private_key() {
        let key = StarknetKeyPair::from_private_key(Felt::from(0xdeadu64)).unwrap();
        let rendered = format!("{key:?}");
        assert!(!rendered.contains("dead"));
        assert!(rendered.contains("public_key"));
    }
}

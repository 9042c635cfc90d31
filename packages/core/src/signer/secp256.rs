//! secp256k1, EIP-191 and secp256r1 key pairs.
//!
//! All three sign a 32-byte big-endian prehash with RFC 6979 nonces and
//! report the parity of the nonce point so verifiers can recover the key.
//!
//! | Scheme | Identifier | Prehash |
//! |--------|------------|---------|
//! | secp256k1 | Ethereum address | message hash |
//! | EIP-191 | Ethereum address | `keccak("\x19Ethereum Signed Message:\n32" ‖ hash)` |
//! | secp256r1 | x-coordinate of the public key | message hash |

use std::fmt;

use alloy_primitives::{eip191_hash_message, keccak256, U256};
use k256::ecdsa::RecoveryId;
use rand::rngs::OsRng;
use starknet_types_core::felt::Felt;

use super::normalize::{is_low_s, normalize_s, Curve, Normalization};
use super::{Secp256Signature, Signer, SignerError};
use crate::encoding::Uint256;

// ---------------------------------------------------------------------------
// Prehashes and shared signing
// ---------------------------------------------------------------------------

/// Prehash for the secp256k1 and secp256r1 schemes: the hash itself,
/// left-padded to 32 bytes.
pub fn prehash(hash: &Felt) -> [u8; 32] {
    hash.to_bytes_be()
}

/// EIP-191 personal-message digest of the padded hash.
pub fn eip191_prehash(hash: &Felt) -> [u8; 32] {
    eip191_hash_message(hash.to_bytes_be()).0
}

/// Split a fixed-width `r ‖ s` signature and bring it to low-S form.
fn split_signature(bytes: &[u8], y_parity: bool, curve: Curve) -> Secp256Signature {
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&bytes[..32]);
    s.copy_from_slice(&bytes[32..64]);
    let (s, y_parity) = normalize_s(curve, U256::from_be_bytes(s), y_parity);
    Secp256Signature {
        r: Uint256::from_be_bytes(r),
        s: Uint256::from(s),
        y_parity,
    }
}

fn sign_k1(
    key: &k256::ecdsa::SigningKey,
    prehash: &[u8; 32],
) -> Result<Secp256Signature, SignerError> {
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(prehash)
        .map_err(|e| SignerError::Signing(e.to_string()))?;
    Ok(split_signature(&signature.to_bytes(), recovery_id.is_y_odd(), Curve::Secp256k1))
}

pub(crate) fn sign_r1(
    key: &p256::ecdsa::SigningKey,
    prehash: &[u8; 32],
) -> Result<Secp256Signature, SignerError> {
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(prehash)
        .map_err(|e| SignerError::Signing(e.to_string()))?;
    Ok(split_signature(&signature.to_bytes(), recovery_id.is_y_odd(), Curve::Secp256r1))
}

/// Low-S form of `signature`, or `None` when a canonical verifier must
/// reject it.
fn verifier_form(signature: &Secp256Signature, curve: Curve, mode: Normalization) -> Option<Secp256Signature> {
    let s = signature.s.to_u256();
    if is_low_s(curve, s) {
        return Some(*signature);
    }
    if mode.is_canonical() {
        return None;
    }
    let (s, y_parity) = normalize_s(curve, s, signature.y_parity);
    Some(Secp256Signature { r: signature.r, s: Uint256::from(s), y_parity })
}

fn signature_bytes(signature: &Secp256Signature) -> [u8; 64] {
    let mut bytes = [0u8; 64];
    bytes[..32].copy_from_slice(&signature.r.to_be_bytes());
    bytes[32..].copy_from_slice(&signature.s.to_be_bytes());
    bytes
}

/// Recover the signing address of a secp256k1 prehash signature.
pub fn recover_eth_address(
    prehash: &[u8; 32],
    signature: &Secp256Signature,
    mode: Normalization,
) -> Option<Felt> {
    let signature = verifier_form(signature, Curve::Secp256k1, mode)?;
    let parsed = k256::ecdsa::Signature::from_slice(&signature_bytes(&signature)).ok()?;
    let recovery_id = RecoveryId::new(signature.y_parity, false);
    let key = k256::ecdsa::VerifyingKey::recover_from_prehash(prehash, &parsed, recovery_id).ok()?;
    Some(eth_address(&key))
}

/// Recover the x-coordinate of a secp256r1 prehash signature's key.
pub fn recover_r1_pubkey(
    prehash: &[u8; 32],
    signature: &Secp256Signature,
    mode: Normalization,
) -> Option<Uint256> {
    let signature = verifier_form(signature, Curve::Secp256r1, mode)?;
    let parsed = p256::ecdsa::Signature::from_slice(&signature_bytes(&signature)).ok()?;
    let recovery_id = RecoveryId::new(signature.y_parity, false);
    let key = p256::ecdsa::VerifyingKey::recover_from_prehash(prehash, &parsed, recovery_id).ok()?;
    Some(r1_x_coordinate(&key))
}

/// Ethereum address of a secp256k1 key, as a felt.
pub fn eth_address(key: &k256::ecdsa::VerifyingKey) -> Felt {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    Felt::from_bytes_be_slice(&hash[12..])
}

/// x-coordinate of a P-256 key; the compressed encoding minus its prefix.
pub fn r1_x_coordinate(key: &p256::ecdsa::VerifyingKey) -> Uint256 {
    let point = key.to_encoded_point(true);
    let mut x = [0u8; 32];
    x.copy_from_slice(&point.as_bytes()[1..33]);
    Uint256::from_be_bytes(x)
}

/// Whether `x` is the x-coordinate of some P-256 point.
pub fn is_r1_x_coordinate(x: &Uint256) -> bool {
    let mut compressed = [0u8; 33];
    compressed[0] = 0x02;
    compressed[1..].copy_from_slice(&x.to_be_bytes());
    p256::PublicKey::from_sec1_bytes(&compressed).is_ok()
}

// ---------------------------------------------------------------------------
// Key pairs
// ---------------------------------------------------------------------------

/// secp256k1 key identified by its Ethereum address.
#[derive(Clone)]
pub struct Secp256k1KeyPair {
    key: k256::ecdsa::SigningKey,
}

impl Secp256k1KeyPair {
    pub fn random() -> Self {
        Self { key: k256::ecdsa::SigningKey::random(&mut OsRng) }
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, SignerError> {
        let key = k256::ecdsa::SigningKey::from_slice(bytes)
            .map_err(|e| SignerError::InvalidPrivateKey(e.to_string()))?;
        Ok(Self { key })
    }

    pub fn address(&self) -> Felt {
        eth_address(self.key.verifying_key())
    }

    pub fn signer(&self) -> Signer {
        Signer::Secp256k1 { pubkey_hash: self.address() }
    }

    pub fn sign(&self, hash: &Felt) -> Result<Secp256Signature, SignerError> {
        sign_k1(&self.key, &prehash(hash))
    }
}

/// secp256k1 key signing EIP-191 personal messages.
#[derive(Clone)]
pub struct Eip191KeyPair {
    key: k256::ecdsa::SigningKey,
}

impl Eip191KeyPair {
    pub fn random() -> Self {
        Self { key: k256::ecdsa::SigningKey::random(&mut OsRng) }
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, SignerError> {
        let key = k256::ecdsa::SigningKey::from_slice(bytes)
            .map_err(|e| SignerError::InvalidPrivateKey(e.to_string()))?;
        Ok(Self { key })
    }

    pub fn address(&self) -> Felt {
        eth_address(self.key.verifying_key())
    }

    pub fn signer(&self) -> Signer {
        Signer::Eip191 { eth_address: self.address() }
    }

    pub fn sign(&self, hash: &Felt) -> Result<Secp256Signature, SignerError> {
        sign_k1(&self.key, &eip191_prehash(hash))
    }
}

/// P-256 key identified by its x-coordinate.
#[derive(Clone)]
pub struct Secp256r1KeyPair {
    key: p256::ecdsa::SigningKey,
}

impl Secp256r1KeyPair {
    pub fn random() -> Self {
        Self { key: p256::ecdsa::SigningKey::random(&mut OsRng) }
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, SignerError> {
        let key = p256::ecdsa::SigningKey::from_slice(bytes)
            .map_err(|e| SignerError::InvalidPrivateKey(e.to_string()))?;
        Ok(Self { key })
    }

    pub fn public_key(&self) -> Uint256 {
        r1_x_coordinate(self.key.verifying_key())
    }

    pub fn signer(&self) -> Signer {
        Signer::Secp256r1 { pubkey: self.public_key() }
    }

    pub fn sign(&self, hash: &Felt) -> Result<Secp256Signature, SignerError> {
        sign_r1(&self.key, &prehash(hash))
    }
}

macro_rules! redacted_debug {
    ($ty:ty, $field:literal, $accessor:ident) => {
        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($ty))
                    .field($field, &self.$accessor())
                    .finish_non_exhaustive()
            }
        }
    };
}

redacted_debug!(Secp256k1KeyPair, "address", address);
redacted_debug!(Eip191KeyPair, "address", address);
redacted_debug!(Secp256r1KeyPair, "public_key", public_key);

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Signer schemes: descriptors, GUIDs, signatures and signing capabilities.
//!
//! The scheme set is closed. Each variant maps 1:1 to a variant of the
//! on-chain `Signer` / `SignerSignature` enums:
//!
//! | Index | Scheme | Identifier | GUID preimage |
//! |-------|--------|------------|---------------|
//! | 0 | Starknet | public key | `poseidon("Starknet Signer", pubkey)` |
//! | 1 | Secp256k1 | Ethereum address | `poseidon("Secp256k1 Signer", address)` |
//! | 2 | Secp256r1 | public key x-coordinate | `poseidon("Secp256r1 Signer", x.low, x.high)` |
//! | 3 | Eip191 | Ethereum address | `poseidon("Eip191 Signer", address)` |
//! | 4 | Webauthn | origin, rp id hash, x-coordinate | `poseidon("Webauthn Signer", origin…, rp_id_hash, x)` |

pub mod normalize;
pub mod secp256;
pub mod starknet;
pub mod webauthn;

use std::fmt;

use serde::{Deserialize, Serialize};
use starknet_crypto::{poseidon_hash, poseidon_hash_many};
use starknet_types_core::felt::Felt;
use thiserror::Error;

use crate::calldata::{CairoDeserialize, CairoSerialize, CalldataError, CalldataReader};
use crate::encoding::Uint256;

pub use normalize::{Curve, Normalization};
pub use secp256::{Eip191KeyPair, Secp256k1KeyPair, Secp256r1KeyPair};
pub use starknet::StarknetKeyPair;
pub use webauthn::{AssertionFormat, Sha256Implementation, WebauthnAssertion, WebauthnKeyPair, WebauthnSigner};

/// Errors raised while constructing signers or producing signatures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignerError {
    #[error("{0} signer identifier must be non-zero")]
    ZeroIdentifier(SignerType),
    #[error("invalid {signer_type} identifier: {reason}")]
    InvalidIdentifier { signer_type: SignerType, reason: String },
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),
    #[error("webauthn origin must not be empty")]
    EmptyOrigin,
    #[error("signing failed: {0}")]
    Signing(String),
}

// ---------------------------------------------------------------------------
// SignerType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignerType {
    Starknet,
    Secp256k1,
    Secp256r1,
    Eip191,
    Webauthn,
}

impl SignerType {
    /// Variant index in the on-chain enums.
    pub fn index(self) -> u64 {
        match self {
            SignerType::Starknet => 0,
            SignerType::Secp256k1 => 1,
            SignerType::Secp256r1 => 2,
            SignerType::Eip191 => 3,
            SignerType::Webauthn => 4,
        }
    }

    pub fn from_index(index: u64) -> Option<Self> {
        Some(match index {
            0 => SignerType::Starknet,
            1 => SignerType::Secp256k1,
            2 => SignerType::Secp256r1,
            3 => SignerType::Eip191,
            4 => SignerType::Webauthn,
            _ => return None,
        })
    }

    fn guid_label(self) -> Felt {
        let label = match self {
            SignerType::Starknet => "Starknet Signer",
            SignerType::Secp256k1 => "Secp256k1 Signer",
            SignerType::Secp256r1 => "Secp256r1 Signer",
            SignerType::Eip191 => "Eip191 Signer",
            SignerType::Webauthn => "Webauthn Signer",
        };
        Felt::from_bytes_be_slice(label.as_bytes())
    }

    fn read_index(reader: &mut CalldataReader<'_>, name: &'static str) -> Result<Self, CalldataError> {
        let index = u64::deserialize_from(reader)?;
        Self::from_index(index).ok_or(CalldataError::UnknownVariant { name, index })
    }
}

impl fmt::Display for SignerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignerType::Starknet => "starknet",
            SignerType::Secp256k1 => "secp256k1",
            SignerType::Secp256r1 => "secp256r1",
            SignerType::Eip191 => "eip191",
            SignerType::Webauthn => "webauthn",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Signature payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarknetSignature {
    pub r: Felt,
    pub s: Felt,
}

impl CairoSerialize for StarknetSignature {
    fn serialize_to(&self, out: &mut Vec<Felt>) {
        out.push(self.r);
        out.push(self.s);
    }
}

impl CairoDeserialize for StarknetSignature {
    fn deserialize_from(reader: &mut CalldataReader<'_>) -> Result<Self, CalldataError> {
        Ok(Self { r: reader.read()?, s: reader.read()? })
    }
}

/// `(r, s)` as `u256` halves plus the parity of the nonce point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secp256Signature {
    pub r: Uint256,
    pub s: Uint256,
    pub y_parity: bool,
}

impl CairoSerialize for Secp256Signature {
    fn serialize_to(&self, out: &mut Vec<Felt>) {
        self.r.serialize_to(out);
        self.s.serialize_to(out);
        self.y_parity.serialize_to(out);
    }
}

impl CairoDeserialize for Secp256Signature {
    fn deserialize_from(reader: &mut CalldataReader<'_>) -> Result<Self, CalldataError> {
        Ok(Self { r: reader.read()?, s: reader.read()?, y_parity: reader.read()? })
    }
}

// ---------------------------------------------------------------------------
// Signer descriptor
// ---------------------------------------------------------------------------

/// On-chain descriptor of a signer, without private material.
///
/// The checked constructors reject malformed identifiers, so anything built
/// through them can later sign or be verified without identity errors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signer {
    Starknet { pubkey: Felt },
    Secp256k1 { pubkey_hash: Felt },
    Secp256r1 { pubkey: Uint256 },
    Eip191 { eth_address: Felt },
    Webauthn(WebauthnSigner),
}

impl Signer {
    pub fn starknet(pubkey: Felt) -> Result<Self, SignerError> {
        if pubkey == Felt::ZERO {
            return Err(SignerError::ZeroIdentifier(SignerType::Starknet));
        }
        Ok(Signer::Starknet { pubkey })
    }

    pub fn secp256k1(address: Felt) -> Result<Self, SignerError> {
        check_eth_address(SignerType::Secp256k1, &address)?;
        Ok(Signer::Secp256k1 { pubkey_hash: address })
    }

    pub fn eip191(address: Felt) -> Result<Self, SignerError> {
        check_eth_address(SignerType::Eip191, &address)?;
        Ok(Signer::Eip191 { eth_address: address })
    }

    pub fn secp256r1(pubkey: Uint256) -> Result<Self, SignerError> {
        check_r1_pubkey(SignerType::Secp256r1, &pubkey)?;
        Ok(Signer::Secp256r1 { pubkey })
    }

    pub fn webauthn(origin: &str, rp_id_hash: Uint256, pubkey: Uint256) -> Result<Self, SignerError> {
        if origin.is_empty() {
            return Err(SignerError::EmptyOrigin);
        }
        if rp_id_hash.is_zero() {
            return Err(SignerError::InvalidIdentifier {
                signer_type: SignerType::Webauthn,
                reason: "rp id hash is zero".into(),
            });
        }
        check_r1_pubkey(SignerType::Webauthn, &pubkey)?;
        Ok(Signer::Webauthn(WebauthnSigner {
            origin: origin.as_bytes().to_vec(),
            rp_id_hash,
            pubkey,
        }))
    }

    pub fn signer_type(&self) -> SignerType {
        match self {
            Signer::Starknet { .. } => SignerType::Starknet,
            Signer::Secp256k1 { .. } => SignerType::Secp256k1,
            Signer::Secp256r1 { .. } => SignerType::Secp256r1,
            Signer::Eip191 { .. } => SignerType::Eip191,
            Signer::Webauthn(_) => SignerType::Webauthn,
        }
    }

    /// Stable identifier derived from the scheme and the canonical key
    /// identifier only.
    pub fn guid(&self) -> Felt {
        let label = self.signer_type().guid_label();
        match self {
            Signer::Starknet { pubkey } => poseidon_hash(label, *pubkey),
            Signer::Secp256k1 { pubkey_hash } => poseidon_hash(label, *pubkey_hash),
            Signer::Eip191 { eth_address } => poseidon_hash(label, *eth_address),
            Signer::Secp256r1 { pubkey } => {
                poseidon_hash_many(&[label, Felt::from(pubkey.low), Felt::from(pubkey.high)])
            }
            Signer::Webauthn(signer) => {
                let mut elements = Vec::with_capacity(signer.origin.len() + 6);
                elements.push(label);
                signer.origin.serialize_to(&mut elements);
                signer.rp_id_hash.serialize_to(&mut elements);
                signer.pubkey.serialize_to(&mut elements);
                poseidon_hash_many(&elements)
            }
        }
    }
}

fn check_eth_address(signer_type: SignerType, address: &Felt) -> Result<(), SignerError> {
    if *address == Felt::ZERO {
        return Err(SignerError::ZeroIdentifier(signer_type));
    }
    if address.to_bytes_be()[..12].iter().any(|b| *b != 0) {
        return Err(SignerError::InvalidIdentifier {
            signer_type,
            reason: "address does not fit in 160 bits".into(),
        });
    }
    Ok(())
}

fn check_r1_pubkey(signer_type: SignerType, pubkey: &Uint256) -> Result<(), SignerError> {
    if pubkey.is_zero() {
        return Err(SignerError::ZeroIdentifier(signer_type));
    }
    if !secp256::is_r1_x_coordinate(pubkey) {
        return Err(SignerError::InvalidIdentifier {
            signer_type,
            reason: "not the x-coordinate of a P-256 point".into(),
        });
    }
    Ok(())
}

impl CairoSerialize for Signer {
    fn serialize_to(&self, out: &mut Vec<Felt>) {
        out.push(Felt::from(self.signer_type().index()));
        match self {
            Signer::Starknet { pubkey } => pubkey.serialize_to(out),
            Signer::Secp256k1 { pubkey_hash } => pubkey_hash.serialize_to(out),
            Signer::Secp256r1 { pubkey } => pubkey.serialize_to(out),
            Signer::Eip191 { eth_address } => eth_address.serialize_to(out),
            Signer::Webauthn(signer) => signer.serialize_to(out),
        }
    }
}

impl CairoDeserialize for Signer {
    fn deserialize_from(reader: &mut CalldataReader<'_>) -> Result<Self, CalldataError> {
        Ok(match SignerType::read_index(reader, "Signer")? {
            SignerType::Starknet => Signer::Starknet { pubkey: reader.read()? },
            SignerType::Secp256k1 => Signer::Secp256k1 { pubkey_hash: reader.read()? },
            SignerType::Secp256r1 => Signer::Secp256r1 { pubkey: reader.read()? },
            SignerType::Eip191 => Signer::Eip191 { eth_address: reader.read()? },
            SignerType::Webauthn => Signer::Webauthn(reader.read()?),
        })
    }
}

// ---------------------------------------------------------------------------
// SignerSignature
// ---------------------------------------------------------------------------

/// A signature tagged with the signer that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignerSignature {
    Starknet { pubkey: Felt, signature: StarknetSignature },
    Secp256k1 { pubkey_hash: Felt, signature: Secp256Signature },
    Secp256r1 { pubkey: Uint256, signature: Secp256Signature },
    Eip191 { eth_address: Felt, signature: Secp256Signature },
    Webauthn { signer: WebauthnSigner, assertion: WebauthnAssertion },
}

impl SignerSignature {
    pub fn signer(&self) -> Signer {
        match self {
            SignerSignature::Starknet { pubkey, .. } => Signer::Starknet { pubkey: *pubkey },
            SignerSignature::Secp256k1 { pubkey_hash, .. } => Signer::Secp256k1 { pubkey_hash: *pubkey_hash },
            SignerSignature::Secp256r1 { pubkey, .. } => Signer::Secp256r1 { pubkey: *pubkey },
            SignerSignature::Eip191 { eth_address, .. } => Signer::Eip191 { eth_address: *eth_address },
            SignerSignature::Webauthn { signer, .. } => Signer::Webauthn(signer.clone()),
        }
    }

    pub fn signer_type(&self) -> SignerType {
        self.signer().signer_type()
    }

    /// Check the signature over `hash` against its embedded signer.
    pub fn verify(&self, hash: &Felt, mode: Normalization) -> bool {
        match self {
            SignerSignature::Starknet { pubkey, signature } => {
                starknet::verify_starknet(pubkey, hash, signature, mode)
            }
            SignerSignature::Secp256k1 { pubkey_hash, signature } => {
                secp256::recover_eth_address(&secp256::prehash(hash), signature, mode) == Some(*pubkey_hash)
            }
            SignerSignature::Eip191 { eth_address, signature } => {
                secp256::recover_eth_address(&secp256::eip191_prehash(hash), signature, mode)
                    == Some(*eth_address)
            }
            SignerSignature::Secp256r1 { pubkey, signature } => {
                secp256::recover_r1_pubkey(&secp256::prehash(hash), signature, mode) == Some(*pubkey)
            }
            SignerSignature::Webauthn { signer, assertion } => assertion.verify(signer, hash, mode),
        }
    }

    /// Read a signature whose WebAuthn payload, if any, uses `format`.
    pub fn read_with(reader: &mut CalldataReader<'_>, format: AssertionFormat) -> Result<Self, CalldataError> {
        Ok(match SignerType::read_index(reader, "SignerSignature")? {
            SignerType::Starknet => SignerSignature::Starknet { pubkey: reader.read()?, signature: reader.read()? },
            SignerType::Secp256k1 => {
                SignerSignature::Secp256k1 { pubkey_hash: reader.read()?, signature: reader.read()? }
            }
            SignerType::Secp256r1 => SignerSignature::Secp256r1 { pubkey: reader.read()?, signature: reader.read()? },
            SignerType::Eip191 => SignerSignature::Eip191 { eth_address: reader.read()?, signature: reader.read()? },
            SignerType::Webauthn => SignerSignature::Webauthn {
                signer: reader.read()?,
                assertion: WebauthnAssertion::read(reader, format)?,
            },
        })
    }
}

impl CairoSerialize for SignerSignature {
    fn serialize_to(&self, out: &mut Vec<Felt>) {
        out.push(Felt::from(self.signer_type().index()));
        match self {
            SignerSignature::Starknet { pubkey, signature } => {
                pubkey.serialize_to(out);
                signature.serialize_to(out);
            }
            SignerSignature::Secp256k1 { pubkey_hash, signature } => {
                pubkey_hash.serialize_to(out);
                signature.serialize_to(out);
            }
            SignerSignature::Secp256r1 { pubkey, signature } => {
                pubkey.serialize_to(out);
                signature.serialize_to(out);
            }
            SignerSignature::Eip191 { eth_address, signature } => {
                eth_address.serialize_to(out);
                signature.serialize_to(out);
            }
            SignerSignature::Webauthn { signer, assertion } => {
                signer.serialize_to(out);
                assertion.serialize_to(out);
            }
        }
    }
}

impl CairoDeserialize for SignerSignature {
    fn deserialize_from(reader: &mut CalldataReader<'_>) -> Result<Self, CalldataError> {
        Self::read_with(reader, AssertionFormat::JsonClientData)
    }
}

/// Parse a `[count, signature…]` multi-signer array.
pub fn parse_signatures(felts: &[Felt], format: AssertionFormat) -> Result<Vec<SignerSignature>, CalldataError> {
    let mut reader = CalldataReader::new(felts);
    let count = reader.next_len()?;
    let signatures = (0..count)
        .map(|_| SignerSignature::read_with(&mut reader, format))
        .collect::<Result<Vec<_>, _>>()?;
    reader.finish()?;
    Ok(signatures)
}

// ---------------------------------------------------------------------------
// Key pairs
// ---------------------------------------------------------------------------

/// A signing key of any supported scheme.
#[derive(Debug, Clone)]
pub enum KeyPair {
    Starknet(StarknetKeyPair),
    Secp256k1(Secp256k1KeyPair),
    Secp256r1(Secp256r1KeyPair),
    Eip191(Eip191KeyPair),
    Webauthn(WebauthnKeyPair),
}

impl KeyPair {
    pub fn random(signer_type: SignerType) -> Self {
        match signer_type {
            SignerType::Starknet => KeyPair::Starknet(StarknetKeyPair::random()),
            SignerType::Secp256k1 => KeyPair::Secp256k1(Secp256k1KeyPair::random()),
            SignerType::Secp256r1 => KeyPair::Secp256r1(Secp256r1KeyPair::random()),
            SignerType::Eip191 => KeyPair::Eip191(Eip191KeyPair::random()),
            SignerType::Webauthn => KeyPair::Webauthn(WebauthnKeyPair::random(AssertionFormat::default())),
        }
    }

    pub fn signer_type(&self) -> SignerType {
        match self {
            KeyPair::Starknet(_) => SignerType::Starknet,
            KeyPair::Secp256k1(_) => SignerType::Secp256k1,
            KeyPair::Secp256r1(_) => SignerType::Secp256r1,
            KeyPair::Eip191(_) => SignerType::Eip191,
            KeyPair::Webauthn(_) => SignerType::Webauthn,
        }
    }

    pub fn signer(&self) -> Signer {
        match self {
            KeyPair::Starknet(key) => key.signer(),
            KeyPair::Secp256k1(key) => key.signer(),
            KeyPair::Secp256r1(key) => key.signer(),
            KeyPair::Eip191(key) => key.signer(),
            KeyPair::Webauthn(key) => Signer::Webauthn(key.descriptor()),
        }
    }

    pub fn guid(&self) -> Felt {
        self.signer().guid()
    }

    pub fn sign(&self, hash: &Felt) -> Result<SignerSignature, SignerError> {
        Ok(match self {
            KeyPair::Starknet(key) => SignerSignature::Starknet {
                pubkey: key.public_key(),
                signature: key.sign(hash)?,
            },
            KeyPair::Secp256k1(key) => SignerSignature::Secp256k1 {
                pubkey_hash: key.address(),
                signature: key.sign(hash)?,
            },
            KeyPair::Secp256r1(key) => SignerSignature::Secp256r1 {
                pubkey: key.public_key(),
                signature: key.sign(hash)?,
            },
            KeyPair::Eip191(key) => SignerSignature::Eip191 {
                eth_address: key.address(),
                signature: key.sign(hash)?,
            },
            KeyPair::Webauthn(key) => SignerSignature::Webauthn {
                signer: key.descriptor(),
                assertion: key.sign(hash)?,
            },
        })
    }
}

impl From<StarknetKeyPair> for KeyPair {
    fn from(key: StarknetKeyPair) -> Self {
        KeyPair::Starknet(key)
    }
}

impl From<Secp256k1KeyPair> for KeyPair {
    fn from(key: Secp256k1KeyPair) -> Self {
        KeyPair::Secp256k1(key)
    }
}

impl From<Secp256r1KeyPair> for KeyPair {
    fn from(key: Secp256r1KeyPair) -> Self {
        KeyPair::Secp256r1(key)
    }
}

impl From<Eip191KeyPair> for KeyPair {
    fn from(key: Eip191KeyPair) -> Self {
        KeyPair::Eip191(key)
    }
}

impl From<WebauthnKeyPair> for KeyPair {
    fn from(key: WebauthnKeyPair) -> Self {
        KeyPair::Webauthn(key)
    }
}

// ---------------------------------------------------------------------------
// RawSigner
// ---------------------------------------------------------------------------

/// Anything that turns a message hash into a compiled signature.
///
/// Implemented by [`KeyPair`], by [`ArgentSigner`] and by any closure
/// `Fn(&Felt) -> Result<Vec<Felt>, SignerError>`, which covers signers
/// returning a fixed signature for fee estimation.
pub trait RawSigner: Send + Sync {
    fn sign_raw(&self, hash: &Felt) -> Result<Vec<Felt>, SignerError>;
}

impl RawSigner for KeyPair {
    fn sign_raw(&self, hash: &Felt) -> Result<Vec<Felt>, SignerError> {
        Ok(self.sign(hash)?.to_calldata())
    }
}

impl<F> RawSigner for F
where
    F: Fn(&Felt) -> Result<Vec<Felt>, SignerError> + Send + Sync,
{
    fn sign_raw(&self, hash: &Felt) -> Result<Vec<Felt>, SignerError> {
        self(hash)
    }
}

/// Owner plus optional guardian, signing as `[count, owner_sig, guardian_sig?]`.
#[derive(Debug, Clone)]
pub struct ArgentSigner {
    pub owner: KeyPair,
    pub guardian: Option<KeyPair>,
}

impl ArgentSigner {
    pub fn new(owner: KeyPair, guardian: Option<KeyPair>) -> Self {
        Self { owner, guardian }
    }

    pub fn signatures(&self, hash: &Felt) -> Result<Vec<SignerSignature>, SignerError> {
        std::iter::once(&self.owner)
            .chain(self.guardian.as_ref())
            .map(|key| key.sign(hash))
            .collect()
    }
}

impl RawSigner for ArgentSigner {
    fn sign_raw(&self, hash: &Felt) -> Result<Vec<Felt>, SignerError> {
        Ok(self.signatures(hash)?.to_calldata())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn hash() -> Felt {
        Felt::from_hex("0x1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcd").unwrap()
    }

    const ALL: [SignerType; 5] = [
        SignerType::Starknet,
        SignerType::Secp256k1,
        SignerType::Secp256r1,
        SignerType::Eip191,
        SignerType::Webauthn,
    ];

    #[test]
    fn every_scheme_signs_and_verifies() {
        for signer_type in ALL {
            let key = KeyPair::random(signer_type);
            let signature = key.sign(&hash()).unwrap();
            assert_eq!(signature.signer_type(), signer_type);
            assert_eq!(signature.signer(), key.signer());
            assert!(signature.verify(&hash(), Normalization::Canonical), "{signer_type}");
            assert!(!signature.verify(&Felt::from(3u64), Normalization::Raw), "{signer_type}");
        }
    }

    #[test]
    fn every_scheme_emits_low_s_and_verifies_in_both_modes() {
        use super::normalize::is_low_s;

        for signer_type in ALL {
            let key = KeyPair::random(signer_type);
            for i in 1..=24u64 {
                let message = poseidon_hash(hash(), Felt::from(i));
                let signature = key.sign(&message).unwrap();
                let low_s = match &signature {
                    SignerSignature::Starknet { signature, .. } => {
                        is_low_s(Curve::Stark, Uint256::from_felt(&signature.s).to_u256())
                    }
                    SignerSignature::Secp256k1 { signature, .. }
                    | SignerSignature::Eip191 { signature, .. } => {
                        is_low_s(Curve::Secp256k1, signature.s.to_u256())
                    }
                    SignerSignature::Secp256r1 { signature, .. } => {
                        is_low_s(Curve::Secp256r1, signature.s.to_u256())
                    }
                    SignerSignature::Webauthn { assertion, .. } => {
                        is_low_s(Curve::Secp256r1, assertion.ec_signature().s.to_u256())
                    }
                };
                assert!(low_s, "{signer_type} message {i}");
                assert!(signature.verify(&message, Normalization::Canonical), "{signer_type}");
                assert!(signature.verify(&message, Normalization::Raw), "{signer_type}");
            }
        }
    }

    #[test]
    fn guid_is_stable_and_distinct() {
        let keys: Vec<KeyPair> = ALL.iter().map(|t| KeyPair::random(*t)).collect();
        let guids: Vec<Felt> = keys.iter().map(KeyPair::guid).collect();
        for (key, guid) in keys.iter().zip(&guids) {
            assert_eq!(key.guid(), *guid);
        }
        for i in 0..guids.len() {
            for j in i + 1..guids.len() {
                assert_ne!(guids[i], guids[j]);
            }
        }
    }

    #[test]
    fn guid_survives_calldata_round_trip() {
        let key = KeyPair::random(SignerType::Webauthn);
        let calldata = key.signer().to_calldata();
        let mut reader = CalldataReader::new(&calldata);
        let decoded: Signer = reader.read().unwrap();
        assert_eq!(decoded.guid(), key.guid());
    }

    #[test]
    fn same_identifier_under_different_scheme_has_different_guid() {
        let address = Felt::from(0xabcdefu64);
        let k1 = Signer::secp256k1(address).unwrap();
        let eip = Signer::eip191(address).unwrap();
        assert_ne!(k1.guid(), eip.guid());
    }

    #[test]
    fn starknet_guid_matches_definition() {
        let key = StarknetKeyPair::random();
        let label = Felt::from_bytes_be_slice(b"Starknet Signer");
        assert_eq!(key.guid(), poseidon_hash(label, key.public_key()));
    }

    #[test]
    fn zero_identifiers_are_rejected_at_construction() {
        assert_eq!(Signer::starknet(Felt::ZERO), Err(SignerError::ZeroIdentifier(SignerType::Starknet)));
        assert_eq!(Signer::secp256k1(Felt::ZERO), Err(SignerError::ZeroIdentifier(SignerType::Secp256k1)));
        assert_eq!(
            Signer::secp256r1(Uint256::default()),
            Err(SignerError::ZeroIdentifier(SignerType::Secp256r1))
        );
    }

    #[test]
    fn oversized_eth_address_is_rejected() {
        let too_wide = Felt::from_bytes_be_slice(&[1u8; 21]);
        assert!(matches!(Signer::eip191(too_wide), Err(SignerError::InvalidIdentifier { .. })));
    }

    #[test]
    fn webauthn_descriptor_requires_origin() {
        let key = WebauthnKeyPair::random(AssertionFormat::JsonClientData);
        let descriptor = key.descriptor();
        assert_eq!(
            Signer::webauthn("", descriptor.rp_id_hash, descriptor.pubkey),
            Err(SignerError::EmptyOrigin)
        );
        let rebuilt = Signer::webauthn(WebauthnKeyPair::DEFAULT_ORIGIN, descriptor.rp_id_hash, descriptor.pubkey)
            .unwrap();
        assert_eq!(rebuilt.guid(), Signer::Webauthn(key.descriptor()).guid());
    }

    #[test]
    fn starknet_signature_calldata_layout() {
        let key = StarknetKeyPair::random();
        let signature = KeyPair::from(key.clone()).sign(&hash()).unwrap();
        let calldata = signature.to_calldata();
        assert_eq!(calldata.len(), 4);
        assert_eq!(calldata[0], Felt::ZERO);
        assert_eq!(calldata[1], key.public_key());
    }

    #[test]
    fn argent_signer_prefixes_count() {
        let signer = ArgentSigner::new(
            KeyPair::random(SignerType::Starknet),
            Some(KeyPair::random(SignerType::Secp256r1)),
        );
        let compiled = signer.sign_raw(&hash()).unwrap();
        assert_eq!(compiled[0], Felt::TWO);
        let parsed = parse_signatures(&compiled, AssertionFormat::JsonClientData).unwrap();
        assert_eq!(parsed.len(), 2);
        assert!(parsed.iter().all(|sig| sig.verify(&hash(), Normalization::Canonical)));
    }

    #[test]
    fn closures_are_raw_signers() {
        let fixed = |_: &Felt| -> Result<Vec<Felt>, SignerError> { Ok(vec![Felt::ONE, Felt::TWO]) };
        let signer: &dyn RawSigner = &fixed;
        assert_eq!(signer.sign_raw(&hash()).unwrap(), vec![Felt::ONE, Felt::TWO]);
    }

    #[test]
    fn unknown_variant_is_rejected() {
        let calldata = [Felt::from(9u64), Felt::ONE];
        let mut reader = CalldataReader::new(&calldata);
        assert!(matches!(
            reader.read::<Signer>(),
            Err(CalldataError::UnknownVariant { name: "Signer", index: 9 })
        ));
    }
}

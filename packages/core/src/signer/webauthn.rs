//! WebAuthn assertions synthesised from a P-256 key.
//!
//! The signed digest is `sha256(authenticator_data ‖ sha256(client_data_json))`
//! with `authenticator_data = sha256(rp_id) ‖ flags ‖ sign_count (4 bytes, BE)`.
//! Two challenge formats exist and they target different verifier
//! versions, so a key pair is bound to exactly one of them:
//!
//! | Format | Challenge | Sign count | Extra payload |
//! |--------|-----------|------------|---------------|
//! | [`AssertionFormat::JsonClientData`] | base64url of the 32-byte hash | 1 | none |
//! | [`AssertionFormat::NumericChallenge`] | decimal hash ‖ `0` ‖ sha256 implementation index | 0 | `cross_origin`, `sha256_implementation` |

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use starknet_types_core::felt::Felt;

use super::normalize::Normalization;
use super::secp256::{recover_r1_pubkey, sign_r1};
use super::{Secp256Signature, SignerError};
use crate::calldata::{CairoDeserialize, CairoSerialize, CalldataError, CalldataReader};
use crate::encoding::Uint256;

/// "User present" and "user verified".
pub const FLAGS_PRESENT_AND_VERIFIED: u8 = 0b0000_0101;

const JSON_OUTRO: &str = r#","crossOrigin":false}"#;

/// Which client-data layout the target verifier expects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssertionFormat {
    #[default]
    JsonClientData,
    NumericChallenge,
}

/// SHA-256 implementation the verifier should run, embedded in numeric
/// challenges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sha256Implementation {
    Cairo0,
    Cairo1,
    #[default]
    Syscall,
}

impl Sha256Implementation {
    pub fn index(self) -> u8 {
        match self {
            Sha256Implementation::Cairo0 => 0,
            Sha256Implementation::Cairo1 => 1,
            Sha256Implementation::Syscall => 2,
        }
    }
}

impl CairoSerialize for Sha256Implementation {
    fn serialize_to(&self, out: &mut Vec<Felt>) {
        out.push(Felt::from(self.index()));
    }
}

impl CairoDeserialize for Sha256Implementation {
    fn deserialize_from(reader: &mut CalldataReader<'_>) -> Result<Self, CalldataError> {
        match u64::deserialize_from(reader)? {
            0 => Ok(Sha256Implementation::Cairo0),
            1 => Ok(Sha256Implementation::Cairo1),
            2 => Ok(Sha256Implementation::Syscall),
            index => Err(CalldataError::UnknownVariant { name: "Sha256Implementation", index }),
        }
    }
}

/// On-chain description of a WebAuthn credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WebauthnSigner {
    /// Origin bytes, one felt per byte on the wire.
    pub origin: Vec<u8>,
    pub rp_id_hash: Uint256,
    /// x-coordinate of the P-256 public key.
    pub pubkey: Uint256,
}

impl CairoSerialize for WebauthnSigner {
    fn serialize_to(&self, out: &mut Vec<Felt>) {
        self.origin.serialize_to(out);
        self.rp_id_hash.serialize_to(out);
        self.pubkey.serialize_to(out);
    }
}

impl CairoDeserialize for WebauthnSigner {
    fn deserialize_from(reader: &mut CalldataReader<'_>) -> Result<Self, CalldataError> {
        Ok(Self {
            origin: reader.read()?,
            rp_id_hash: reader.read()?,
            pubkey: reader.read()?,
        })
    }
}

/// The authenticator-side half of a WebAuthn signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WebauthnAssertion {
    JsonClientData {
        client_data_json_outro: Vec<u8>,
        flags: u8,
        sign_count: u32,
        ec_signature: Secp256Signature,
    },
    NumericChallenge {
        cross_origin: bool,
        client_data_json_outro: Vec<u8>,
        flags: u8,
        sign_count: u32,
        ec_signature: Secp256Signature,
        sha256_implementation: Sha256Implementation,
    },
}

impl WebauthnAssertion {
    pub fn format(&self) -> AssertionFormat {
        match self {
            WebauthnAssertion::JsonClientData { .. } => AssertionFormat::JsonClientData,
            WebauthnAssertion::NumericChallenge { .. } => AssertionFormat::NumericChallenge,
        }
    }

    pub fn ec_signature(&self) -> &Secp256Signature {
        match self {
            WebauthnAssertion::JsonClientData { ec_signature, .. }
            | WebauthnAssertion::NumericChallenge { ec_signature, .. } => ec_signature,
        }
    }

    /// Read an assertion laid out for the given verifier format.
    pub fn read(reader: &mut CalldataReader<'_>, format: AssertionFormat) -> Result<Self, CalldataError> {
        Ok(match format {
            AssertionFormat::JsonClientData => WebauthnAssertion::JsonClientData {
                client_data_json_outro: reader.read()?,
                flags: reader.read()?,
                sign_count: reader.read()?,
                ec_signature: reader.read()?,
            },
            AssertionFormat::NumericChallenge => WebauthnAssertion::NumericChallenge {
                cross_origin: reader.read()?,
                client_data_json_outro: reader.read()?,
                flags: reader.read()?,
                sign_count: reader.read()?,
                ec_signature: reader.read()?,
                sha256_implementation: reader.read()?,
            },
        })
    }

    /// The P-256 digest this assertion signs for `hash` under `signer`.
    pub fn signed_digest(&self, signer: &WebauthnSigner, hash: &Felt) -> [u8; 32] {
        let origin = String::from_utf8_lossy(&signer.origin);
        let (client_data, flags, sign_count) = match self {
            WebauthnAssertion::JsonClientData { client_data_json_outro, flags, sign_count, .. } => {
                let json = client_data_json(&base64_challenge(hash), &origin, None);
                (apply_outro(json, client_data_json_outro), *flags, *sign_count)
            }
            WebauthnAssertion::NumericChallenge {
                cross_origin,
                client_data_json_outro,
                flags,
                sign_count,
                sha256_implementation,
                ..
            } => {
                let challenge = numeric_challenge(hash, *sha256_implementation);
                let json = client_data_json(&challenge, &origin, Some(*cross_origin));
                (apply_outro(json, client_data_json_outro), *flags, *sign_count)
            }
        };
        let authenticator_data = authenticator_data(&signer.rp_id_hash.to_be_bytes(), flags, sign_count);
        let client_data_hash = Sha256::digest(client_data.as_bytes());
        let mut hasher = Sha256::new();
        hasher.update(&authenticator_data);
        hasher.update(client_data_hash);
        hasher.finalize().into()
    }

    /// Verify against the credential; the EC signature must recover the
    /// credential's x-coordinate.
    pub fn verify(&self, signer: &WebauthnSigner, hash: &Felt, mode: Normalization) -> bool {
        let digest = self.signed_digest(signer, hash);
        recover_r1_pubkey(&digest, self.ec_signature(), mode) == Some(signer.pubkey)
    }
}

impl CairoSerialize for WebauthnAssertion {
    fn serialize_to(&self, out: &mut Vec<Felt>) {
        match self {
            WebauthnAssertion::JsonClientData { client_data_json_outro, flags, sign_count, ec_signature } => {
                client_data_json_outro.serialize_to(out);
                flags.serialize_to(out);
                sign_count.serialize_to(out);
                ec_signature.serialize_to(out);
            }
            WebauthnAssertion::NumericChallenge {
                cross_origin,
                client_data_json_outro,
                flags,
                sign_count,
                ec_signature,
                sha256_implementation,
            } => {
                cross_origin.serialize_to(out);
                client_data_json_outro.serialize_to(out);
                flags.serialize_to(out);
                sign_count.serialize_to(out);
                ec_signature.serialize_to(out);
                sha256_implementation.serialize_to(out);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Client data helpers
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ClientData<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    challenge: &'a str,
    origin: &'a str,
    #[serde(rename = "crossOrigin", skip_serializing_if = "Option::is_none")]
    cross_origin: Option<bool>,
}

fn client_data_json(challenge: &str, origin: &str, cross_origin: Option<bool>) -> String {
    let data = ClientData { kind: "webauthn.get", challenge, origin, cross_origin };
    // Serialising a struct of strings and a bool cannot fail.
    serde_json::to_string(&data).unwrap_or_default()
}

/// Replace the closing brace with `outro` when one is given.
fn apply_outro(mut json: String, outro: &[u8]) -> String {
    if outro.is_empty() {
        return json;
    }
    if json.ends_with('}') {
        json.pop();
    }
    json.push_str(&String::from_utf8_lossy(outro));
    json
}

fn base64_challenge(hash: &Felt) -> String {
    URL_SAFE_NO_PAD.encode(hash.to_bytes_be())
}

fn numeric_challenge(hash: &Felt, implementation: Sha256Implementation) -> String {
    format!("{}0{}", Uint256::from_felt(hash).to_u256(), implementation.index())
}

fn authenticator_data(rp_id_hash: &[u8; 32], flags: u8, sign_count: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity(37);
    data.extend_from_slice(rp_id_hash);
    data.push(flags);
    data.extend_from_slice(&sign_count.to_be_bytes());
    data
}

// ---------------------------------------------------------------------------
// Key pair
// ---------------------------------------------------------------------------

/// A P-256 credential that produces assertions in one fixed format.
#[derive(Clone)]
pub struct WebauthnKeyPair {
    key: p256::ecdsa::SigningKey,
    rp_id: String,
    origin: String,
    format: AssertionFormat,
    sha256_implementation: Sha256Implementation,
}

impl WebauthnKeyPair {
    pub const DEFAULT_RP_ID: &'static str = "localhost";
    pub const DEFAULT_ORIGIN: &'static str = "http://localhost:5173";

    pub fn random(format: AssertionFormat) -> Self {
        Self {
            key: p256::ecdsa::SigningKey::random(&mut OsRng),
            rp_id: Self::DEFAULT_RP_ID.into(),
            origin: Self::DEFAULT_ORIGIN.into(),
            format,
            sha256_implementation: Sha256Implementation::default(),
        }
    }

    pub fn from_bytes(
        bytes: &[u8; 32],
        rp_id: impl Into<String>,
        origin: impl Into<String>,
        format: AssertionFormat,
    ) -> Result<Self, SignerError> {
        let key = p256::ecdsa::SigningKey::from_slice(bytes)
            .map_err(|e| SignerError::InvalidPrivateKey(e.to_string()))?;
        let origin = origin.into();
        if origin.is_empty() {
            return Err(SignerError::EmptyOrigin);
        }
        Ok(Self {
            key,
            rp_id: rp_id.into(),
            origin,
            format,
            sha256_implementation: Sha256Implementation::default(),
        })
    }

    /// Numeric challenges only: pick the verifier's SHA-256 implementation.
    pub fn with_sha256_implementation(mut self, implementation: Sha256Implementation) -> Self {
        self.sha256_implementation = implementation;
        self
    }

    pub fn format(&self) -> AssertionFormat {
        self.format
    }

    pub fn descriptor(&self) -> WebauthnSigner {
        let rp_id_hash: [u8; 32] = Sha256::digest(self.rp_id.as_bytes()).into();
        WebauthnSigner {
            origin: self.origin.as_bytes().to_vec(),
            rp_id_hash: Uint256::from_be_bytes(rp_id_hash),
            pubkey: super::secp256::r1_x_coordinate(self.key.verifying_key()),
        }
    }

    pub fn sign(&self, hash: &Felt) -> Result<WebauthnAssertion, SignerError> {
        let signer = self.descriptor();
        // Build the assertion with a placeholder signature, derive the digest
        // it commits to, then sign that digest.
        let placeholder = Secp256Signature::default();
        let mut assertion = match self.format {
            AssertionFormat::JsonClientData => WebauthnAssertion::JsonClientData {
                client_data_json_outro: JSON_OUTRO.as_bytes().to_vec(),
                flags: FLAGS_PRESENT_AND_VERIFIED,
                sign_count: 1,
                ec_signature: placeholder,
            },
            AssertionFormat::NumericChallenge => WebauthnAssertion::NumericChallenge {
                cross_origin: false,
                client_data_json_outro: Vec::new(),
                flags: FLAGS_PRESENT_AND_VERIFIED,
                sign_count: 0,
                ec_signature: placeholder,
                sha256_implementation: self.sha256_implementation,
            },
        };
        let digest = assertion.signed_digest(&signer, hash);
        let signature = sign_r1(&self.key, &digest)?;
        match &mut assertion {
            WebauthnAssertion::JsonClientData { ec_signature, .. }
            | WebauthnAssertion::NumericChallenge { ec_signature, .. } => *ec_signature = signature,
        }
        Ok(assertion)
    }
}

impl fmt::Debug for WebauthnKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebauthnKeyPair")
            .field("rp_id", &self.rp_id)
            .field("origin", &self.origin)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

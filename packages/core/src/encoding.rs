//! Felt-level encodings shared by every wire format in the crate.
//!
//! | Encoding | Shape |
//! |----------|-------|
//! | short string | up to 31 ASCII bytes packed big-endian into one felt |
//! | [`Uint256`] | two felts, `(low, high)` 128-bit limbs |
//! | [`ByteArray`] | 31-byte words, then a pending word and its length |
//! | selector | `starknet_keccak(name)`, keccak-256 masked to 250 bits |

use alloy_primitives::{keccak256, U256};
use serde::{Deserialize, Serialize};
use starknet_crypto::poseidon_hash_many;
use starknet_types_core::felt::Felt;
use thiserror::Error;

use crate::calldata::{CairoDeserialize, CairoSerialize, CalldataError, CalldataReader};

/// Maximum number of bytes a Cairo short string can hold.
pub const SHORT_STRING_MAX_LEN: usize = 31;

/// Errors raised while converting values into felts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("short string exceeds {SHORT_STRING_MAX_LEN} bytes: {0:?}")]
    ShortStringTooLong(String),
    #[error("short string must be ASCII: {0:?}")]
    NonAscii(String),
    #[error("value does not fit in {bits} bits: {value}")]
    Overflow { bits: u32, value: String },
    #[error("invalid numeric literal: {0:?}")]
    InvalidNumber(String),
}

/// Pack an ASCII string of at most 31 bytes into a felt.
pub fn short_string(s: &str) -> Result<Felt, EncodingError> {
    if !s.is_ascii() {
        return Err(EncodingError::NonAscii(s.into()));
    }
    if s.len() > SHORT_STRING_MAX_LEN {
        return Err(EncodingError::ShortStringTooLong(s.into()));
    }
    Ok(Felt::from_bytes_be_slice(s.as_bytes()))
}

/// Unpack a short string, dropping leading zero bytes.
///
/// Non-printable bytes are kept as-is; this is meant for logs and tests.
pub fn decode_short_string(felt: &Felt) -> String {
    let bytes = felt.to_bytes_be();
    bytes
        .iter()
        .skip_while(|b| **b == 0)
        .map(|b| *b as char)
        .collect()
}

/// Keccak-256 truncated to the 250 low bits, as Starknet uses for selectors
/// and SNIP-12 type hashes.
pub fn starknet_keccak(data: &[u8]) -> Felt {
    let mut hash = keccak256(data).0;
    hash[0] &= 0x03;
    Felt::from_bytes_be(&hash)
}

/// Entry-point selector for a function name.
pub fn selector(name: &str) -> Felt {
    starknet_keccak(name.as_bytes())
}

/// Parse a decimal or `0x`-prefixed hexadecimal literal into a felt.
pub fn parse_felt(literal: &str) -> Result<Felt, EncodingError> {
    let trimmed = literal.trim();
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(EncodingError::InvalidNumber(literal.into()));
        }
        return Felt::from_hex(trimmed).map_err(|_| EncodingError::InvalidNumber(literal.into()));
    }
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(EncodingError::InvalidNumber(literal.into()));
    }
    Felt::from_dec_str(trimmed).map_err(|_| EncodingError::InvalidNumber(literal.into()))
}

/// Interpret a felt as a `u64`, failing when the high bytes are set.
pub fn felt_to_u64(felt: &Felt) -> Result<u64, EncodingError> {
    let bytes = felt.to_bytes_be();
    if bytes[..24].iter().any(|b| *b != 0) {
        return Err(EncodingError::Overflow { bits: 64, value: felt.to_hex_string() });
    }
    let mut out = [0u8; 8];
    out.copy_from_slice(&bytes[24..]);
    Ok(u64::from_be_bytes(out))
}

/// Interpret a felt as a `u128`, failing when the high bytes are set.
pub fn felt_to_u128(felt: &Felt) -> Result<u128, EncodingError> {
    let bytes = felt.to_bytes_be();
    if bytes[..16].iter().any(|b| *b != 0) {
        return Err(EncodingError::Overflow { bits: 128, value: felt.to_hex_string() });
    }
    let mut out = [0u8; 16];
    out.copy_from_slice(&bytes[16..]);
    Ok(u128::from_be_bytes(out))
}

// ---------------------------------------------------------------------------
// Uint256
// ---------------------------------------------------------------------------

/// A Cairo `u256`: two 128-bit limbs serialised low first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Uint256 {
    pub low: u128,
    pub high: u128,
}

impl Uint256 {
    pub fn from_be_bytes(bytes: [u8; 32]) -> Self {
        let mut high = [0u8; 16];
        let mut low = [0u8; 16];
        high.copy_from_slice(&bytes[..16]);
        low.copy_from_slice(&bytes[16..]);
        Self { low: u128::from_be_bytes(low), high: u128::from_be_bytes(high) }
    }

    pub fn to_be_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out[..16].copy_from_slice(&self.high.to_be_bytes());
        out[16..].copy_from_slice(&self.low.to_be_bytes());
        out
    }

    /// Widen a felt; every felt fits in 252 bits.
    pub fn from_felt(felt: &Felt) -> Self {
        Self::from_be_bytes(felt.to_bytes_be())
    }

    pub fn is_zero(&self) -> bool {
        self.low == 0 && self.high == 0
    }

    pub fn to_u256(&self) -> U256 {
        U256::from_be_bytes(self.to_be_bytes())
    }
}

impl From<U256> for Uint256 {
    fn from(value: U256) -> Self {
        Self::from_be_bytes(value.to_be_bytes::<32>())
    }
}

impl From<Uint256> for U256 {
    fn from(value: Uint256) -> Self {
        value.to_u256()
    }
}

impl CairoSerialize for Uint256 {
    fn serialize_to(&self, out: &mut Vec<Felt>) {
        out.push(Felt::from(self.low));
        out.push(Felt::from(self.high));
    }
}

impl CairoDeserialize for Uint256 {
    fn deserialize_from(reader: &mut CalldataReader<'_>) -> Result<Self, CalldataError> {
        let low = u128::deserialize_from(reader)?;
        let high = u128::deserialize_from(reader)?;
        Ok(Self { low, high })
    }
}

// ---------------------------------------------------------------------------
// ByteArray
// ---------------------------------------------------------------------------

/// Cairo `ByteArray`: full 31-byte words plus a partially filled tail word.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteArray {
    pub data: Vec<Felt>,
    pub pending_word: Felt,
    pub pending_word_len: usize,
}

impl ByteArray {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut data = Vec::with_capacity(bytes.len() / SHORT_STRING_MAX_LEN);
        let mut chunks = bytes.chunks(SHORT_STRING_MAX_LEN).peekable();
        let mut pending_word = Felt::ZERO;
        let mut pending_word_len = 0;
        while let Some(chunk) = chunks.next() {
            let word = Felt::from_bytes_be_slice(chunk);
            if chunks.peek().is_none() && chunk.len() < SHORT_STRING_MAX_LEN {
                pending_word = word;
                pending_word_len = chunk.len();
            } else {
                data.push(word);
            }
        }
        Self { data, pending_word, pending_word_len }
    }

    /// Poseidon hash of the serialised array, as SNIP-12 revision 1 hashes
    /// `string` values.
    pub fn hash(&self) -> Felt {
        poseidon_hash_many(&self.to_calldata())
    }
}

impl From<&str> for ByteArray {
    fn from(value: &str) -> Self {
        Self::from_bytes(value.as_bytes())
    }
}

impl CairoSerialize for ByteArray {
    fn serialize_to(&self, out: &mut Vec<Felt>) {
        self.data.serialize_to(out);
        out.push(self.pending_word);
        out.push(Felt::from(self.pending_word_len));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

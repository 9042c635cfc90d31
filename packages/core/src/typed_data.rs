//! SNIP-12 typed-data hashing.
//!
//! Two revisions are supported and they are deliberately incompatible:
//!
//! | Revision | Hash | Domain type | Type encoding |
//! |----------|------|-------------|---------------|
//! | [`Revision::V0`] (legacy) | Pedersen chain + length | `StarkNetDomain(name:felt,version:felt,chainId:felt)` | bare names |
//! | [`Revision::V1`] (active) | Poseidon over all elements | `"StarknetDomain"(... "revision":"shortstring")` | quoted names |
//!
//! Message types in this crate encode their own struct hashes; this module
//! supplies the shared pieces: element hashing, type hashes, domain hashes
//! and the final message hash.

use serde::{Deserialize, Serialize};
use starknet_crypto::{pedersen_hash, poseidon_hash_many};
use starknet_types_core::felt::Felt;

use crate::encoding::{parse_felt, short_string, starknet_keccak, EncodingError};

pub const DOMAIN_TYPE_V0: &str = "StarkNetDomain(name:felt,version:felt,chainId:felt)";

pub const DOMAIN_TYPE_V1: &str = concat!(
    r#""StarknetDomain"("name":"shortstring","version":"shortstring","#,
    r#""chainId":"shortstring","revision":"shortstring")"#
);

const MESSAGE_PREFIX: &str = "StarkNet Message";

/// SNIP-12 revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Revision {
    /// Legacy revision: Pedersen hashing, explicit array lengths.
    V0,
    /// Active revision: Poseidon hashing, richer basic types.
    V1,
}

impl Revision {
    /// Hash a list of already-encoded elements the way this revision hashes
    /// structs and arrays.
    pub fn hash_elements(self, elements: &[Felt]) -> Felt {
        match self {
            Revision::V0 => pedersen_on_elements(elements),
            Revision::V1 => poseidon_hash_many(elements),
        }
    }

    pub fn as_felt(self) -> Felt {
        match self {
            Revision::V0 => Felt::ZERO,
            Revision::V1 => Felt::ONE,
        }
    }
}

/// `computeHashOnElements`: Pedersen fold from zero, closed by the length.
pub fn pedersen_on_elements(elements: &[Felt]) -> Felt {
    let folded = elements
        .iter()
        .fold(Felt::ZERO, |acc, element| pedersen_hash(&acc, element));
    pedersen_hash(&folded, &Felt::from(elements.len()))
}

/// Type hash of an already encoded type string.
pub fn type_hash(encoded_type: &str) -> Felt {
    starknet_keccak(encoded_type.as_bytes())
}

/// Encode a `felt`/`shortstring` field value the way wallets do: numeric
/// literals are taken as numbers, anything else is packed as a short string.
pub fn encode_literal(value: &str) -> Result<Felt, EncodingError> {
    parse_felt(value).or_else(|_| short_string(value))
}

// ---------------------------------------------------------------------------
// Domain
// ---------------------------------------------------------------------------

/// A typed-data domain separator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub name: Felt,
    pub version: Felt,
    pub chain_id: Felt,
    pub revision: Revision,
}

impl Domain {
    /// Build a domain from wallet-style literals.
    pub fn new(
        name: &str,
        version: &str,
        chain_id: Felt,
        revision: Revision,
    ) -> Result<Self, EncodingError> {
        Ok(Self {
            name: encode_literal(name)?,
            version: encode_literal(version)?,
            chain_id,
            revision,
        })
    }

    pub fn hash(&self) -> Felt {
        match self.revision {
            Revision::V0 => pedersen_on_elements(&[
                type_hash(DOMAIN_TYPE_V0),
                self.name,
                self.version,
                self.chain_id,
            ]),
            Revision::V1 => poseidon_hash_many(&[
                type_hash(DOMAIN_TYPE_V1),
                self.name,
                self.version,
                self.chain_id,
                self.revision.as_felt(),
            ]),
        }
    }

    /// Final message hash binding the domain, the signing account and the
    /// struct hash of the primary type.
    pub fn message_hash(&self, account: Felt, struct_hash: Felt) -> Felt {
        // Fixed ASCII literal, always fits a short string.
        let prefix = Felt::from_bytes_be_slice(MESSAGE_PREFIX.as_bytes());
        self.revision
            .hash_elements(&[prefix, self.hash(), account, struct_hash])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pedersen_on_elements_of_empty_list_hashes_zero_length() {
        assert_eq!(pedersen_on_elements(&[]), pedersen_hash(&Felt::ZERO, &Felt::ZERO));
    }

    #[test]
    fn literals_prefer_numbers_over_short_strings() {
        assert_eq!(encode_literal("1").unwrap(), Felt::ONE);
        assert_eq!(encode_literal("0x31").unwrap(), Felt::from(0x31u64));
        assert_eq!(encode_literal("ANY_CALLER").unwrap(), short_string("ANY_CALLER").unwrap());
    }

    #[test]
    fn domain_hash_differs_between_revisions() {
        let chain_id = short_string("SN_SEPOLIA").unwrap();
        let v0 = Domain::new("Account.execute_from_outside", "1", chain_id, Revision::V0).unwrap();
        let v1 = Domain::new("Account.execute_from_outside", "1", chain_id, Revision::V1).unwrap();
        assert_ne!(v0.hash(), v1.hash());
    }

    #[test]
    fn message_hash_binds_account() {
        let chain_id = short_string("SN_MAIN").unwrap();
        let domain = Domain::new("Example", "1", chain_id, Revision::V1).unwrap();
        let struct_hash = Felt::from(42u64);
        assert_ne!(
            domain.message_hash(Felt::ONE, struct_hash),
            domain.message_hash(Felt::TWO, struct_hash)
        );
    }

    #[test]
    fn domain_hash_depends_on_chain_id() {
        let a = Domain::new("Example", "1", short_string("SN_MAIN").unwrap(), Revision::V1).unwrap();
        let b = Domain::new("Example", "1", short_string("SN_SEPOLIA").unwrap(), Revision::V1).unwrap();
        assert_ne!(a.hash(), b.hash());
    }
}

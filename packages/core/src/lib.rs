//! Session-key delegation and multi-scheme signatures for Starknet accounts.
//!
//! This crate is the pure half of the protocol: it encodes, hashes, signs
//! and verifies, but never touches the network. Async services that talk to
//! a chain live in `starksession-dapp`.
//!
//! # Crate layout
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`encoding`] | Short strings, [`Uint256`], [`ByteArray`], selectors |
//! | [`calldata`] | Cairo calldata codec: [`CairoSerialize`], [`CalldataReader`] |
//! | [`typed_data`] | SNIP-12 domains and message hashes, both revisions |
//! | [`signer`] | Signer schemes, GUIDs, low-S normalization, [`RawSigner`] |
//! | [`merkle`] | Sorted-pair Poseidon Merkle tree |
//! | [`session`] | [`Session`], allow-lists and the session typed-data hash |
//! | [`token`] | [`SessionToken`] layout and the co-signer binding hash |
//! | [`outside`] | [`OutsideExecution`] envelopes |
//! | [`transaction`] | [`Call`], `__execute__` calldata, invoke v3 hashing |
//!
//! # Quick start
//!
//! ```rust,ignore
//! use starksession::{AllowedMethod, KeyPair, Session, SignerType};
//!
//! let session_key = KeyPair::random(SignerType::Starknet);
//! let session = Session::new(
//!     vec![AllowedMethod::new(dapp_address, "set_number")],
//!     now + 3600,
//!     session_key.guid(),
//!     starksession::session::DEFAULT_METADATA,
//!     now,
//! )?;
//!
//! // The owner approves this hash once, off-chain.
//! let session_hash = session.message_hash(chain_id, account_address);
//! ```

pub mod calldata;
pub mod encoding;
pub mod merkle;
pub mod outside;
pub mod session;
pub mod signer;
pub mod token;
pub mod transaction;
pub mod typed_data;

pub use calldata::{CairoDeserialize, CairoSerialize, CalldataError, CalldataReader};
pub use encoding::{selector, short_string, ByteArray, EncodingError, Uint256};
pub use merkle::{MerkleError, MerkleTree};
pub use outside::{OutsideExecution, ANY_CALLER};
pub use session::{AllowedMethod, OnChainSession, Session, SessionError};
pub use signer::{
    ArgentSigner, AssertionFormat, KeyPair, Normalization, RawSigner, Signer, SignerError, SignerSignature,
    SignerType, StarknetKeyPair,
};
pub use token::{binding_hash, BindingSource, SessionToken, TokenError};
pub use transaction::{Call, InvokeDetailsV3, InvokeTransactionV3, ResourceBoundsMapping};
pub use typed_data::{Domain, Revision};

/// Re-exported so dependents name the same felt type.
pub use starknet_types_core::felt::Felt;

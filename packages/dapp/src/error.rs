//! Error types for chain access and session services.
//!
//! Local failures ([`ServiceError::PolicyViolation`], ambiguous bindings,
//! unaligned proofs) are raised before anything is sent. Verifier rejections
//! arrive as [`ChainError::Reverted`] carrying the verifier's reason
//! unmodified; nothing here retries or reinterprets them.

use starksession::{CalldataError, SessionError, SignerError, TokenError};

/// Errors raised while talking to a chain.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// The HTTP request or response failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The node answered with a JSON-RPC error that is not a revert.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The verifier or a called contract rejected the transaction.
    #[error("reverted: {0}")]
    Reverted(String),

    /// The node answered with something this client cannot read.
    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("calldata error: {0}")]
    Calldata(#[from] CalldataError),
}

impl ChainError {
    /// The revert reason, when the chain rejected the transaction.
    pub fn revert_reason(&self) -> Option<&str> {
        match self {
            ChainError::Reverted(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Errors raised by the backend, owner and dapp services.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// A call is not covered by the session's allow-list.
    #[error("call to {contract}::{selector} is not allowed by the session")]
    PolicyViolation { contract: String, selector: String },

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl ServiceError {
    pub fn revert_reason(&self) -> Option<&str> {
        match self {
            ServiceError::Chain(e) => e.revert_reason(),
            _ => None,
        }
    }
}

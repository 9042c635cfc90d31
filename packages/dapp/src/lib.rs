//! Async session services for Starknet accounts.
//!
//! Three parties take part in a session: the account owner approves it once,
//! the backend co-signs every use with the account's guardian key, and the
//! dapp signs with the session key and compiles the final token. Each party
//! is a service here, and all of them share one [`ChainContext`].
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | [`DappConfig`] from environment variables |
//! | [`telemetry`] | `tracing` subscriber setup |
//! | [`error`] | [`ChainError`], [`ServiceError`] |
//! | [`chain`] | [`ChainClient`] trait, [`ChainContext`], receipts |
//! | [`rpc`] | [`JsonRpcClient`] over HTTP |
//! | [`owner`] | [`OwnerWallet`]: session approval |
//! | [`backend`] | [`BackendService`]: policy check and guardian co-signature |
//! | [`dapp`] | [`DappService`]: session requests, tokens, outside executions |
//! | [`account`] | [`Account`] and pluggable [`TransactionSigner`]s |

pub mod account;
pub mod backend;
pub mod chain;
pub mod config;
pub mod dapp;
pub mod error;
pub mod owner;
pub mod rpc;
pub mod telemetry;

pub use account::{Account, HashSigner, TransactionSigner};
pub use backend::BackendService;
pub use chain::{ChainClient, ChainContext, ExecutionStatus, Receipt};
pub use config::DappConfig;
pub use dapp::{DappService, SessionSigner};
pub use error::{ChainError, ServiceError};
pub use owner::OwnerWallet;
pub use rpc::JsonRpcClient;

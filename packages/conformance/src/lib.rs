//! In-process devnet for the session conformance suite.
//!
//! [`spawn_devnet`] binds a `TcpListener` on an ephemeral port and serves a
//! [`Devnet`] over JSON-RPC, so tests drive it through the same
//! `JsonRpcClient` a real deployment uses. The returned `Arc<Devnet>` gives
//! tests direct access to the chain for deployment, clock control and state
//! inspection.

pub mod devnet;
pub mod mock_dapp;
pub mod rpc;
pub mod verifier;

use std::sync::Arc;

pub use devnet::{AccountSetup, Devnet, DevnetError, GENESIS_TIME};
pub use verifier::{AccountState, Revert};

use starksession::Felt;

/// Chain id of every spawned devnet.
pub fn devnet_chain_id() -> Felt {
    Felt::from_bytes_be_slice(b"SN_SEPOLIA")
}

/// Start an ephemeral devnet and return `(rpc_url, devnet)`.
///
/// # Panics
///
/// Panics if the TCP listener cannot be bound.
pub async fn spawn_devnet() -> (String, Arc<Devnet>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("get local addr");
    let rpc_url = format!("http://{addr}/rpc");

    let devnet = Arc::new(Devnet::new(devnet_chain_id()));
    let router = rpc::build_router(Arc::clone(&devnet));

    tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("conformance devnet error");
    });

    (rpc_url, devnet)
}

//! Wallet-side owner approval of a session.

use starksession::{ArgentSigner, Felt, RawSigner, Session};
use tracing::info;

use crate::chain::ChainContext;
use crate::error::ServiceError;

/// The account owner's wallet: signs session typed data off-chain.
pub struct OwnerWallet {
    account: Felt,
    signer: ArgentSigner,
    chain: ChainContext,
}

impl OwnerWallet {
    pub fn new(account: Felt, signer: ArgentSigner, chain: ChainContext) -> Self {
        Self { account, signer, chain }
    }

    pub fn account(&self) -> Felt {
        self.account
    }

    pub fn owner_guid(&self) -> Felt {
        self.signer.owner.guid()
    }

    /// Sign the session's typed-data hash as `[count, owner_sig, guardian_sig?]`.
    pub async fn approve_session(&self, session: &Session) -> Result<Vec<Felt>, ServiceError> {
        let chain_id = self.chain.chain_id().await?;
        let session_hash = session.message_hash(chain_id, self.account);
        info!(
            "owner: approving session {} for {}",
            session_hash.to_hex_string(),
            self.account.to_hex_string()
        );
        Ok(self.signer.sign_raw(&session_hash)?)
    }
}

//! Primary (owner) signer capability of a smart account.

use alloy_primitives::{Address, B256, Signature};
use alloy_signer::Signer;
use async_trait::async_trait;

/// The primary (owner) side of a smart account.
///
/// Only needed to register a session; reconstructed sessions never touch it.
/// Implementations may be local keys, hardware wallets or a browser wallet
/// bridge that asks the user for approval.
#[async_trait]
pub trait AccountSigner: Send + Sync {
    /// Smart account the session acts for.
    fn account(&self) -> Address;

    /// ECDSA address of the owner key that validates for `account`.
    fn owner(&self) -> Address;

    /// Sign the session enable digest.
    /// Returns Err if the owner declines or signing fails.
    async fn sign_delegation(&self, digest: B256) -> Result<Signature, String>;

    /// EIP-191 personal message signature.
    async fn sign_message(&self, message: &[u8]) -> Result<Signature, String>;
}

/// Owner key held in-process, driving an account at a known address.
pub struct OwnerSigner<S> {
    account: Address,
    owner: S,
}

impl<S: Signer + Send + Sync> OwnerSigner<S> {
    pub fn new(account: Address, owner: S) -> Self {
        Self { account, owner }
    }
}

#[async_trait]
impl<S: Signer + Send + Sync> AccountSigner for OwnerSigner<S> {
    fn account(&self) -> Address {
        self.account
    }

    fn owner(&self) -> Address {
        self.owner.address()
    }

    async fn sign_delegation(&self, digest: B256) -> Result<Signature, String> {
        self.owner
            .sign_hash(&digest)
            .await
            .map_err(|e| e.to_string())
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Signature, String> {
        self.owner
            .sign_message(message)
            .await
            .map_err(|e| e.to_string())
    }
}

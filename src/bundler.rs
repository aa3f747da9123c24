//! Relay/bundler collaborator: the only network surface of the session flow.

use alloy_primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BundlerError;
use crate::user_op::{UserOperation, UserOperationReceipt};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasEstimate {
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GasFees {
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

/// Paymaster data and gas limits returned by a sponsor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sponsorship {
    pub paymaster_and_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
}

/// ERC-4337 bundler plus the chain reads and sponsorship it fronts.
#[async_trait]
pub trait Bundler: Send + Sync {
    async fn chain_id(&self) -> Result<u64, BundlerError>;

    /// Next nonce of `sender` on the default key.
    async fn nonce(&self, entry_point: Address, sender: Address) -> Result<U256, BundlerError>;

    async fn gas_fees(&self) -> Result<GasFees, BundlerError>;

    async fn estimate_gas(
        &self,
        op: &UserOperation,
        entry_point: Address,
    ) -> Result<GasEstimate, BundlerError>;

    /// Ask the sponsor identified by `sponsor_id` to pay for `op`.
    async fn sponsor(
        &self,
        op: &UserOperation,
        entry_point: Address,
        sponsor_id: &str,
    ) -> Result<Sponsorship, BundlerError>;

    /// Hand a signed operation to the mempool; returns the user-op hash.
    async fn send(&self, op: &UserOperation, entry_point: Address) -> Result<B256, BundlerError>;

    /// `None` while the operation is pending.
    async fn receipt(&self, hash: B256) -> Result<Option<UserOperationReceipt>, BundlerError>;
}

//! Session provider: binds a session key to an account and submits
//! operations under the delegation.

use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::SolValue;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::abi;
use crate::bundler::Bundler;
use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::confirmation::{self, ConfirmationOutcome};
use crate::error::{BundlerError, Result, SessionKeyError};
use crate::key;
use crate::permission;
use crate::rpc::JsonRpcBundler;
use crate::session::{PARAMS_VERSION, SessionGrant, SessionKeyData, SessionKeyParams};
use crate::signer::AccountSigner;
use crate::user_op::{CallRequest, UserOperation, UserOperationHandle};

/// Mode prefix telling the validator the signature carries its enable data.
pub const ENABLE_MODE: [u8; 4] = [0x00, 0x00, 0x00, 0x02];

/// Placeholder ECDSA signature used while estimating gas.
const DUMMY_ECDSA: [u8; 65] = {
    let mut sig = [0xff; 65];
    sig[64] = 0x1c;
    sig
};

/// Configuration and collaborators a provider runs against.
#[derive(Clone)]
pub struct ProviderContext {
    config: SessionConfig,
    bundler: Arc<dyn Bundler>,
    clock: Arc<dyn Clock>,
}

impl ProviderContext {
    pub fn new(config: SessionConfig, bundler: Arc<dyn Bundler>) -> Self {
        Self {
            config,
            bundler,
            clock: Arc::new(SystemClock),
        }
    }

    /// Context backed by a [`JsonRpcBundler`] at `config.bundler_url`.
    pub fn from_config(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let bundler = JsonRpcBundler::from_config(&config)
            .map_err(|e| SessionKeyError::Config(e.to_string()))?;
        Ok(Self::new(config, Arc::new(bundler)))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sponsor(mut self, sponsor_id: impl Into<String>) -> Self {
        self.config.sponsor_id = Some(sponsor_id.into());
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn bundler(&self) -> &dyn Bundler {
        self.bundler.as_ref()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn sponsor_id(&self) -> Option<&str> {
        self.config.sponsor_id.as_deref()
    }

    /// Bundler is reachable and serves the configured chain.
    async fn ensure_chain(&self, chain_id: u64) -> std::result::Result<(), String> {
        let served = self
            .bundler
            .chain_id()
            .await
            .map_err(|e| format!("bundler unreachable: {e}"))?;
        if served != chain_id {
            return Err(format!(
                "bundler serves chain {served}, session is for chain {chain_id}"
            ));
        }
        Ok(())
    }
}

/// An active session: immutable once built.
pub struct SessionKeyProvider {
    ctx: ProviderContext,
    signer: PrivateKeySigner,
    grant: SessionGrant,
}

impl fmt::Debug for SessionKeyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKeyProvider")
            .field("account", &self.grant.account)
            .field("session_key", &self.grant.session_key)
            .field("chain_id", &self.grant.chain_id)
            .finish_non_exhaustive()
    }
}

impl SessionKeyProvider {
    /// Register `session_key` for the primary signer's account.
    ///
    /// The primary signer signs the enable digest once; the resulting grant is
    /// carried in every operation the session sends.
    pub async fn init(
        ctx: ProviderContext,
        primary: &dyn AccountSigner,
        session_key: PrivateKeySigner,
        data: SessionKeyData,
    ) -> Result<Self> {
        data.validate()?;
        let config = ctx.config();
        ctx.ensure_chain(config.chain_id)
            .await
            .map_err(SessionKeyError::ProviderInit)?;

        let mut grant = SessionGrant {
            owner: primary.owner(),
            account: primary.account(),
            session_key: session_key.address(),
            chain_id: config.chain_id,
            entry_point: config.entry_point,
            validator: config.validator,
            session_key_data: data,
            enable_signature: Bytes::new(),
        };
        let signature = primary
            .sign_delegation(grant.enable_digest())
            .await
            .map_err(|e| {
                SessionKeyError::ProviderInit(format!("primary signer declined registration: {e}"))
            })?;
        grant.enable_signature = Bytes::copy_from_slice(&signature.as_bytes());
        grant.verify().map_err(SessionKeyError::ProviderInit)?;

        info!(
            account = %grant.account,
            session_key = %grant.session_key,
            permissions = grant.session_key_data.permissions.len(),
            valid_until = grant.session_key_data.valid_until,
            "Session key enabled"
        );
        Ok(Self {
            ctx,
            signer: session_key,
            grant,
        })
    }

    /// Serialize the session for storage or hand-off.
    ///
    /// The result is a bearer credential: whoever holds it can act as the session.
    pub fn serialize_session_key_params(&self, private_key: &B256) -> Result<String> {
        let signer = key::to_signer(private_key)?;
        if signer.address() != self.signer.address() {
            return Err(SessionKeyError::InvalidSessionKey(format!(
                "key for {} does not belong to session {}",
                signer.address(),
                self.signer.address()
            )));
        }
        SessionKeyParams {
            version: PARAMS_VERSION,
            session_private_key: *private_key,
            grant: self.grant.clone(),
        }
        .encode()
    }

    /// Parse a serialized session. No network access.
    pub fn deserialize_session_key_params(serialized: &str) -> Result<SessionKeyParams> {
        SessionKeyParams::decode(serialized)
    }

    /// Rebuild a provider from serialized params without the primary signer.
    pub async fn from_session_key_params(
        ctx: ProviderContext,
        params: SessionKeyParams,
    ) -> Result<Self> {
        params
            .grant
            .verify()
            .map_err(SessionKeyError::MalformedSessionData)?;
        let signer = key::to_signer(&params.session_private_key)
            .map_err(|e| SessionKeyError::MalformedSessionData(e.to_string()))?;
        if signer.address() != params.grant.session_key {
            return Err(SessionKeyError::MalformedSessionData(
                "private key does not match the granted session key".into(),
            ));
        }
        if params.grant.chain_id != ctx.config().chain_id {
            return Err(SessionKeyError::Reconstruction(format!(
                "session is for chain {}, context is configured for {}",
                params.grant.chain_id,
                ctx.config().chain_id
            )));
        }
        ctx.ensure_chain(params.grant.chain_id)
            .await
            .map_err(SessionKeyError::Reconstruction)?;

        info!(
            account = %params.grant.account,
            session_key = %params.grant.session_key,
            "Session key restored"
        );
        Ok(Self {
            ctx,
            signer,
            grant: params.grant,
        })
    }

    pub fn grant(&self) -> &SessionGrant {
        &self.grant
    }

    pub fn session_key_data(&self) -> &SessionKeyData {
        &self.grant.session_key_data
    }

    pub fn account(&self) -> Address {
        self.grant.account
    }

    pub fn session_key_address(&self) -> Address {
        self.signer.address()
    }

    /// Local pre-check: validity window, then permissions.
    ///
    /// Returns the index of the permission that allows `call`. Passing here is
    /// advisory; the validator on chain has the final say.
    pub fn authorize(&self, call: &CallRequest) -> Result<usize> {
        let data = self.session_key_data();
        data.check_window(self.ctx.clock().now())?;
        permission::find_allowing(&data.permissions, call)
    }

    /// Build, sign and submit a user operation for `call`.
    pub async fn send_user_operation(&self, call: CallRequest) -> Result<UserOperationHandle> {
        let index = self.authorize(&call)?;
        let constraint = self.session_key_data().paymaster;
        let sponsor_id = self.ctx.sponsor_id();
        if constraint.requires_sponsor() && sponsor_id.is_none() {
            return Err(SessionKeyError::SponsorRejected(
                "session requires a paymaster but no sponsor is configured".into(),
            ));
        }

        let bundler = self.ctx.bundler();
        let entry_point = self.grant.entry_point;
        let nonce = bundler
            .nonce(entry_point, self.grant.account)
            .await
            .map_err(submission)?;
        let fees = bundler.gas_fees().await.map_err(submission)?;

        let mut op = UserOperation {
            sender: self.grant.account,
            nonce,
            call_data: abi::kernel_execute(call.target, call.value, call.data.clone()),
            max_fee_per_gas: fees.max_fee_per_gas,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
            signature: self.operation_signature(index, &DUMMY_ECDSA)?,
            ..Default::default()
        };

        match sponsor_id {
            Some(sponsor_id) => {
                let sponsorship = bundler
                    .sponsor(&op, entry_point, sponsor_id)
                    .await
                    .map_err(|e| match e {
                        BundlerError::Rpc { .. } => SessionKeyError::SponsorRejected(e.to_string()),
                        other => submission(other),
                    })?;
                op.paymaster_and_data = sponsorship.paymaster_and_data;
                op.call_gas_limit = sponsorship.call_gas_limit;
                op.verification_gas_limit = sponsorship.verification_gas_limit;
                op.pre_verification_gas = sponsorship.pre_verification_gas;
            }
            None => {
                let estimate = bundler
                    .estimate_gas(&op, entry_point)
                    .await
                    .map_err(rejection)?;
                op.call_gas_limit = estimate.call_gas_limit;
                op.verification_gas_limit = estimate.verification_gas_limit;
                op.pre_verification_gas = estimate.pre_verification_gas;
            }
        }
        constraint
            .check(op.paymaster())
            .map_err(SessionKeyError::SponsorRejected)?;

        let op_hash = op.hash(entry_point, self.grant.chain_id);
        let session_sig = self
            .signer
            .sign_message_sync(op_hash.as_slice())
            .map_err(|e| SessionKeyError::Signing(e.to_string()))?;
        op.signature = self.operation_signature(index, &session_sig.as_bytes())?;

        debug!(nonce = %op.nonce, hash = %op_hash, "Submitting user operation");
        let hash = bundler.send(&op, entry_point).await.map_err(rejection)?;
        if hash != op_hash {
            warn!(
                expected = %op_hash,
                returned = %hash,
                "Bundler returned a different user operation hash"
            );
        }
        info!(
            account = %self.grant.account,
            target = %call.target,
            hash = %hash,
            sponsored = op.paymaster().is_some(),
            "User operation submitted"
        );
        Ok(UserOperationHandle {
            hash,
            submitted_at: self.ctx.clock().now(),
        })
    }

    /// Wait for `handle` using the context's confirmation settings.
    pub async fn wait_for_user_operation(
        &self,
        handle: &UserOperationHandle,
        cancel: &CancellationToken,
    ) -> ConfirmationOutcome {
        confirmation::wait_for_confirmation(
            self.ctx.bundler(),
            handle,
            &self.ctx.config().confirmation,
            cancel,
        )
        .await
    }

    /// Validator signature: mode, enable data, the permission used with its
    /// proof, and the session key's signature.
    fn operation_signature(&self, index: usize, session_sig: &[u8]) -> Result<Bytes> {
        let data = self.session_key_data();
        let permission = data.permissions.get(index).ok_or_else(|| {
            SessionKeyError::PermissionDenied(format!("no permission at index {index}"))
        })?;
        let proof: Vec<B256> = data.permission_tree().proof(index).ok_or_else(|| {
            SessionKeyError::PermissionDenied(format!("no proof for permission {index}"))
        })?;
        let body = (
            self.grant.enable_signature.clone(),
            permission.encode(),
            proof,
            U256::from(data.valid_after),
            U256::from(data.valid_until),
            data.paymaster.to_address(),
            Bytes::copy_from_slice(session_sig),
        )
            .abi_encode_params();

        let mut out = Vec::with_capacity(ENABLE_MODE.len() + body.len());
        out.extend_from_slice(&ENABLE_MODE);
        out.extend_from_slice(&body);
        Ok(out.into())
    }
}

fn submission(e: BundlerError) -> SessionKeyError {
    SessionKeyError::Submission(e.to_string())
}

/// Validation failures reported by the bundler are final; the rest is transient.
fn rejection(e: BundlerError) -> SessionKeyError {
    match e {
        BundlerError::Rpc { code, message } => SessionKeyError::Rejected { code, message },
        other => submission(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dummy_signature_shape() {
        assert_eq!(DUMMY_ECDSA.len(), 65);
        assert_eq!(DUMMY_ECDSA[63], 0xff);
        assert_eq!(DUMMY_ECDSA[64], 0x1c);
    }

    #[test]
    fn bundler_errors_map_to_session_errors() {
        assert!(matches!(
            rejection(BundlerError::Rpc {
                code: -32500,
                message: "AA24 signature error".into()
            }),
            SessionKeyError::Rejected { code: -32500, .. }
        ));
        let err = rejection(BundlerError::Transport("connection reset".into()));
        assert!(err.is_retryable());
        assert!(submission(BundlerError::InvalidResponse("null".into())).is_retryable());
    }

    #[test]
    fn context_sponsor_override() {
        struct Offline;
        #[async_trait::async_trait]
        impl Bundler for Offline {
            async fn chain_id(&self) -> std::result::Result<u64, BundlerError> {
                Err(BundlerError::Transport("offline".into()))
            }
            async fn nonce(
                &self,
                _: Address,
                _: Address,
            ) -> std::result::Result<U256, BundlerError> {
                Err(BundlerError::Transport("offline".into()))
            }
            async fn gas_fees(
                &self,
            ) -> std::result::Result<crate::bundler::GasFees, BundlerError> {
                Err(BundlerError::Transport("offline".into()))
            }
            async fn estimate_gas(
                &self,
                _: &UserOperation,
                _: Address,
            ) -> std::result::Result<crate::bundler::GasEstimate, BundlerError> {
                Err(BundlerError::Transport("offline".into()))
            }
            async fn sponsor(
                &self,
                _: &UserOperation,
                _: Address,
                _: &str,
            ) -> std::result::Result<crate::bundler::Sponsorship, BundlerError> {
                Err(BundlerError::Transport("offline".into()))
            }
            async fn send(
                &self,
                _: &UserOperation,
                _: Address,
            ) -> std::result::Result<B256, BundlerError> {
                Err(BundlerError::Transport("offline".into()))
            }
            async fn receipt(
                &self,
                _: B256,
            ) -> std::result::Result<Option<crate::user_op::UserOperationReceipt>, BundlerError>
            {
                Err(BundlerError::Transport("offline".into()))
            }
        }

        let ctx = ProviderContext::new(SessionConfig::default(), Arc::new(Offline));
        assert_eq!(ctx.sponsor_id(), None);
        let ctx = ctx.with_sponsor("policy-1");
        assert_eq!(ctx.sponsor_id(), Some("policy-1"));
        assert_eq!(ctx.config().entry_point, crate::config::DEFAULT_ENTRY_POINT);
    }
}

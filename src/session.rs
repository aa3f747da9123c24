//! Session data: permissions, validity window, sponsor constraint, and the
//! signed grant that binds them to an account.

use alloy_primitives::{Address, B256, Bytes, Signature, address};
use alloy_sol_types::{SolStruct, eip712_domain, sol};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, SessionKeyError};
use crate::key;
use crate::merkle::MerkleTree;
use crate::permission::Permission;

/// Current layout of the serialized session.
pub const PARAMS_VERSION: u8 = 1;

/// `paymaster` value meaning "any paymaster, but one is required".
pub const SPONSOR_REQUIRED_MARKER: Address = address!("0000000000000000000000000000000000000001");

sol! {
    /// EIP-712 payload the owner signs to enable a session key.
    struct EnableSession {
        address account;
        address sessionKey;
        bytes32 permissionsRoot;
        uint64 validAfter;
        uint64 validUntil;
        address paymaster;
    }
}

/// Which paymaster, if any, must sponsor operations sent under the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "address", rename_all = "camelCase")]
pub enum SponsorConstraint {
    /// Works with or without a paymaster.
    #[default]
    Unconstrained,
    /// Any paymaster, but one must be present.
    SponsorRequired,
    /// Only this paymaster.
    SpecificSponsor(Address),
}

impl SponsorConstraint {
    /// On-chain encoding: zero, one, or the paymaster address.
    pub fn to_address(self) -> Address {
        match self {
            Self::Unconstrained => Address::ZERO,
            Self::SponsorRequired => SPONSOR_REQUIRED_MARKER,
            Self::SpecificSponsor(paymaster) => paymaster,
        }
    }

    pub fn from_address(address: Address) -> Self {
        if address == Address::ZERO {
            Self::Unconstrained
        } else if address == SPONSOR_REQUIRED_MARKER {
            Self::SponsorRequired
        } else {
            Self::SpecificSponsor(address)
        }
    }

    pub fn requires_sponsor(self) -> bool {
        !matches!(self, Self::Unconstrained)
    }

    /// Check the paymaster an operation ended up with.
    pub fn check(self, paymaster: Option<Address>) -> std::result::Result<(), String> {
        match (self, paymaster) {
            (Self::Unconstrained, _) | (Self::SponsorRequired, Some(_)) => Ok(()),
            (Self::SpecificSponsor(want), Some(got)) if want == got => Ok(()),
            (Self::SpecificSponsor(want), Some(got)) => Err(format!(
                "session requires paymaster {want}, sponsor returned {got}"
            )),
            (_, None) => {
                Err("session requires a paymaster but none sponsored the operation".into())
            }
        }
    }
}

/// Constraints a session key operates under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionKeyData {
    /// Unix seconds; zero means no lower bound.
    pub valid_after: u64,
    /// Unix seconds; zero means no upper bound.
    pub valid_until: u64,
    pub permissions: Vec<Permission>,
    pub paymaster: SponsorConstraint,
}

impl SessionKeyData {
    pub fn validate(&self) -> Result<()> {
        if self.permissions.is_empty() {
            return Err(SessionKeyError::InvalidPermissionSpec(
                "session needs at least one permission".into(),
            ));
        }
        if self.valid_until != 0 && self.valid_after > self.valid_until {
            return Err(SessionKeyError::InvalidPermissionSpec(format!(
                "validAfter {} is later than validUntil {}",
                self.valid_after, self.valid_until
            )));
        }
        Ok(())
    }

    /// Whether `now` lies inside `[validAfter, validUntil]`.
    pub fn check_window(&self, now: u64) -> Result<()> {
        if now < self.valid_after {
            return Err(SessionKeyError::NotYetValid {
                now,
                valid_after: self.valid_after,
            });
        }
        if self.valid_until != 0 && now > self.valid_until {
            return Err(SessionKeyError::ValidityWindowExpired {
                now,
                valid_until: self.valid_until,
            });
        }
        Ok(())
    }

    pub fn permission_tree(&self) -> MerkleTree {
        MerkleTree::new(self.permissions.iter().map(Permission::hash).collect())
    }

    pub fn permissions_root(&self) -> B256 {
        self.permission_tree().root()
    }
}

/// Everything an account needs to accept operations from a session key.
/// Carries no secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionGrant {
    pub owner: Address,
    pub account: Address,
    pub session_key: Address,
    pub chain_id: u64,
    pub entry_point: Address,
    pub validator: Address,
    pub session_key_data: SessionKeyData,
    /// Owner signature over [`SessionGrant::enable_digest`].
    pub enable_signature: Bytes,
}

impl SessionGrant {
    pub fn enable_digest(&self) -> B256 {
        enable_digest(
            self.account,
            self.session_key,
            &self.session_key_data,
            self.chain_id,
            self.validator,
        )
    }

    /// Data is well formed and the enable signature recovers to `owner`.
    pub fn verify(&self) -> std::result::Result<(), String> {
        self.session_key_data.validate().map_err(|e| e.to_string())?;
        let sig = Signature::from_raw(&self.enable_signature)
            .map_err(|e| format!("enable signature: {e}"))?;
        let signer = sig
            .recover_address_from_prehash(&self.enable_digest())
            .map_err(|e| format!("enable signature: {e}"))?;
        if signer != self.owner {
            return Err(format!(
                "enable signature recovers to {signer}, expected owner {}",
                self.owner
            ));
        }
        Ok(())
    }
}

/// EIP-712 digest the owner signs to enable `session_key` on `account`.
pub fn enable_digest(
    account: Address,
    session_key: Address,
    data: &SessionKeyData,
    chain_id: u64,
    validator: Address,
) -> B256 {
    let domain = eip712_domain! {
        name: "SessionKeyValidator",
        version: "1",
        chain_id: chain_id,
        verifying_contract: validator,
    };
    EnableSession {
        account,
        sessionKey: session_key,
        permissionsRoot: data.permissions_root(),
        validAfter: data.valid_after,
        validUntil: data.valid_until,
        paymaster: data.paymaster.to_address(),
    }
    .eip712_signing_hash(&domain)
}

/// Transferable session: key material plus the grant.
///
/// Holding this is equivalent to holding the session key itself.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionKeyParams {
    pub version: u8,
    pub session_private_key: B256,
    #[serde(flatten)]
    pub grant: SessionGrant,
}

impl fmt::Debug for SessionKeyParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKeyParams")
            .field("version", &self.version)
            .field("session_private_key", &"<redacted>")
            .field("grant", &self.grant)
            .finish()
    }
}

impl SessionKeyParams {
    /// Opaque string form: base64 of the JSON document.
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self)
            .map_err(|e| SessionKeyError::MalformedSessionData(e.to_string()))?;
        Ok(B64.encode(json))
    }

    /// Parse and verify a string produced by [`SessionKeyParams::encode`]. No I/O.
    pub fn decode(serialized: &str) -> Result<Self> {
        let malformed = SessionKeyError::MalformedSessionData;
        let raw = B64
            .decode(serialized.trim())
            .map_err(|e| malformed(format!("not base64: {e}")))?;
        let params: SessionKeyParams =
            serde_json::from_slice(&raw).map_err(|e| malformed(format!("bad document: {e}")))?;

        if params.version != PARAMS_VERSION {
            return Err(malformed(format!(
                "unsupported version {}, expected {PARAMS_VERSION}",
                params.version
            )));
        }
        let signer = key::to_signer(&params.session_private_key)
            .map_err(|e| malformed(e.to_string()))?;
        if signer.address() != params.grant.session_key {
            return Err(malformed(format!(
                "private key belongs to {}, grant names {}",
                signer.address(),
                params.grant.session_key
            )));
        }
        params.grant.verify().map_err(malformed)?;
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::erc20_abi;
    use crate::permission::{ArgCondition, ParamOperator};
    use alloy_primitives::U256;
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;

    const USDC: Address = address!("7F5c764cBc14f9669B88837ca1490cCa17c31607");
    const ACCOUNT: Address = address!("fD7D4BFa21276acf6ceA29E041AbD8E1a887A6ae");

    fn data(valid_after: u64, valid_until: u64) -> SessionKeyData {
        SessionKeyData {
            valid_after,
            valid_until,
            permissions: vec![
                Permission::from_abi(
                    USDC,
                    &erc20_abi(),
                    "transfer",
                    U256::ZERO,
                    &[ArgCondition::new(1, ParamOperator::LessThan, 100_000_000u64)],
                )
                .unwrap(),
            ],
            paymaster: SponsorConstraint::Unconstrained,
        }
    }

    fn signed_params() -> SessionKeyParams {
        let owner = PrivateKeySigner::random();
        let session = PrivateKeySigner::random();
        let mut grant = SessionGrant {
            owner: owner.address(),
            account: ACCOUNT,
            session_key: session.address(),
            chain_id: 10,
            entry_point: crate::config::DEFAULT_ENTRY_POINT,
            validator: crate::config::DEFAULT_VALIDATOR,
            session_key_data: data(0, 0),
            enable_signature: Bytes::new(),
        };
        let sig = owner.sign_hash_sync(&grant.enable_digest()).unwrap();
        grant.enable_signature = sig.as_bytes().to_vec().into();
        SessionKeyParams {
            version: PARAMS_VERSION,
            session_private_key: session.to_bytes(),
            grant,
        }
    }

    #[test]
    fn zero_window_is_unbounded() {
        let d = data(0, 0);
        d.check_window(0).unwrap();
        d.check_window(u64::MAX).unwrap();
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let d = data(100, 200);
        d.check_window(100).unwrap();
        d.check_window(200).unwrap();
        assert!(matches!(
            d.check_window(201),
            Err(SessionKeyError::ValidityWindowExpired { now: 201, valid_until: 200 })
        ));
        assert!(matches!(
            d.check_window(99),
            Err(SessionKeyError::NotYetValid { .. })
        ));
    }

    #[test]
    fn inverted_window_is_invalid() {
        assert!(data(200, 100).validate().is_err());
        data(200, 0).validate().unwrap();
    }

    #[test]
    fn empty_permissions_are_invalid() {
        let mut d = data(0, 0);
        d.permissions.clear();
        assert!(matches!(
            d.validate(),
            Err(SessionKeyError::InvalidPermissionSpec(_))
        ));
    }

    #[test]
    fn sponsor_constraint_encoding() {
        let pm = address!("00000000000000000000000000000000000000cc");
        for c in [
            SponsorConstraint::Unconstrained,
            SponsorConstraint::SponsorRequired,
            SponsorConstraint::SpecificSponsor(pm),
        ] {
            assert_eq!(SponsorConstraint::from_address(c.to_address()), c);
        }
        assert!(SponsorConstraint::SponsorRequired.check(None).is_err());
        assert!(SponsorConstraint::SpecificSponsor(pm).check(Some(ACCOUNT)).is_err());
        SponsorConstraint::SpecificSponsor(pm).check(Some(pm)).unwrap();
        SponsorConstraint::Unconstrained.check(None).unwrap();
    }

    #[test]
    fn digest_binds_every_field() {
        let d = data(0, 0);
        let key = Address::repeat_byte(7);
        let validator = crate::config::DEFAULT_VALIDATOR;
        let base = enable_digest(ACCOUNT, key, &d, 10, validator);
        assert_ne!(base, enable_digest(ACCOUNT, key, &d, 1, validator));
        assert_ne!(base, enable_digest(ACCOUNT, Address::repeat_byte(8), &d, 10, validator));
        assert_ne!(base, enable_digest(ACCOUNT, key, &data(0, 5), 10, validator));
    }

    #[test]
    fn encode_decode_preserves_params() {
        let params = signed_params();
        let decoded = SessionKeyParams::decode(&params.encode().unwrap()).unwrap();
        assert_eq!(decoded, params);
    }

    #[test]
    fn decode_rejects_garbage_and_truncation() {
        let encoded = signed_params().encode().unwrap();
        for bad in ["", "!!!", "aGVsbG8=", &encoded[..encoded.len() / 2]] {
            assert!(
                matches!(
                    SessionKeyParams::decode(bad),
                    Err(SessionKeyError::MalformedSessionData(_))
                ),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn decode_rejects_tampered_grant() {
        let mut params = signed_params();
        params.grant.session_key_data.valid_until = 1;
        let encoded = params.encode().unwrap();
        let err = SessionKeyParams::decode(&encoded).unwrap_err();
        assert!(err.to_string().contains("recovers to"));
    }

    #[test]
    fn decode_rejects_foreign_private_key() {
        let mut params = signed_params();
        params.session_private_key = PrivateKeySigner::random().to_bytes();
        assert!(SessionKeyParams::decode(&params.encode().unwrap()).is_err());
    }

    #[test]
    fn decode_rejects_unknown_version() {
        let mut params = signed_params();
        params.version = 9;
        assert!(SessionKeyParams::decode(&params.encode().unwrap()).is_err());
    }

    #[test]
    fn debug_redacts_key() {
        let params = signed_params();
        let printed = format!("{params:?}");
        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains(&hex::encode(params.session_private_key)));
    }
}

//! Session key material.

use alloy_primitives::B256;
use alloy_signer_local::PrivateKeySigner;
use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::{Result, SessionKeyError};

/// Draws above the curve order are astronomically rare; this bounds the loop.
const MAX_DRAWS: usize = 8;

/// Fresh random secp256k1 private key, independent of any derivation path.
pub fn generate_private_key() -> Result<B256> {
    for _ in 0..MAX_DRAWS {
        let mut bytes = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| SessionKeyError::Entropy(e.to_string()))?;
        let key = B256::from(bytes);
        if PrivateKeySigner::from_bytes(&key).is_ok() {
            return Ok(key);
        }
    }
    Err(SessionKeyError::Entropy(
        "no valid scalar after repeated draws".into(),
    ))
}

/// Wrap raw key material into a signer.
pub fn to_signer(private_key: &B256) -> Result<PrivateKeySigner> {
    PrivateKeySigner::from_bytes(private_key)
        .map_err(|e| SessionKeyError::InvalidSessionKey(e.to_string()))
}

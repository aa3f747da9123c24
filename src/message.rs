//! Message signing with the primary signer, and ERC-6492 envelopes for
//! accounts that are not deployed yet.

use alloy_primitives::{Address, Bytes, Signature, hex};
use alloy_sol_types::SolValue;

use crate::error::{Result, SessionKeyError};
use crate::signer::AccountSigner;

/// Suffix marking an ERC-6492 wrapped signature.
pub const ERC6492_MAGIC: [u8; 32] =
    hex!("6492649264926492649264926492649264926492649264926492649264926492");

/// Factory call that deploys a counterfactual account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountDeployment {
    pub factory: Address,
    pub factory_calldata: Bytes,
}

/// Sign `message` (EIP-191) with the primary signer.
///
/// With `deployment` set the signature is wrapped so verifiers can deploy the
/// account before checking it.
pub async fn sign_message(
    primary: &dyn AccountSigner,
    message: &[u8],
    deployment: Option<&AccountDeployment>,
) -> Result<Bytes> {
    let signature = primary
        .sign_message(message)
        .await
        .map_err(SessionKeyError::Signing)?;
    let raw = signature.as_bytes();
    Ok(match deployment {
        Some(deployment) => wrap_erc6492(&raw, deployment),
        None => Bytes::copy_from_slice(&raw),
    })
}

/// `abi.encode(factory, calldata, signature) ++ magic`
pub fn wrap_erc6492(signature: &[u8], deployment: &AccountDeployment) -> Bytes {
    let mut out = (
        deployment.factory,
        deployment.factory_calldata.clone(),
        Bytes::copy_from_slice(signature),
    )
        .abi_encode_params();
    out.extend_from_slice(&ERC6492_MAGIC);
    out.into()
}

/// Split an ERC-6492 envelope into deployment and inner signature.
/// Unwrapped signatures pass through with no deployment.
pub fn unwrap_erc6492(signature: &[u8]) -> Result<(Option<AccountDeployment>, Bytes)> {
    let Some(body) = signature.strip_suffix(&ERC6492_MAGIC) else {
        return Ok((None, Bytes::copy_from_slice(signature)));
    };
    let (factory, factory_calldata, inner) = <(Address, Bytes, Bytes)>::abi_decode_params(body)
        .map_err(|e| SessionKeyError::InvalidSignature(format!("ERC-6492 envelope: {e}")))?;
    Ok((
        Some(AccountDeployment {
            factory,
            factory_calldata,
        }),
        inner,
    ))
}

/// Whether `signature` over `message` was produced by `expected`.
///
/// Only ECDSA signatures are checked; validating a deployed account through
/// ERC-1271 needs a chain client.
pub fn verify_message(expected: Address, message: &[u8], signature: &[u8]) -> Result<bool> {
    let (_, inner) = unwrap_erc6492(signature)?;
    let sig = Signature::from_raw(&inner)
        .map_err(|e| SessionKeyError::InvalidSignature(e.to_string()))?;
    let signer = sig
        .recover_address_from_msg(message)
        .map_err(|e| SessionKeyError::InvalidSignature(e.to_string()))?;
    Ok(signer == expected)
}

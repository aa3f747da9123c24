//! Message Signing Example
//!
//! This example signs a message with the account owner and verifies it,
//! first as a plain EIP-191 signature and then wrapped in an ERC-6492
//! envelope for an account that has not been deployed yet.
//!
//! Run with: `cargo run --example sign_message`

use alloy_primitives::{Address, Bytes, address};
use alloy_signer_local::PrivateKeySigner;
use session_keys::OwnerSigner;
use session_keys::message::{AccountDeployment, sign_message, unwrap_erc6492, verify_message};

const ACCOUNT: Address = address!("fD7D4BFa21276acf6ceA29E041AbD8E1a887A6ae");
const FACTORY: Address = address!("5de4839a76cf55d0c90e2061ef4386d962E15ae3");
const MESSAGE: &[u8] = b"Hello, world!";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // =========================================================================
    // Setup: owner key
    // =========================================================================
    // In production the owner is a browser or hardware wallet.
    // For this example, we generate a random key.

    let owner_key = PrivateKeySigner::random();
    let owner = owner_key.address();
    let signer = OwnerSigner::new(ACCOUNT, owner_key);

    println!("Account: {ACCOUNT}");
    println!("Owner:   {owner}");

    // =========================================================================
    // 1. SIGN AND VERIFY
    // =========================================================================
    println!("\n=== Plain Signature ===");

    let signature = sign_message(&signer, MESSAGE, None).await?;
    println!("Signature: {signature}");
    println!("Valid: {}", verify_message(owner, MESSAGE, &signature)?);

    // =========================================================================
    // 2. SIGN FOR A COUNTERFACTUAL ACCOUNT (ERC-6492)
    // =========================================================================
    println!("\n=== ERC-6492 Signature ===");

    let deployment = AccountDeployment {
        factory: FACTORY,
        factory_calldata: Bytes::from_static(&[0xc5, 0x26, 0x5d, 0x5d]),
    };
    let wrapped = sign_message(&signer, MESSAGE, Some(&deployment)).await?;
    println!("Wrapped length: {} bytes", wrapped.len());

    let (found, inner) = unwrap_erc6492(&wrapped)?;
    if let Some(found) = found {
        println!("Factory: {}", found.factory);
    }
    println!("Inner signature: {inner}");
    println!("Valid: {}", verify_message(owner, MESSAGE, &wrapped)?);

    // =========================================================================
    // 3. WRONG MESSAGE
    // =========================================================================
    println!("\n=== Tampered Message ===");

    println!(
        "Valid: {}",
        verify_message(owner, b"Hello, world?", &signature)?
    );

    println!("\n=== Done ===");
    Ok(())
}

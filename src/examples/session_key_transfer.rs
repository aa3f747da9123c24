//! Session Key Transfer Example
//!
//! This example walks the full session-key flow against a bundler:
//! enable a session key for an account, serialize it, restore it without the
//! owner, and use it to send a USDC transfer the session is allowed to make.
//!
//! Run with: `cargo run --example session_key_transfer`
//!
//! Set `SESSION_KEYS__BUNDLER_URL`, `SESSION_KEYS__SPONSOR_ID` and
//! `OWNER_PRIVATE_KEY` (hex) for a real run.

use alloy_primitives::{Address, B256, U256, address};
use alloy_signer_local::PrivateKeySigner;
use session_keys::{
    ArgCondition, CallRequest, ConfirmationOutcome, OwnerSigner, ParamOperator, Permission,
    ProviderContext, SessionConfig, SessionKeyData, SessionKeyProvider, SponsorConstraint, abi, key,
};
use tokio_util::sync::CancellationToken;

const USDC: Address = address!("7F5c764cBc14f9669B88837ca1490cCa17c31607");
const ACCOUNT: Address = address!("fD7D4BFa21276acf6ceA29E041AbD8E1a887A6ae");
const DESTINATION: Address = address!("C13B7CDa9B08A4Fb1026E479A2079029cd30BfaD");

/// 1 USDC (6 decimals)
const AMOUNT: u64 = 1_000_000;
/// 100 USDC per transfer
const CAP: u64 = 100_000_000;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = SessionConfig::load()?;
    println!("Bundler: {}", config.bundler_url);
    println!("Chain:   {}", config.chain_id);

    // =========================================================================
    // Setup: owner of the smart account
    // =========================================================================
    // In production the owner is a connected wallet that approves the
    // registration. For this example, we read a key or generate one.

    let owner_key = load_owner_key()?;
    println!("Owner:   {}", owner_key.address());
    let owner = OwnerSigner::new(ACCOUNT, owner_key);

    // =========================================================================
    // 1. GENERATE SESSION KEY
    // =========================================================================
    println!("\n=== Generating Session Key ===");

    let session_private_key = key::generate_private_key()?;
    let session_signer = key::to_signer(&session_private_key)?;
    println!("Session key: {}", session_signer.address());

    // =========================================================================
    // 2. DESCRIBE WHAT THE SESSION MAY DO
    // =========================================================================
    println!("\n=== Building Permissions ===");

    let permission = Permission::from_abi(
        USDC,
        &abi::erc20_abi(),
        "transfer",
        U256::ZERO,
        &[
            ArgCondition::new(0, ParamOperator::Equal, DESTINATION),
            ArgCondition::new(1, ParamOperator::LessThan, U256::from(CAP)),
        ],
    )?;
    println!("transfer() on {USDC}, only to {DESTINATION}, under {CAP} units");

    let data = SessionKeyData {
        valid_after: 0,
        valid_until: 0,
        permissions: vec![permission],
        paymaster: SponsorConstraint::Unconstrained,
    };

    // =========================================================================
    // 3. ENABLE THE SESSION (owner signs once)
    // =========================================================================
    println!("\n=== Enabling Session ===");

    let ctx = ProviderContext::from_config(config)?;
    let provider = SessionKeyProvider::init(ctx.clone(), &owner, session_signer, data).await?;
    println!("Session enabled for {}", provider.account());

    // =========================================================================
    // 4. SERIALIZE AND RESTORE (no owner needed)
    // =========================================================================
    println!("\n=== Serializing Session ===");

    let serialized = provider.serialize_session_key_params(&session_private_key)?;
    println!("Serialized: {}...", &serialized[..serialized.len().min(48)]);
    drop(provider);

    let params = SessionKeyProvider::deserialize_session_key_params(&serialized)?;
    let restored = SessionKeyProvider::from_session_key_params(ctx, params).await?;
    println!("Restored session key: {}", restored.session_key_address());

    // =========================================================================
    // 5. SEND A TRANSFER UNDER THE SESSION
    // =========================================================================
    println!("\n=== Sending Transfer ===");

    let call = CallRequest::new(USDC, abi::erc20_transfer(DESTINATION, U256::from(AMOUNT)));
    let handle = restored.send_user_operation(call).await?;
    println!("User operation: {}", handle.hash);

    // A transfer to anyone else is refused before it reaches the bundler
    let stray = CallRequest::new(
        USDC,
        abi::erc20_transfer(Address::repeat_byte(0xbb), U256::from(AMOUNT)),
    );
    if let Err(e) = restored.send_user_operation(stray).await {
        println!("Stray transfer refused: {e}");
    }

    // =========================================================================
    // 6. WAIT FOR CONFIRMATION
    // =========================================================================
    println!("\n=== Waiting for Confirmation ===");

    let cancel = CancellationToken::new();
    match restored.wait_for_user_operation(&handle, &cancel).await {
        ConfirmationOutcome::Success(receipt) => {
            println!("Included in tx {}", receipt.receipt.transaction_hash)
        }
        ConfirmationOutcome::Reverted { reason, .. } => {
            println!("Reverted: {}", reason.unwrap_or_else(|| "no reason".into()))
        }
        ConfirmationOutcome::TimedOut { waited, .. } => {
            println!("Not included after {waited:?}; check the hash later")
        }
        ConfirmationOutcome::Cancelled => println!("Stopped waiting"),
    }

    println!("\n=== Done ===");
    Ok(())
}

/// Owner key from `OWNER_PRIVATE_KEY`, or a random one.
fn load_owner_key() -> Result<PrivateKeySigner, Box<dyn std::error::Error>> {
    match std::env::var("OWNER_PRIVATE_KEY") {
        Ok(hex_key) => {
            let bytes: B256 = hex_key.trim().parse()?;
            Ok(key::to_signer(&bytes)?)
        }
        Err(_) => Ok(PrivateKeySigner::random()),
    }
}

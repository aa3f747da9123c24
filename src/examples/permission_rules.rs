//! Permission Rules Example
//!
//! This example builds the USDC transfer permission used by the session-key
//! flow and checks a few calls against it. Nothing leaves the process.
//!
//! Run with: `cargo run --example permission_rules`

use alloy_primitives::{Address, U256, address};
use session_keys::abi;
use session_keys::merkle::verify_proof;
use session_keys::permission::find_allowing;
use session_keys::{
    ArgCondition, CallRequest, ParamOperator, Permission, SessionKeyData, SponsorConstraint,
};

const USDC: Address = address!("7F5c764cBc14f9669B88837ca1490cCa17c31607");
const DESTINATION: Address = address!("C13B7CDa9B08A4Fb1026E479A2079029cd30BfaD");

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // =========================================================================
    // 1. BUILD THE PERMISSION
    // =========================================================================
    println!("=== Building Permission ===");

    // transfer(to, amount) with to == DESTINATION and amount < 100 USDC
    let permission = Permission::from_abi(
        USDC,
        &abi::erc20_abi(),
        "transfer",
        U256::ZERO,
        &[
            ArgCondition::new(0, ParamOperator::Equal, DESTINATION),
            ArgCondition::new(1, ParamOperator::LessThan, usdc(100)),
        ],
    )?;

    println!("Target:   {}", permission.target);
    println!("Selector: {}", permission.selector);
    println!("Rules:    {}", permission.rules.len());
    println!("Hash:     {}", permission.hash());

    // =========================================================================
    // 2. CHECK CALLS LOCALLY
    // =========================================================================
    println!("\n=== Checking Calls ===");

    let permissions = vec![permission];
    let calls = [
        ("1 USDC to destination", transfer(DESTINATION, usdc(1))),
        ("50 USDC to destination", transfer(DESTINATION, usdc(50))),
        ("150 USDC to destination", transfer(DESTINATION, usdc(150))),
        ("1 USDC elsewhere", transfer(Address::repeat_byte(0xbb), usdc(1))),
        (
            "1 USDC with ETH attached",
            transfer(DESTINATION, usdc(1)).with_value(U256::from(1)),
        ),
    ];

    for (label, call) in &calls {
        match find_allowing(&permissions, call) {
            Ok(index) => println!("  allowed  {label} (permission {index})"),
            Err(e) => println!("  denied   {label}: {e}"),
        }
    }

    // =========================================================================
    // 3. COMMIT TO THE PERMISSION SET
    // =========================================================================
    println!("\n=== Permission Commitment ===");

    let data = SessionKeyData {
        valid_after: 0,
        valid_until: 0,
        permissions,
        paymaster: SponsorConstraint::Unconstrained,
    };
    data.validate()?;

    let tree = data.permission_tree();
    let root = tree.root();
    println!("Merkle root: {root}");

    let leaf = data.permissions[0].hash();
    let proof = tree.proof(0).unwrap_or_default();
    println!("Proof for permission 0 verifies: {}", verify_proof(root, leaf, &proof));

    println!("\n=== Done ===");
    Ok(())
}

/// ERC-20 transfer call against USDC.
fn transfer(to: Address, amount: U256) -> CallRequest {
    CallRequest::new(USDC, abi::erc20_transfer(to, amount))
}

/// Whole USDC to base units (6 decimals).
fn usdc(whole: u64) -> U256 {
    U256::from(whole) * U256::from(1_000_000u64)
}

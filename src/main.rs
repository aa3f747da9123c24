//! Session Key Examples
//!
//! This crate contains standalone examples demonstrating session-key
//! delegation for ERC-4337 smart accounts.
//! Each example can be run independently with `cargo run --example <name>`.
//!
//! Available examples:
//!
//! - `session_key_transfer`: Enable a session key, serialize it, restore it and send a capped
//!   USDC transfer
//! - `sign_message`: Sign and verify a message, with and without ERC-6492 wrapping
//! - `permission_rules`: Build a permission offline and see which calls it allows
//!
//! # Quick Start
//!
//! ```bash
//! # Build a permission and check calls against it (no network)
//! cargo run --example permission_rules
//!
//! # Sign and verify a message (no network)
//! cargo run --example sign_message
//!
//! # Full session-key flow against a bundler
//! SESSION_KEYS__BUNDLER_URL=https://... cargo run --example session_key_transfer
//! ```

fn main() {
    println!("Session Key Examples");
    println!("====================");
    println!();
    println!("Available examples:");
    println!();
    println!("  cargo run --example permission_rules");
    println!("    Build the USDC transfer permission and check calls against it offline");
    println!();
    println!("  cargo run --example sign_message");
    println!("    Sign and verify a message, with and without ERC-6492 wrapping");
    println!();
    println!("  cargo run --example session_key_transfer");
    println!("    Enable, serialize, restore and use a session key to send 1 USDC");
    println!();
    println!("Configuration is read from session-keys.toml and SESSION_KEYS__* variables.");
}

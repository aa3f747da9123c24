//! Session keys for ERC-4337 smart accounts.
//!
//! A session key is a throwaway signer the account owner authorizes once,
//! limited to a set of contract calls and a validity window. The session can
//! be serialized, handed to another process and rebuilt there without the
//! owner, then used to submit user operations through a bundler.

pub mod abi;
pub mod bundler;
pub mod clock;
pub mod config;
pub mod confirmation;
pub mod error;
pub mod key;
pub mod merkle;
pub mod message;
pub mod permission;
pub mod provider;
pub mod rpc;
pub mod session;
pub mod signer;
pub mod user_op;

pub use bundler::Bundler;
pub use config::SessionConfig;
pub use confirmation::{ConfirmationOutcome, wait_for_confirmation};
pub use error::{BundlerError, Result, SessionKeyError};
pub use permission::{ArgCondition, ParamOperator, Permission};
pub use provider::{ProviderContext, SessionKeyProvider};
pub use session::{SessionKeyData, SessionKeyParams, SponsorConstraint};
pub use signer::{AccountSigner, OwnerSigner};
pub use user_op::{CallRequest, UserOperationHandle, UserOperationReceipt};

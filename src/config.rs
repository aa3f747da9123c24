//! Provider configuration: bundler endpoint, chain, contracts and polling.

use alloy_primitives::{Address, address};
use serde::Deserialize;
use std::time::Duration;

use crate::error::{Result, SessionKeyError};

/// ERC-4337 v0.6 EntryPoint.
pub const DEFAULT_ENTRY_POINT: Address = address!("5FF137D4b0FDCD49DcA30c7CF57E578a026d2789");

/// Session-key validator module; also the EIP-712 verifying contract of the enable digest.
pub const DEFAULT_VALIDATOR: Address = address!("5C06CE2b673fD5E6e56076e40DD46aB67f5a72A5");

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "defaults::bundler_url")]
    pub bundler_url: String,

    #[serde(default = "defaults::chain_id")]
    pub chain_id: u64,

    #[serde(default = "defaults::entry_point")]
    pub entry_point: Address,

    #[serde(default = "defaults::validator")]
    pub validator: Address,

    /// Sponsorship policy / project id. `None` disables sponsorship.
    #[serde(default)]
    pub sponsor_id: Option<String>,

    #[serde(default = "defaults::request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default)]
    pub confirmation: ConfirmationConfig,
}

/// How the confirmation waiter polls for a receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ConfirmationConfig {
    #[serde(default = "defaults::poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "defaults::max_wait_ms")]
    pub max_wait_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bundler_url: defaults::bundler_url(),
            chain_id: defaults::chain_id(),
            entry_point: defaults::entry_point(),
            validator: defaults::validator(),
            sponsor_id: None,
            request_timeout_ms: defaults::request_timeout_ms(),
            confirmation: ConfirmationConfig::default(),
        }
    }
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::poll_interval_ms(),
            max_wait_ms: defaults::max_wait_ms(),
        }
    }
}

impl ConfirmationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

impl SessionConfig {
    /// Load from an optional `session-keys.toml` and `SESSION_KEYS__*` env vars.
    ///
    /// Nested keys use a double underscore, e.g. `SESSION_KEYS__CONFIRMATION__MAX_WAIT_MS`.
    pub fn load() -> Result<Self> {
        let cfg: SessionConfig = config::Config::builder()
            .add_source(config::File::with_name("session-keys").required(false))
            .add_source(
                config::Environment::with_prefix("SESSION_KEYS")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| SessionKeyError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chain_id == 0 {
            return Err(SessionKeyError::Config("chain_id must be non-zero".into()));
        }
        if self.bundler_url.is_empty() {
            return Err(SessionKeyError::Config("bundler_url is empty".into()));
        }
        if self.confirmation.poll_interval_ms == 0 {
            return Err(SessionKeyError::Config(
                "confirmation.poll_interval_ms must be positive".into(),
            ));
        }
        if self.confirmation.max_wait_ms < self.confirmation.poll_interval_ms {
            return Err(SessionKeyError::Config(format!(
                "confirmation.max_wait_ms ({}) is shorter than poll_interval_ms ({})",
                self.confirmation.max_wait_ms, self.confirmation.poll_interval_ms
            )));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

mod defaults {
    use alloy_primitives::Address;

    pub fn bundler_url() -> String {
        "http://localhost:4337".into()
    }

    pub fn chain_id() -> u64 {
        10
    }

    pub fn entry_point() -> Address {
        super::DEFAULT_ENTRY_POINT
    }

    pub fn validator() -> Address {
        super::DEFAULT_VALIDATOR
    }

    pub fn request_timeout_ms() -> u64 {
        10_000
    }

    pub fn poll_interval_ms() -> u64 {
        1_000
    }

    pub fn max_wait_ms() -> u64 {
        60_000
    }
}

//! Error types for the session-key flow and its bundler collaborator.

use thiserror::Error;

/// Errors surfaced by the session-key flow.
#[derive(Debug, Error)]
pub enum SessionKeyError {
    /// Permission input does not match the interface description
    #[error("Invalid permission spec: {0}")]
    InvalidPermissionSpec(String),

    /// Registration of the session with the primary signer failed
    #[error("Provider init failed: {0}")]
    ProviderInit(String),

    /// Serialized session could not be parsed or failed verification
    #[error("Malformed session data: {0}")]
    MalformedSessionData(String),

    /// Session data is valid but could not be bound to the bundler
    #[error("Reconstruction failed: {0}")]
    Reconstruction(String),

    /// Call falls outside every permission of the session
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Current time is past `validUntil`
    #[error("Session expired at {valid_until} (now {now})")]
    ValidityWindowExpired { now: u64, valid_until: u64 },

    /// Current time is before `validAfter`
    #[error("Session not valid before {valid_after} (now {now})")]
    NotYetValid { now: u64, valid_after: u64 },

    /// Sponsor refused the operation or the sponsor constraint is unmet
    #[error("Sponsor rejected operation: {0}")]
    SponsorRejected(String),

    /// Transient failure talking to the bundler
    #[error("Submission failed: {0}")]
    Submission(String),

    /// Bundler refused the operation during validation
    #[error("Operation rejected by bundler ({code}): {message}")]
    Rejected { code: i64, message: String },

    /// Entropy source failure while generating key material
    #[error("Entropy source unavailable: {0}")]
    Entropy(String),

    #[error("Invalid session key: {0}")]
    InvalidSessionKey(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SessionKeyError {
    /// Whether repeating the same call may succeed without caller changes.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Reconstruction(_) | Self::Submission(_))
    }
}

/// Failures reported by a [`Bundler`](crate::bundler::Bundler) implementation.
#[derive(Debug, Error)]
pub enum BundlerError {
    /// Connection, timeout or HTTP-level failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// JSON-RPC error object returned by the service
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Response did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Result type alias for session-key operations
pub type Result<T> = std::result::Result<T, SessionKeyError>;

//! Waiting for a submitted user operation to land on chain.

use std::time::Duration;
use tokio::time::{Instant, sleep_until, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bundler::Bundler;
use crate::config::ConfirmationConfig;
use crate::user_op::{UserOperationHandle, UserOperationReceipt};

/// Terminal result of a confirmation wait.
///
/// Cancelling or timing out only stops local waiting; the operation may still
/// be included later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Success(UserOperationReceipt),
    /// Included, but execution reverted.
    Reverted {
        receipt: UserOperationReceipt,
        reason: Option<String>,
    },
    TimedOut {
        waited: Duration,
        /// Last transient polling error, if the final polls failed.
        last_error: Option<String>,
    },
    Cancelled,
}

impl ConfirmationOutcome {
    pub fn receipt(&self) -> Option<&UserOperationReceipt> {
        match self {
            Self::Success(receipt) | Self::Reverted { receipt, .. } => Some(receipt),
            Self::TimedOut { .. } | Self::Cancelled => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Poll the bundler for a receipt every `poll_interval` until one arrives,
/// `max_wait` elapses, or `cancel` fires.
///
/// Polling errors are treated as transient and logged.
pub async fn wait_for_confirmation(
    bundler: &dyn Bundler,
    handle: &UserOperationHandle,
    config: &ConfirmationConfig,
    cancel: &CancellationToken,
) -> ConfirmationOutcome {
    let started = Instant::now();
    let deadline = started + config.max_wait();
    let mut last_error = None;
    let mut attempt = 0u32;

    loop {
        if Instant::now() >= deadline {
            warn!(hash = %handle.hash, attempts = attempt, "Gave up waiting for user operation");
            return ConfirmationOutcome::TimedOut {
                waited: started.elapsed(),
                last_error,
            };
        }
        attempt += 1;

        let polled = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ConfirmationOutcome::Cancelled,
            polled = timeout_at(deadline, bundler.receipt(handle.hash)) => polled,
        };
        match polled {
            Ok(Ok(Some(receipt))) if receipt.success => {
                info!(
                    hash = %handle.hash,
                    tx = %receipt.receipt.transaction_hash,
                    attempts = attempt,
                    "User operation confirmed"
                );
                return ConfirmationOutcome::Success(receipt);
            }
            Ok(Ok(Some(receipt))) => {
                warn!(hash = %handle.hash, reason = ?receipt.reason, "User operation reverted");
                let reason = receipt.reason.clone();
                return ConfirmationOutcome::Reverted { receipt, reason };
            }
            Ok(Ok(None)) => {
                debug!(hash = %handle.hash, attempt, "User operation pending");
                last_error = None;
            }
            Ok(Err(e)) => {
                warn!(hash = %handle.hash, attempt, error = %e, "Receipt poll failed");
                last_error = Some(e.to_string());
            }
            // Deadline hit mid-request; the loop head reports it.
            Err(_) => continue,
        }

        let next = (Instant::now() + config.poll_interval()).min(deadline);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return ConfirmationOutcome::Cancelled,
            _ = sleep_until(next) => {}
        }
    }
}

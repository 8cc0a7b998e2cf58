//! Chain adapter seams.
//!
//! The on-chain points program lives outside this crate. The worker talks
//! to it through `ChainWriter`, reconciliation reads totals through
//! `ChainReader`. Both are injected, so tests run against mocks and
//! deployments plug in their RPC client of choice.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;

use crate::domain::{ProofId, WalletAddress};

/// Errors surfaced by chain adapters.
///
/// Adapters map their transport failures onto these variants; retry
/// classification looks at the rendered message, so the variant choice
/// carries no retry semantics by itself.
#[derive(Error, Debug, Clone)]
pub enum ChainError {
    /// The chain program rejected the call
    #[error("chain rejected call: {0}")]
    Rejected(String),

    /// The chain endpoint could not be reached or did not answer
    #[error("chain unavailable: {0}")]
    Unavailable(String),

    /// Transport-level failure in the adapter
    #[error("chain adapter io error: {0}")]
    Io(String),
}

/// Whether a failed adapter call is worth re-queueing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// Transient: requeue and try again later
    Retryable,
    /// Permanent: record the failure, do not retry automatically
    Fatal,
}

/// Message fragments that mark an adapter error as transient.
/// Matched case-insensitively against the rendered error.
const RETRYABLE_PATTERNS: &[&str] = &[
    "429",
    "too many requests",
    "rate limit",
    "blockhash",
    "timeout",
    "timed out",
    "connection",
    "network",
];

/// Classify an adapter error as retryable or fatal.
pub fn classify(error: &ChainError) -> ErrorDisposition {
    let message = error.to_string().to_lowercase();
    if RETRYABLE_PATTERNS
        .iter()
        .any(|pattern| message.contains(pattern))
    {
        ErrorDisposition::Retryable
    } else {
        ErrorDisposition::Fatal
    }
}

/// Writes point credits to the chain.
///
/// The adapter is NOT assumed idempotent: calling `add_points` twice for
/// one proof credits twice. At-most-once is enforced by the caller via
/// the chain status tracker before each call.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChainWriter: Send + Sync {
    /// Credit `points` to `wallet` for the given proof, returning the
    /// chain transaction reference.
    async fn add_points(
        &self,
        wallet: &WalletAddress,
        points: u64,
        proof_id: &ProofId,
    ) -> Result<String, ChainError>;
}

/// Reads settled totals from the chain.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Total points the chain currently holds for a wallet.
    async fn wallet_total(&self, wallet: &WalletAddress) -> Result<u64, ChainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_errors_are_retryable() {
        let cases = [
            ChainError::Rejected("429 Too Many Requests".to_string()),
            ChainError::Unavailable("rate limit exceeded, retry later".to_string()),
        ];
        for error in cases {
            assert_eq!(classify(&error), ErrorDisposition::Retryable, "{error}");
        }
    }

    #[test]
    fn test_stale_blockhash_is_retryable() {
        let error = ChainError::Rejected("Blockhash not found".to_string());
        assert_eq!(classify(&error), ErrorDisposition::Retryable);
    }

    #[test]
    fn test_transport_failures_are_retryable() {
        let cases = [
            ChainError::Io("request timed out after 30s".to_string()),
            ChainError::Io("connection reset by peer".to_string()),
            ChainError::Unavailable("network is unreachable".to_string()),
        ];
        for error in cases {
            assert_eq!(classify(&error), ErrorDisposition::Retryable, "{error}");
        }
    }

    #[test]
    fn test_program_rejections_are_fatal() {
        let cases = [
            ChainError::Rejected("account does not exist".to_string()),
            ChainError::Rejected("insufficient funds for fee".to_string()),
            ChainError::Rejected("custom program error: 0x1".to_string()),
        ];
        for error in cases {
            assert_eq!(classify(&error), ErrorDisposition::Fatal, "{error}");
        }
    }
}

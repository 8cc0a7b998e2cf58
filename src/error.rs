//! Error types for the settlement core.

use thiserror::Error;

use crate::domain::{MissionId, ProjectId, ProofId, ProofStatus};

/// Errors that can occur in the settlement core
#[derive(Error, Debug)]
pub enum SettlerError {
    /// Malformed input (blank wallet, empty message, zero points)
    #[error("validation error: {0}")]
    Validation(String),

    /// Wallet signature did not verify at submission
    #[error("signature verification failed")]
    SignatureInvalid,

    /// Proof not found
    #[error("proof not found: {0}")]
    ProofNotFound(ProofId),

    /// Mission unknown to the catalog
    #[error("mission not found: {project_id}/{mission_id}")]
    MissionNotFound {
        project_id: ProjectId,
        mission_id: MissionId,
    },

    /// Proof id already taken
    #[error("proof already exists: {0}")]
    AlreadyExists(ProofId),

    /// Operation requires a different derived status
    #[error("invalid state for proof {proof_id}: expected {expected}, got {actual}")]
    InvalidState {
        proof_id: ProofId,
        expected: ProofStatus,
        actual: ProofStatus,
    },

    /// Optimistic-lock write lost to a concurrent update
    #[error("concurrent update on proof {0}")]
    Conflict(ProofId),

    /// Trigger secret mismatch
    #[error("unauthorized settlement trigger")]
    Unauthorized,

    /// Store backend error
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Stored record could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for settlement operations
pub type Result<T> = std::result::Result<T, SettlerError>;

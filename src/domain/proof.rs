//! Proof records and their append-only event history.
//!
//! A proof's lifecycle status is never stored as a mutable column: it is
//! derived by folding the event list, oldest first, with the last decisive
//! event winning. All transition checks run against the derived status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::evidence_hash;

use super::{hash256_hex, Hash256, MissionId, ProjectId, ProofId, WalletAddress};

/// Reputation applied when a reviewer rejects a proof.
pub const REJECTED_REPUTATION_DELTA: i64 = -1;

/// A mission-completion proof submitted by a user wallet.
///
/// The record is append-only: decisions and revocations add events, nothing
/// is ever rewritten. `version` counts appends and backs the optimistic
/// concurrency check on writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proof {
    /// Globally unique proof identifier
    pub proof_id: ProofId,

    /// Project the mission belongs to (external catalog)
    pub project_id: ProjectId,

    /// Mission being proven (external catalog)
    pub mission_id: MissionId,

    /// Submitting user wallet
    pub wallet: WalletAddress,

    /// Message text the wallet signed
    pub message: String,

    /// Wallet signature over `message`, as supplied by the client
    pub signature: String,

    /// Submission evidence payload
    pub evidence: serde_json::Value,

    /// Hash of evidence for tamper detection, computed over canonical JSON
    #[serde(with = "hash256_hex")]
    pub evidence_hash: Hash256,

    /// Points earned; 0 until approved, then the mission weight
    pub points: u64,

    /// Reputation accumulated across decisions on this proof
    pub reputation_delta: i64,

    /// Append-only event history, oldest first
    pub events: Vec<ProofEvent>,

    /// Bumped by 1 on every append (optimistic concurrency)
    pub version: u64,

    pub created_at: DateTime<Utc>,

    /// Timestamp of the most recent event
    pub updated_at: DateTime<Utc>,
}

impl Proof {
    /// Create a proof from a validated submission, with its `Submitted`
    /// event already appended and the evidence hash computed.
    pub fn from_submission(submission: NewProof) -> Self {
        let proof_id = submission.proof_id.unwrap_or_default();
        let evidence_hash = evidence_hash(&submission.evidence);
        let submitted = ProofEvent::submitted(submission.wallet.clone());
        let now = submitted.at;

        Self {
            proof_id,
            project_id: submission.project_id,
            mission_id: submission.mission_id,
            wallet: submission.wallet,
            message: submission.message,
            signature: submission.signature,
            evidence: submission.evidence,
            evidence_hash,
            points: 0,
            reputation_delta: 0,
            events: vec![submitted],
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Current lifecycle status, derived from the event history.
    pub fn status(&self) -> ProofStatus {
        derive_status(&self.events)
    }

    /// Append an event, bumping the version and update timestamp.
    pub fn append(&mut self, event: ProofEvent) {
        self.updated_at = event.at;
        self.events.push(event);
        self.version += 1;
    }

    /// Verify the stored evidence hash matches the evidence.
    pub fn verify_evidence_hash(&self) -> bool {
        evidence_hash(&self.evidence) == self.evidence_hash
    }
}

/// Input for a proof submission. The caller supplies the signed evidence;
/// the proof id is minted here unless a fixed one is requested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProof {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_id: Option<ProofId>,
    pub project_id: ProjectId,
    pub mission_id: MissionId,
    pub wallet: WalletAddress,
    pub message: String,
    pub signature: String,
    pub evidence: serde_json::Value,
}

impl NewProof {
    pub fn new(
        project_id: ProjectId,
        mission_id: MissionId,
        wallet: WalletAddress,
        message: impl Into<String>,
        signature: impl Into<String>,
        evidence: serde_json::Value,
    ) -> Self {
        Self {
            proof_id: None,
            project_id,
            mission_id,
            wallet,
            message: message.into(),
            signature: signature.into(),
            evidence,
        }
    }

    /// Pin the proof id instead of minting one at submission.
    pub fn with_proof_id(mut self, proof_id: ProofId) -> Self {
        self.proof_id = Some(proof_id);
        self
    }
}

/// A single entry in a proof's event history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofEvent {
    pub event_id: Uuid,

    pub kind: ProofEventKind,

    /// Submitter on `Submitted`, reviewer/operator otherwise
    pub actor: WalletAddress,

    /// Reviewer note; absent on `Submitted`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    pub at: DateTime<Utc>,
}

impl ProofEvent {
    fn new(kind: ProofEventKind, actor: WalletAddress, reason: Option<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            kind,
            actor,
            reason,
            at: Utc::now(),
        }
    }

    pub fn submitted(actor: WalletAddress) -> Self {
        Self::new(ProofEventKind::Submitted, actor, None)
    }

    pub fn approved(actor: WalletAddress, reason: Option<String>) -> Self {
        Self::new(ProofEventKind::Approved, actor, reason)
    }

    pub fn rejected(actor: WalletAddress, reason: Option<String>) -> Self {
        Self::new(ProofEventKind::Rejected, actor, reason)
    }

    pub fn revoked(actor: WalletAddress, reason: Option<String>) -> Self {
        Self::new(ProofEventKind::Revoked, actor, reason)
    }
}

/// Kinds of proof events. Closed set: folds and transition checks match
/// exhaustively so a new variant cannot be added without revisiting them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofEventKind {
    Submitted,
    Approved,
    Rejected,
    Revoked,
}

/// Derived lifecycle status of a proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofStatus {
    Pending,
    Approved,
    Rejected,
    Revoked,
}

impl ProofStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProofStatus::Pending => "pending",
            ProofStatus::Approved => "approved",
            ProofStatus::Rejected => "rejected",
            ProofStatus::Revoked => "revoked",
        }
    }
}

impl std::fmt::Display for ProofStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reviewer decision on a pending proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

/// Fold the event history into the current status, oldest first.
///
/// Each event maps to the status it leaves the proof in; the last event
/// wins. An empty history folds to `Pending`, though the public API never
/// produces one (a proof is born with its `Submitted` event).
pub fn derive_status(events: &[ProofEvent]) -> ProofStatus {
    events
        .iter()
        .fold(ProofStatus::Pending, |_, event| match event.kind {
            ProofEventKind::Submitted => ProofStatus::Pending,
            ProofEventKind::Approved => ProofStatus::Approved,
            ProofEventKind::Rejected => ProofStatus::Rejected,
            ProofEventKind::Revoked => ProofStatus::Revoked,
        })
}

//! Settlement-side records: chain status per proof, worker batch reports,
//! and the reconciliation views.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ProofId, WalletAddress};

/// Where a proof's settlement stands against the chain.
///
/// Lifecycle: `Queued -> Submitted -> Finalized | Failed`. A `Failed`
/// record may return to `Queued` on retry; `Finalized` is terminal and
/// never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChainStatus {
    /// Waiting in the settlement queue
    #[default]
    Queued,
    /// Handed to the chain adapter; outcome unknown until it returns
    Submitted,
    /// Points credited on chain, terminal
    Finalized,
    /// Settlement failed with a non-retryable error
    Failed,
}

impl ChainStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChainStatus::Finalized)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChainStatus::Queued => "queued",
            ChainStatus::Submitted => "submitted",
            ChainStatus::Finalized => "finalized",
            ChainStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ChainStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One settlement record per proof, updated by upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainStatusRecord {
    pub proof_id: ProofId,

    pub wallet: WalletAddress,

    pub status: ChainStatus,

    /// Transaction reference returned by the chain adapter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_tx: Option<String>,

    /// Most recent settlement error for this proof
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl ChainStatusRecord {
    pub fn new(proof_id: ProofId, wallet: WalletAddress) -> Self {
        let now = Utc::now();
        Self {
            proof_id,
            wallet,
            status: ChainStatus::Queued,
            chain_tx: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge a patch into this record. Fields the patch leaves unset keep
    /// their stored values; `clear_error` beats an inherited error.
    pub fn apply(&mut self, patch: &ChainStatusPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(tx) = &patch.chain_tx {
            self.chain_tx = Some(tx.clone());
        }
        if patch.clear_error {
            self.last_error = None;
        } else if let Some(err) = &patch.last_error {
            self.last_error = Some(err.clone());
        }
        self.updated_at = Utc::now();
    }
}

/// Partial update for a chain status record. Unset fields inherit from
/// the stored record on upsert.
#[derive(Debug, Clone, Default)]
pub struct ChainStatusPatch {
    pub status: Option<ChainStatus>,
    pub chain_tx: Option<String>,
    pub last_error: Option<String>,
    pub clear_error: bool,
}

impl ChainStatusPatch {
    pub fn queued() -> Self {
        Self {
            status: Some(ChainStatus::Queued),
            ..Default::default()
        }
    }

    pub fn queued_with_error(error: impl Into<String>) -> Self {
        Self {
            status: Some(ChainStatus::Queued),
            last_error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn submitted() -> Self {
        Self {
            status: Some(ChainStatus::Submitted),
            ..Default::default()
        }
    }

    pub fn finalized(chain_tx: impl Into<String>) -> Self {
        Self {
            status: Some(ChainStatus::Finalized),
            chain_tx: Some(chain_tx.into()),
            clear_error: true,
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(ChainStatus::Failed),
            last_error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Outcome of one queue entry inside a worker batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedItem {
    pub proof_id: ProofId,

    /// True when the item finished without a failure (settled or skipped)
    pub ok: bool,

    /// True when the item was skipped as already finalized
    pub skipped: bool,

    /// Machine-readable note, e.g. "ALREADY_FINALIZED"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_tx: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessedItem {
    pub fn settled(proof_id: ProofId, chain_tx: impl Into<String>) -> Self {
        Self {
            proof_id,
            ok: true,
            skipped: false,
            reason: None,
            chain_tx: Some(chain_tx.into()),
            error: None,
        }
    }

    pub fn skipped(proof_id: ProofId, reason: impl Into<String>) -> Self {
        Self {
            proof_id,
            ok: true,
            skipped: true,
            reason: Some(reason.into()),
            chain_tx: None,
            error: None,
        }
    }

    pub fn failed(proof_id: ProofId, error: impl Into<String>) -> Self {
        Self {
            proof_id,
            ok: false,
            skipped: false,
            reason: None,
            chain_tx: None,
            error: Some(error.into()),
        }
    }

    /// Failure that was pushed back to the queue for a later attempt.
    pub fn requeued(proof_id: ProofId, error: impl Into<String>) -> Self {
        Self {
            proof_id,
            ok: false,
            skipped: false,
            reason: Some("REQUEUED".to_string()),
            chain_tx: None,
            error: Some(error.into()),
        }
    }
}

/// Summary of one settlement batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub items: Vec<ProcessedItem>,

    /// Items that ended in failure (requeued or failed)
    pub failures: u32,
}

impl BatchReport {
    pub fn push(&mut self, item: ProcessedItem) {
        if !item.ok {
            self.failures += 1;
        }
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Last failure message in batch order, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.items
            .iter()
            .rev()
            .find_map(|item| item.error.as_deref())
    }
}

/// Point-in-time snapshot of the settlement pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementStatus {
    pub queue_length: u64,
    pub finalized_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Verdict of an off-chain vs on-chain comparison for one wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileVerdict {
    Synced,
    OutOfSync,
    /// Chain side unreadable; no comparison possible
    Unknown,
}

impl std::fmt::Display for ReconcileVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Synced => write!(f, "synced"),
            Self::OutOfSync => write!(f, "out_of_sync"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Reconciliation result for one wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub wallet: WalletAddress,

    pub verdict: ReconcileVerdict,

    /// Sum of points on approved proofs for the wallet
    pub offchain_points: u64,

    /// Total read from the chain; absent when the read failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onchain_points: Option<u64>,

    /// offchain - onchain; positive means the chain is behind
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,

    /// Chain read error when the verdict is `Unknown`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a repair sweep over the proof index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepReport {
    /// Proofs examined
    pub scanned: u64,

    /// Approved proofs without a settlement record that were enqueued
    pub enqueued: u64,
}

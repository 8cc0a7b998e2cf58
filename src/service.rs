//! Settlement service facade.
//!
//! Wires the proof log, queue, tracker, worker, and reconciler over one
//! store and exposes the public operations. Callers construct it with
//! their chain adapters and verifier; everything else is internal.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::catalog::MissionCatalog;
use crate::chain::{ChainReader, ChainWriter};
use crate::crypto::trigger_secret_hash;
use crate::domain::{
    BatchReport, ChainStatus, ChainStatusPatch, ChainStatusRecord, Decision, NewProof, Proof,
    ProofId, ProofStatus, ReconcileReport, SettlementStatus, SweepReport, WalletAddress,
};
use crate::error::{Result, SettlerError};
use crate::log::ProofLog;
use crate::queue::SettlementQueue;
use crate::reconcile::Reconciler;
use crate::store::{keys, Store};
use crate::tracker::ChainStatusTracker;
use crate::verify::SignatureVerifier;
use crate::worker::{spawn_worker, SettlementWorker, WorkerConfig, WorkerMessage};

/// Facade over the settlement core.
pub struct SettlementService {
    store: Arc<dyn Store>,
    log: Arc<ProofLog>,
    queue: Arc<SettlementQueue>,
    tracker: Arc<ChainStatusTracker>,
    worker: Arc<SettlementWorker>,
    reconciler: Reconciler,
    /// Digest of the shared trigger secret; `None` disables the
    /// triggerable batch entirely.
    trigger_digest: Option<String>,
}

impl SettlementService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        catalog: Arc<dyn MissionCatalog>,
        verifier: Arc<dyn SignatureVerifier>,
        writer: Arc<dyn ChainWriter>,
        reader: Arc<dyn ChainReader>,
        worker_config: WorkerConfig,
        trigger_secret: Option<String>,
    ) -> Self {
        let log = Arc::new(ProofLog::new(store.clone(), catalog, verifier));
        let queue = Arc::new(SettlementQueue::new(store.clone()));
        let tracker = Arc::new(ChainStatusTracker::new(store.clone()));
        let worker = Arc::new(SettlementWorker::new(
            worker_config,
            store.clone(),
            log.clone(),
            queue.clone(),
            tracker.clone(),
            writer,
        ));
        let reconciler = Reconciler::new(log.clone(), queue.clone(), tracker.clone(), reader);
        let trigger_digest = trigger_secret
            .as_deref()
            .map(trigger_secret_hash);

        Self {
            store,
            log,
            queue,
            tracker,
            worker,
            reconciler,
            trigger_digest,
        }
    }

    /// Accept a signed proof submission.
    pub async fn submit_proof(&self, submission: NewProof) -> Result<Proof> {
        self.log.submit(submission).await
    }

    /// Apply a reviewer decision. Approval eagerly queues the proof for
    /// settlement; a failed enqueue is only logged because the sweep
    /// repairs it on its next pass.
    pub async fn decide_proof(
        &self,
        proof_id: &ProofId,
        decision: Decision,
        reviewer: WalletAddress,
        reason: Option<String>,
    ) -> Result<Proof> {
        let proof = self.log.decide(proof_id, decision, reviewer, reason).await?;

        if decision == Decision::Approve {
            if let Err(err) = self.queue_for_settlement(&proof).await {
                warn!(
                    proof_id = %proof.proof_id,
                    error = %err,
                    "Could not queue approved proof, sweep will retry"
                );
            }
        }

        Ok(proof)
    }

    async fn queue_for_settlement(&self, proof: &Proof) -> Result<bool> {
        let queued = self.queue.enqueue(&proof.proof_id).await?;
        self.tracker
            .upsert(&proof.proof_id, &proof.wallet, ChainStatusPatch::queued())
            .await?;
        Ok(queued)
    }

    /// Revoke an approved proof.
    pub async fn revoke_proof(
        &self,
        proof_id: &ProofId,
        actor: WalletAddress,
        reason: Option<String>,
    ) -> Result<Proof> {
        self.log.revoke(proof_id, actor, reason).await
    }

    /// Queue an approved proof for settlement. Idempotent; `false` when
    /// it was already queued.
    pub async fn enqueue_settlement(&self, proof_id: &ProofId) -> Result<bool> {
        let proof = self.log.get(proof_id).await?;
        let status = proof.status();
        if status != ProofStatus::Approved {
            return Err(SettlerError::InvalidState {
                proof_id: *proof_id,
                expected: ProofStatus::Approved,
                actual: status,
            });
        }
        self.queue_for_settlement(&proof).await
    }

    /// Run one settlement batch now.
    pub async fn run_settlement_batch(&self, max_items: Option<usize>) -> Result<BatchReport> {
        self.worker.run_batch(max_items).await
    }

    /// Operator-triggered batch, guarded by the shared secret.
    pub async fn trigger_settlement_batch(
        &self,
        secret: &str,
        max_items: Option<usize>,
    ) -> Result<BatchReport> {
        let Some(expected) = self.trigger_digest.as_deref() else {
            warn!("Settlement trigger called but no secret is configured");
            return Err(SettlerError::Unauthorized);
        };
        if trigger_secret_hash(secret) != expected {
            warn!("Settlement trigger with wrong secret");
            return Err(SettlerError::Unauthorized);
        }

        info!("Operator triggered settlement batch");
        self.worker.run_batch(max_items).await
    }

    /// Snapshot of the settlement pipeline.
    pub async fn settlement_status(&self) -> Result<SettlementStatus> {
        let queue_length = self.queue.len().await?;
        let finalized_count = self
            .store
            .get(keys::FINALIZED_COUNT)
            .await?
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0);
        let last_sync_at = self
            .store
            .get(keys::LAST_SYNC_AT)
            .await?
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|ts| ts.with_timezone(&Utc));
        let last_error = self.store.get(keys::LAST_ERROR).await?;

        Ok(SettlementStatus {
            queue_length,
            finalized_count,
            last_sync_at,
            last_error,
        })
    }

    /// Settlement record for one proof, if any.
    pub async fn chain_status(&self, proof_id: &ProofId) -> Result<Option<ChainStatusRecord>> {
        self.tracker.get(proof_id).await
    }

    /// Put a failed settlement back on the queue.
    ///
    /// Requires a `Failed` tracker record and a still-approved proof, so
    /// it cannot resurrect revoked proofs or double-settle finalized
    /// ones. Returns `false` when the id was already queued.
    pub async fn requeue_settlement(&self, proof_id: &ProofId) -> Result<bool> {
        let record = self.tracker.get(proof_id).await?.ok_or_else(|| {
            SettlerError::Validation(format!("no settlement record for {proof_id}"))
        })?;
        if record.status != ChainStatus::Failed {
            return Err(SettlerError::Validation(format!(
                "settlement for {proof_id} is {}, only failed settlements can be requeued",
                record.status
            )));
        }

        let proof = self.log.get(proof_id).await?;
        let status = proof.status();
        if status != ProofStatus::Approved {
            return Err(SettlerError::InvalidState {
                proof_id: *proof_id,
                expected: ProofStatus::Approved,
                actual: status,
            });
        }

        // Enqueue before patching; if the patch is lost the worker
        // still processes the entry, while the reverse order would
        // leave a Queued record nothing ever picks up.
        let queued = self.queue.enqueue(proof_id).await?;
        self.tracker
            .upsert(proof_id, &proof.wallet, ChainStatusPatch::queued())
            .await?;
        info!(proof_id = %proof_id, queued, "Failed settlement requeued");
        Ok(queued)
    }

    /// Off-chain vs on-chain comparison for one wallet.
    pub async fn reconcile_wallet(&self, wallet: &WalletAddress) -> Result<ReconcileReport> {
        self.reconciler.wallet_report(wallet).await
    }

    /// Repair pass over the proof index.
    pub async fn sweep_settlements(&self) -> Result<SweepReport> {
        self.reconciler.sweep().await
    }

    /// Wipe the settlement queue, its membership set, and the aggregate
    /// counters. Chain status records survive the reset: a finalized
    /// settlement must never become settleable again, and failed ones
    /// keep their error history for the operator.
    pub async fn reset_settlement_state(&self) -> Result<()> {
        self.queue.clear().await?;
        self.store.delete(keys::FINALIZED_COUNT).await?;
        self.store.delete(keys::LAST_SYNC_AT).await?;
        self.store.delete(keys::LAST_ERROR).await?;
        warn!("Settlement queue and counters reset");
        Ok(())
    }

    /// Fetch a proof by id.
    pub async fn get_proof(&self, proof_id: &ProofId) -> Result<Proof> {
        self.log.get(proof_id).await
    }

    /// All proofs submitted by a wallet, in submission order.
    pub async fn list_wallet_proofs(&self, wallet: &WalletAddress) -> Result<Vec<Proof>> {
        self.log.list_wallet(wallet).await
    }

    /// Start the periodic worker loop for this service.
    pub fn spawn_worker(
        &self,
    ) -> (tokio::task::JoinHandle<()>, mpsc::Sender<WorkerMessage>) {
        spawn_worker(self.worker.clone())
    }
}

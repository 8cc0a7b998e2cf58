//! Reconciliation between the proof log and the chain.
//!
//! `wallet_report` compares the approved off-chain points of one wallet
//! with the total the chain reader sees. `sweep` is the repair pass that
//! backs up eager enqueue-at-approval: any approved proof that never got
//! a settlement record is put back on the queue.

use std::sync::Arc;

use tracing::{info, warn};

use crate::chain::ChainReader;
use crate::domain::{
    ProofStatus, ReconcileReport, ReconcileVerdict, SweepReport, WalletAddress,
};
use crate::error::{Result, SettlerError};
use crate::log::ProofLog;
use crate::queue::SettlementQueue;
use crate::tracker::ChainStatusTracker;

/// Compares off-chain state with the chain and repairs missed enqueues.
pub struct Reconciler {
    log: Arc<ProofLog>,
    queue: Arc<SettlementQueue>,
    tracker: Arc<ChainStatusTracker>,
    reader: Arc<dyn ChainReader>,
}

impl Reconciler {
    pub fn new(
        log: Arc<ProofLog>,
        queue: Arc<SettlementQueue>,
        tracker: Arc<ChainStatusTracker>,
        reader: Arc<dyn ChainReader>,
    ) -> Self {
        Self {
            log,
            queue,
            tracker,
            reader,
        }
    }

    /// Compare one wallet's approved points with its on-chain total.
    ///
    /// A failed chain read yields `Unknown` with the error recorded
    /// rather than an `Err`; the off-chain side of the report is still
    /// filled in.
    pub async fn wallet_report(&self, wallet: &WalletAddress) -> Result<ReconcileReport> {
        let proofs = self.log.list_wallet(wallet).await?;
        let offchain_points: u64 = proofs
            .iter()
            .filter(|proof| proof.status() == ProofStatus::Approved)
            .map(|proof| proof.points)
            .sum();

        match self.reader.wallet_total(wallet).await {
            Ok(onchain_points) => {
                let delta = i64::try_from(
                    i128::from(offchain_points) - i128::from(onchain_points),
                )
                .map_err(|_| {
                    SettlerError::Internal(format!(
                        "reconciliation delta for {wallet} exceeds the supported range"
                    ))
                })?;
                let verdict = if delta == 0 {
                    ReconcileVerdict::Synced
                } else {
                    ReconcileVerdict::OutOfSync
                };
                info!(
                    wallet = %wallet,
                    offchain = offchain_points,
                    onchain = onchain_points,
                    verdict = %verdict,
                    "Wallet reconciled"
                );
                Ok(ReconcileReport {
                    wallet: wallet.clone(),
                    verdict,
                    offchain_points,
                    onchain_points: Some(onchain_points),
                    delta: Some(delta),
                    error: None,
                })
            }
            Err(err) => {
                warn!(wallet = %wallet, error = %err, "Chain read failed during reconciliation");
                Ok(ReconcileReport {
                    wallet: wallet.clone(),
                    verdict: ReconcileVerdict::Unknown,
                    offchain_points,
                    onchain_points: None,
                    delta: None,
                    error: Some(err.to_string()),
                })
            }
        }
    }

    /// Enqueue every approved proof that has no settlement record.
    ///
    /// Failed settlements keep their record and are not picked up here;
    /// re-running those is an explicit operator action.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let ids = self.log.list_ids().await?;
        let mut report = SweepReport::default();

        for proof_id in ids {
            report.scanned += 1;

            let proof = match self.log.get(&proof_id).await {
                Ok(proof) => proof,
                Err(SettlerError::ProofNotFound(_)) => {
                    warn!(proof_id = %proof_id, "Index entry without proof record");
                    continue;
                }
                Err(err) => return Err(err),
            };

            if proof.status() != ProofStatus::Approved {
                continue;
            }
            if self.tracker.has_record(&proof_id).await? {
                continue;
            }
            if self.queue.enqueue(&proof_id).await? {
                report.enqueued += 1;
            }
        }

        info!(
            scanned = report.scanned,
            enqueued = report.enqueued,
            "Settlement sweep complete"
        );

        Ok(report)
    }
}

//! Batch settlement worker.
//!
//! Drains the settlement queue in bounded batches, pushing approved
//! points through the chain writer. Eligibility and idempotency are
//! checked at processing time, so anything that changed between enqueue
//! and processing (a revocation, an earlier finalization) is caught here
//! rather than trusted from the queue.
//!
//! # Configuration
//!
//! - `SETTLE_BATCH_MAX_ITEMS` - Maximum queue entries per batch (default: 10)
//! - `SETTLE_RETRY_BACKOFF_MS` - Pause after a retryable failure (default: 2000)
//! - `SETTLE_THROTTLE_MS` - Pause between items (default: 250)
//! - `SETTLE_BATCH_INTERVAL_SECS` - Scheduler tick (default: 60)

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::chain::{classify, ChainWriter, ErrorDisposition};
use crate::domain::{
    BatchReport, ChainStatus, ChainStatusPatch, ProcessedItem, ProofId, ProofStatus, WalletAddress,
};
use crate::error::{Result, SettlerError};
use crate::log::ProofLog;
use crate::queue::SettlementQueue;
use crate::retry::BackoffPolicy;
use crate::store::{keys, Store};
use crate::tracker::ChainStatusTracker;

/// Tuning for the settlement worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum queue entries one batch processes
    pub max_items: usize,
    /// Delays applied during the batch
    pub backoff: BackoffPolicy,
    /// How often the scheduler runs a batch
    pub batch_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_items: 10,
            backoff: BackoffPolicy::default(),
            batch_interval: Duration::from_secs(60),
        }
    }
}

impl WorkerConfig {
    /// Load configuration from environment
    pub fn from_env() -> Self {
        let max_items = std::env::var("SETTLE_BATCH_MAX_ITEMS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        let retry_backoff = std::env::var("SETTLE_RETRY_BACKOFF_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(2_000));

        let throttle = std::env::var("SETTLE_THROTTLE_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(250));

        let batch_interval = std::env::var("SETTLE_BATCH_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(60));

        Self {
            max_items,
            backoff: BackoffPolicy::new(retry_backoff, throttle),
            batch_interval,
        }
    }
}

/// Control messages for the scheduled worker loop
#[derive(Debug)]
pub enum WorkerMessage {
    /// Run a batch immediately
    ForceBatch,
    /// Stop the loop
    Shutdown,
}

/// Processes settlement batches against the chain writer.
pub struct SettlementWorker {
    config: WorkerConfig,
    store: Arc<dyn Store>,
    log: Arc<ProofLog>,
    queue: Arc<SettlementQueue>,
    tracker: Arc<ChainStatusTracker>,
    writer: Arc<dyn ChainWriter>,
}

impl SettlementWorker {
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn Store>,
        log: Arc<ProofLog>,
        queue: Arc<SettlementQueue>,
        tracker: Arc<ChainStatusTracker>,
        writer: Arc<dyn ChainWriter>,
    ) -> Self {
        Self {
            config,
            store,
            log,
            queue,
            tracker,
            writer,
        }
    }

    /// Process at most `max_items` queue entries (config default when
    /// `None`), then refresh the aggregate settlement state.
    ///
    /// Item failures never abort the batch: every outcome lands in the
    /// report and on the tracker. An `Err` here means the batch frame
    /// itself broke, e.g. the queue could not be read.
    pub async fn run_batch(&self, max_items: Option<usize>) -> Result<BatchReport> {
        let limit = max_items.unwrap_or(self.config.max_items);
        let mut report = BatchReport::default();
        let mut seen: HashSet<ProofId> = HashSet::new();

        while report.len() < limit {
            let Some(proof_id) = self.queue.dequeue().await? else {
                break;
            };

            // A repeat inside one batch is a retry we already backed
            // off for; park it for the next run.
            if !seen.insert(proof_id) {
                self.queue.enqueue(&proof_id).await?;
                break;
            }

            if !report.is_empty() {
                self.config.backoff.between_items().await;
            }

            let item = match self.process_item(&proof_id).await {
                Ok(item) => item,
                Err(err) => {
                    error!(proof_id = %proof_id, error = %err, "Settlement item broke out of pipeline");
                    let message = err.to_string();
                    if let Err(tracker_err) = self
                        .tracker
                        .upsert(
                            &proof_id,
                            &WalletAddress::from(""),
                            ChainStatusPatch::failed(&message),
                        )
                        .await
                    {
                        error!(proof_id = %proof_id, error = %tracker_err, "Could not record item failure");
                    }
                    ProcessedItem::failed(proof_id, message)
                }
            };
            report.push(item);
        }

        self.store
            .set(keys::LAST_SYNC_AT, &Utc::now().to_rfc3339())
            .await?;
        match report.last_error() {
            Some(last_error) => {
                self.store.set(keys::LAST_ERROR, last_error).await?;
            }
            None => {
                self.store.delete(keys::LAST_ERROR).await?;
            }
        }

        info!(
            processed = report.len(),
            failures = report.failures,
            "Settlement batch complete"
        );

        Ok(report)
    }

    /// Run one queue entry through the settlement pipeline.
    async fn process_item(&self, proof_id: &ProofId) -> Result<ProcessedItem> {
        let proof = match self.log.get(proof_id).await {
            Ok(proof) => proof,
            Err(SettlerError::ProofNotFound(_)) => {
                let message = "proof record missing";
                warn!(proof_id = %proof_id, "Queued proof has no record");
                self.tracker
                    .upsert(
                        proof_id,
                        &WalletAddress::from(""),
                        ChainStatusPatch::failed(message),
                    )
                    .await?;
                return Ok(ProcessedItem::failed(*proof_id, message));
            }
            Err(err) => return Err(err),
        };

        let status = proof.status();
        if status != ProofStatus::Approved {
            let message = format!("not eligible for settlement: status is {status}");
            warn!(proof_id = %proof_id, status = %status, "Skipping ineligible proof");
            self.tracker
                .upsert(proof_id, &proof.wallet, ChainStatusPatch::failed(&message))
                .await?;
            return Ok(ProcessedItem::failed(*proof_id, message));
        }

        if let Some(record) = self.tracker.get(proof_id).await? {
            if record.status == ChainStatus::Finalized {
                debug!(proof_id = %proof_id, "Already finalized, skipping");
                return Ok(ProcessedItem::skipped(*proof_id, "ALREADY_FINALIZED"));
            }
        }

        if proof.wallet.is_empty() {
            let message = "cannot settle: wallet is empty";
            self.tracker
                .upsert(proof_id, &proof.wallet, ChainStatusPatch::failed(message))
                .await?;
            return Ok(ProcessedItem::failed(*proof_id, message));
        }
        if proof.points == 0 {
            let message = "cannot settle: proof has zero points";
            self.tracker
                .upsert(proof_id, &proof.wallet, ChainStatusPatch::failed(message))
                .await?;
            return Ok(ProcessedItem::failed(*proof_id, message));
        }

        // Record the attempt before calling out, so a crash mid-call
        // leaves a Submitted record instead of a silent Queued one.
        self.tracker
            .upsert(proof_id, &proof.wallet, ChainStatusPatch::submitted())
            .await?;

        match self
            .writer
            .add_points(&proof.wallet, proof.points, proof_id)
            .await
        {
            Ok(chain_tx) => {
                self.tracker
                    .upsert(proof_id, &proof.wallet, ChainStatusPatch::finalized(&chain_tx))
                    .await?;
                let total = self.store.incr(keys::FINALIZED_COUNT, 1).await?;
                info!(
                    proof_id = %proof_id,
                    wallet = %proof.wallet,
                    points = proof.points,
                    chain_tx = %chain_tx,
                    finalized_total = total,
                    "Settlement finalized"
                );
                Ok(ProcessedItem::settled(*proof_id, chain_tx))
            }
            Err(chain_err) => {
                let message = chain_err.to_string();
                match classify(&chain_err) {
                    ErrorDisposition::Retryable => {
                        warn!(
                            proof_id = %proof_id,
                            error = %message,
                            "Retryable settlement failure, requeueing"
                        );
                        self.tracker
                            .upsert(
                                proof_id,
                                &proof.wallet,
                                ChainStatusPatch::queued_with_error(&message),
                            )
                            .await?;
                        self.config.backoff.after_retryable().await;
                        self.queue.enqueue(proof_id).await?;
                        Ok(ProcessedItem::requeued(*proof_id, message))
                    }
                    ErrorDisposition::Fatal => {
                        warn!(
                            proof_id = %proof_id,
                            error = %message,
                            "Fatal settlement failure"
                        );
                        self.tracker
                            .upsert(proof_id, &proof.wallet, ChainStatusPatch::failed(&message))
                            .await?;
                        Ok(ProcessedItem::failed(*proof_id, message))
                    }
                }
            }
        }
    }
}

/// Spawn the worker on a periodic schedule with a control channel.
///
/// The loop runs a batch every `batch_interval`, immediately on
/// `ForceBatch`, and exits on `Shutdown` or when every sender is gone.
pub fn spawn_worker(
    worker: Arc<SettlementWorker>,
) -> (tokio::task::JoinHandle<()>, mpsc::Sender<WorkerMessage>) {
    let (control_tx, mut control_rx) = mpsc::channel::<WorkerMessage>(16);
    let tick = worker.config.batch_interval;

    let handle = tokio::spawn(async move {
        info!(
            interval_secs = tick.as_secs(),
            max_items = worker.config.max_items,
            "Starting settlement worker"
        );

        let mut ticker = interval(tick);
        // The first tick fires immediately; skip it so startup does not
        // race schema setup in embedded deployments.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = worker.run_batch(None).await {
                        error!(error = %e, "Scheduled settlement batch failed");
                    }
                }
                msg = control_rx.recv() => {
                    match msg {
                        Some(WorkerMessage::ForceBatch) => {
                            info!("Forcing settlement batch");
                            if let Err(e) = worker.run_batch(None).await {
                                error!(error = %e, "Forced settlement batch failed");
                            }
                        }
                        Some(WorkerMessage::Shutdown) | None => {
                            info!("Settlement worker shutting down");
                            break;
                        }
                    }
                }
            }
        }
    });

    (handle, control_tx)
}

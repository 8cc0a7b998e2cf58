//! Integration tests for the settlement pipeline
//!
//! Exercises the full flow through the service facade:
//! - Proof submission, decision, and revocation
//! - Queue deduplication and batch settlement
//! - Retry, requeue, and idempotency behavior
//! - Reconciliation, sweep, and state reset

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use questline_settler::domain::{
    ChainStatus, Decision, ProofId, ProofStatus, ReconcileVerdict, WalletAddress,
};
use questline_settler::store::{MemoryStore, Store};
use questline_settler::worker::WorkerMessage;
use questline_settler::{SettlementService, SettlerError};

async fn approved_proof(service: &SettlementService, wallet: &WalletAddress) -> ProofId {
    let proof = service.submit_proof(submission(wallet)).await.unwrap();
    service
        .decide_proof(&proof.proof_id, Decision::Approve, reviewer(), None)
        .await
        .unwrap();
    proof.proof_id
}

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test]
async fn test_submit_approve_settle() {
    let (service, writer) = default_service().await;
    let wallet = test_wallet();
    let proof_id = approved_proof(&service, &wallet).await;

    let report = service.run_settlement_batch(None).await.unwrap();
    assert_eq!(report.len(), 1);
    assert_eq!(report.failures, 0);
    assert!(report.items[0].ok);
    assert_eq!(report.items[0].chain_tx.as_deref(), Some("tx-1"));

    let record = service.chain_status(&proof_id).await.unwrap().unwrap();
    assert_eq!(record.status, ChainStatus::Finalized);
    assert_eq!(record.chain_tx.as_deref(), Some("tx-1"));
    assert!(record.last_error.is_none());

    // The chain saw the mission weight for the right wallet
    let calls = writer.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, wallet.as_str());
    assert_eq!(calls[0].1, 40);
    assert_eq!(calls[0].2, proof_id);
    drop(calls);

    let status = service.settlement_status().await.unwrap();
    assert_eq!(status.queue_length, 0);
    assert_eq!(status.finalized_count, 1);
    assert!(status.last_sync_at.is_some());
    assert!(status.last_error.is_none());
}

#[tokio::test]
async fn test_batch_settles_wallets_in_submission_order() {
    let (service, writer) = default_service().await;
    let first = approved_proof(&service, &test_wallet()).await;

    let side = service
        .submit_proof(side_submission(&other_wallet()))
        .await
        .unwrap();
    service
        .decide_proof(&side.proof_id, Decision::Approve, reviewer(), None)
        .await
        .unwrap();

    let report = service.run_settlement_batch(None).await.unwrap();
    assert_eq!(report.len(), 2);
    assert_eq!(report.failures, 0);

    let calls = writer.calls.lock().unwrap();
    assert_eq!(calls[0].2, first);
    assert_eq!(calls[0].1, 40);
    assert_eq!(calls[1].2, side.proof_id);
    assert_eq!(calls[1].1, 15);
}

// ============================================================================
// Validation and deduplication
// ============================================================================

#[tokio::test]
async fn test_duplicate_submission_rejected() {
    let (service, _) = default_service().await;
    let mut dup = submission(&test_wallet());
    dup.proof_id = Some(fixed_proof_id());

    service.submit_proof(dup.clone()).await.unwrap();
    let err = service.submit_proof(dup).await.unwrap_err();
    assert!(matches!(err, SettlerError::AlreadyExists(_)));
}

#[tokio::test]
async fn test_enqueue_is_idempotent() {
    let (service, _) = default_service().await;
    let proof_id = approved_proof(&service, &test_wallet()).await;

    // Approval already queued it
    assert!(!service.enqueue_settlement(&proof_id).await.unwrap());
    let status = service.settlement_status().await.unwrap();
    assert_eq!(status.queue_length, 1);
}

#[tokio::test]
async fn test_pending_proof_cannot_be_enqueued() {
    let (service, _) = default_service().await;
    let proof = service.submit_proof(submission(&test_wallet())).await.unwrap();

    let err = service.enqueue_settlement(&proof.proof_id).await.unwrap_err();
    assert!(matches!(
        err,
        SettlerError::InvalidState {
            actual: ProofStatus::Pending,
            ..
        }
    ));
}

#[tokio::test]
async fn test_concurrent_decisions_only_one_wins() {
    let (service, _) = default_service().await;
    let service = Arc::new(service);
    let proof = service.submit_proof(submission(&test_wallet())).await.unwrap();

    let approve = {
        let service = service.clone();
        let id = proof.proof_id;
        tokio::spawn(async move {
            service
                .decide_proof(&id, Decision::Approve, reviewer(), None)
                .await
        })
    };
    let reject = {
        let service = service.clone();
        let id = proof.proof_id;
        tokio::spawn(async move {
            service
                .decide_proof(&id, Decision::Reject, reviewer(), None)
                .await
        })
    };

    let outcomes = [approve.await.unwrap(), reject.await.unwrap()];
    let wins = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1);

    // History holds exactly one decision event
    let settled = service.get_proof(&proof.proof_id).await.unwrap();
    assert_eq!(settled.events.len(), 2);
    assert_eq!(settled.version, 2);
}

// ============================================================================
// Failure handling
// ============================================================================

#[tokio::test]
async fn test_retryable_failure_requeues_then_settles() {
    let writer = Arc::new(ScriptedWriter::with_script(vec![
        WriterStep::Retryable("rpc timeout while sending"),
        WriterStep::Ok("tx-second-try"),
    ]));
    let service = build_service(
        writer.clone(),
        Arc::new(StaticReader::with_totals(&[])),
        None,
    )
    .await;
    let proof_id = approved_proof(&service, &test_wallet()).await;

    let report = service.run_settlement_batch(None).await.unwrap();
    assert_eq!(report.len(), 1);
    assert_eq!(report.failures, 1);
    assert_eq!(report.items[0].reason.as_deref(), Some("REQUEUED"));

    let record = service.chain_status(&proof_id).await.unwrap().unwrap();
    assert_eq!(record.status, ChainStatus::Queued);
    assert!(record.last_error.as_deref().unwrap().contains("timeout"));

    let status = service.settlement_status().await.unwrap();
    assert_eq!(status.queue_length, 1);
    assert!(status.last_error.is_some());

    // Next batch picks it up and succeeds
    let report = service.run_settlement_batch(None).await.unwrap();
    assert_eq!(report.failures, 0);
    assert_eq!(writer.call_count(), 2);

    let record = service.chain_status(&proof_id).await.unwrap().unwrap();
    assert_eq!(record.status, ChainStatus::Finalized);
    assert_eq!(record.chain_tx.as_deref(), Some("tx-second-try"));
    assert!(record.last_error.is_none());

    let status = service.settlement_status().await.unwrap();
    assert_eq!(status.queue_length, 0);
    assert!(status.last_error.is_none());
}

#[tokio::test]
async fn test_fatal_failure_stays_failed_until_requeued() {
    let writer = Arc::new(ScriptedWriter::with_script(vec![WriterStep::Fatal(
        "mission account does not exist",
    )]));
    let service = build_service(
        writer.clone(),
        Arc::new(StaticReader::with_totals(&[])),
        None,
    )
    .await;
    let proof_id = approved_proof(&service, &test_wallet()).await;

    service.run_settlement_batch(None).await.unwrap();
    let record = service.chain_status(&proof_id).await.unwrap().unwrap();
    assert_eq!(record.status, ChainStatus::Failed);

    // Not retried on its own
    let report = service.run_settlement_batch(None).await.unwrap();
    assert!(report.is_empty());
    assert_eq!(writer.call_count(), 1);

    // Operator requeue brings it back through the normal path
    assert!(service.requeue_settlement(&proof_id).await.unwrap());
    service.run_settlement_batch(None).await.unwrap();

    let record = service.chain_status(&proof_id).await.unwrap().unwrap();
    assert_eq!(record.status, ChainStatus::Finalized);
    assert_eq!(writer.call_count(), 2);
}

#[tokio::test]
async fn test_finalized_proof_is_not_settled_twice() {
    let (service, writer) = default_service().await;
    let proof_id = approved_proof(&service, &test_wallet()).await;

    service.run_settlement_batch(None).await.unwrap();
    assert_eq!(writer.call_count(), 1);

    // Force it back onto the queue; the worker must skip it
    assert!(service.enqueue_settlement(&proof_id).await.unwrap());
    let report = service.run_settlement_batch(None).await.unwrap();
    assert_eq!(report.len(), 1);
    assert!(report.items[0].skipped);
    assert_eq!(report.items[0].reason.as_deref(), Some("ALREADY_FINALIZED"));
    assert_eq!(writer.call_count(), 1);

    let status = service.settlement_status().await.unwrap();
    assert_eq!(status.finalized_count, 1);
}

#[tokio::test]
async fn test_revoked_proof_fails_settlement_without_chain_call() {
    let (service, writer) = default_service().await;
    let proof_id = approved_proof(&service, &test_wallet()).await;

    service
        .revoke_proof(&proof_id, reviewer(), Some("duplicate account".into()))
        .await
        .unwrap();

    let report = service.run_settlement_batch(None).await.unwrap();
    assert_eq!(report.failures, 1);
    assert_eq!(writer.call_count(), 0);

    let record = service.chain_status(&proof_id).await.unwrap().unwrap();
    assert_eq!(record.status, ChainStatus::Failed);
    assert!(record
        .last_error
        .as_deref()
        .unwrap()
        .contains("revoked"));
}

#[tokio::test]
async fn test_one_bad_item_does_not_block_the_rest() {
    let writer = Arc::new(ScriptedWriter::with_script(vec![
        WriterStep::Fatal("frozen account"),
        WriterStep::Ok("tx-ok"),
    ]));
    let service = build_service(
        writer.clone(),
        Arc::new(StaticReader::with_totals(&[])),
        None,
    )
    .await;

    let bad = approved_proof(&service, &test_wallet()).await;
    let good = approved_proof(&service, &other_wallet()).await;

    let report = service.run_settlement_batch(None).await.unwrap();
    assert_eq!(report.len(), 2);
    assert_eq!(report.failures, 1);

    let bad_record = service.chain_status(&bad).await.unwrap().unwrap();
    assert_eq!(bad_record.status, ChainStatus::Failed);
    let good_record = service.chain_status(&good).await.unwrap().unwrap();
    assert_eq!(good_record.status, ChainStatus::Finalized);
}

// ============================================================================
// Batch limits
// ============================================================================

#[tokio::test]
async fn test_max_items_bounds_the_batch() {
    let (service, writer) = default_service().await;
    for _ in 0..3 {
        approved_proof(&service, &test_wallet()).await;
    }

    let report = service.run_settlement_batch(Some(2)).await.unwrap();
    assert_eq!(report.len(), 2);
    assert_eq!(writer.call_count(), 2);

    let status = service.settlement_status().await.unwrap();
    assert_eq!(status.queue_length, 1);

    service.run_settlement_batch(None).await.unwrap();
    let status = service.settlement_status().await.unwrap();
    assert_eq!(status.queue_length, 0);
    assert_eq!(status.finalized_count, 3);
}

// ============================================================================
// Triggered batches
// ============================================================================

#[tokio::test]
async fn test_triggered_batch_requires_the_shared_secret() {
    let writer = Arc::new(ScriptedWriter::ok());
    let service = build_service(
        writer.clone(),
        Arc::new(StaticReader::with_totals(&[])),
        Some("hunter2"),
    )
    .await;
    approved_proof(&service, &test_wallet()).await;

    let err = service
        .trigger_settlement_batch("wrong", None)
        .await
        .unwrap_err();
    assert!(matches!(err, SettlerError::Unauthorized));
    assert_eq!(writer.call_count(), 0);

    let report = service
        .trigger_settlement_batch("hunter2", None)
        .await
        .unwrap();
    assert_eq!(report.len(), 1);
    assert_eq!(writer.call_count(), 1);
}

// ============================================================================
// Scheduler
// ============================================================================

#[tokio::test]
async fn test_spawned_worker_settles_on_force_batch() {
    let (service, writer) = default_service().await;
    approved_proof(&service, &test_wallet()).await;

    let (handle, control) = service.spawn_worker();
    control.send(WorkerMessage::ForceBatch).await.unwrap();

    // Wait for the batch to land
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if writer.call_count() == 1 {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "batch never ran");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    control.send(WorkerMessage::Shutdown).await.unwrap();
    handle.await.unwrap();

    let status = service.settlement_status().await.unwrap();
    assert_eq!(status.finalized_count, 1);
}

// ============================================================================
// Reconciliation and repair
// ============================================================================

#[tokio::test]
async fn test_reconcile_wallet_verdicts() {
    let wallet = test_wallet();
    let behind = other_wallet();
    let reader = Arc::new(StaticReader::with_totals(&[(&wallet, 40), (&behind, 0)]));
    let service = build_service(Arc::new(ScriptedWriter::ok()), reader, None).await;

    approved_proof(&service, &wallet).await;
    approved_proof(&service, &behind).await;

    let report = service.reconcile_wallet(&wallet).await.unwrap();
    assert_eq!(report.verdict, ReconcileVerdict::Synced);
    assert_eq!(report.offchain_points, 40);
    assert_eq!(report.onchain_points, Some(40));
    assert_eq!(report.delta, Some(0));

    let report = service.reconcile_wallet(&behind).await.unwrap();
    assert_eq!(report.verdict, ReconcileVerdict::OutOfSync);
    assert_eq!(report.delta, Some(40));
}

#[tokio::test]
async fn test_reconcile_survives_unreachable_chain() {
    let service = build_service(
        Arc::new(ScriptedWriter::ok()),
        Arc::new(StaticReader::unreachable()),
        None,
    )
    .await;
    approved_proof(&service, &test_wallet()).await;

    let report = service.reconcile_wallet(&test_wallet()).await.unwrap();
    assert_eq!(report.verdict, ReconcileVerdict::Unknown);
    assert_eq!(report.offchain_points, 40);
    assert!(report.onchain_points.is_none());
    assert!(report.error.is_some());
}

#[tokio::test]
async fn test_sweep_repairs_lost_enqueues() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let writer = Arc::new(ScriptedWriter::ok());
    let service = build_service_on(
        store.clone(),
        writer.clone(),
        Arc::new(StaticReader::with_totals(&[])),
        None,
    )
    .await;
    let proof_id = approved_proof(&service, &test_wallet()).await;

    // Lose the queue entry and the tracker record, as a crashed
    // process between the decision write and the enqueue would
    store.clear_prefix("settle:").await.unwrap();
    let status = service.settlement_status().await.unwrap();
    assert_eq!(status.queue_length, 0);

    let report = service.sweep_settlements().await.unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.enqueued, 1);

    // Second sweep finds nothing new
    let report = service.sweep_settlements().await.unwrap();
    assert_eq!(report.enqueued, 0);

    service.run_settlement_batch(None).await.unwrap();
    let record = service.chain_status(&proof_id).await.unwrap().unwrap();
    assert_eq!(record.status, ChainStatus::Finalized);
}

#[tokio::test]
async fn test_reset_preserves_proofs_and_settlement_records() {
    let (service, _) = default_service().await;
    let proof_id = approved_proof(&service, &test_wallet()).await;
    service.run_settlement_batch(None).await.unwrap();

    service.reset_settlement_state().await.unwrap();

    let status = service.settlement_status().await.unwrap();
    assert_eq!(status.finalized_count, 0);
    assert!(status.last_sync_at.is_none());

    // The finalized record survives the reset
    let record = service.chain_status(&proof_id).await.unwrap().unwrap();
    assert_eq!(record.status, ChainStatus::Finalized);

    let proof = service.get_proof(&proof_id).await.unwrap();
    assert_eq!(proof.status(), ProofStatus::Approved);

    let listed = service.list_wallet_proofs(&test_wallet()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].proof_id, proof_id);
}

#[tokio::test]
async fn test_reset_then_sweep_never_resettles_a_finalized_proof() {
    let (service, writer) = default_service().await;
    let proof_id = approved_proof(&service, &test_wallet()).await;

    service.run_settlement_batch(None).await.unwrap();
    assert_eq!(writer.call_count(), 1);

    service.reset_settlement_state().await.unwrap();

    // The surviving record keeps the sweep away from the proof
    let report = service.sweep_settlements().await.unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.enqueued, 0);

    let report = service.run_settlement_batch(None).await.unwrap();
    assert!(report.is_empty());
    assert_eq!(writer.call_count(), 1, "proof must settle exactly once");

    let record = service.chain_status(&proof_id).await.unwrap().unwrap();
    assert_eq!(record.status, ChainStatus::Finalized);
    assert_eq!(record.chain_tx.as_deref(), Some("tx-1"));
}

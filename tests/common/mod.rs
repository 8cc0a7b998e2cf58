//! Common test utilities and fixtures for integration tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use questline_settler::catalog::StaticCatalog;
use questline_settler::chain::{ChainError, ChainReader, ChainWriter};
use questline_settler::domain::{MissionId, NewProof, ProofId, ProjectId, WalletAddress};
use questline_settler::retry::BackoffPolicy;
use questline_settler::store::{MemoryStore, Store};
use questline_settler::verify::Preverified;
use questline_settler::worker::WorkerConfig;
use questline_settler::SettlementService;

/// Test project ID
pub fn test_project_id() -> ProjectId {
    ProjectId::from("proj-guilds")
}

/// Test mission ID, worth 40 points in the test catalog
pub fn test_mission_id() -> MissionId {
    MissionId::from("mission-first-swap")
}

/// Second mission, worth 15 points
pub fn side_mission_id() -> MissionId {
    MissionId::from("mission-join-discord")
}

/// Test wallet address
pub fn test_wallet() -> WalletAddress {
    WalletAddress::from("9xQeWvG816bUx46kWKVrcmkqXSuNxvGRnnn1rdFTcPoc")
}

/// A second wallet, for cross-wallet assertions
pub fn other_wallet() -> WalletAddress {
    WalletAddress::from("4rL4RCWHz3iNCdCaveD8KcHfV9YWGsqSHFPo7X2zBNwa")
}

/// Reviewer identity used for decisions
pub fn reviewer() -> WalletAddress {
    WalletAddress::from("reviewer-ops")
}

/// Fixed proof ID for deterministic assertions
pub fn fixed_proof_id() -> ProofId {
    ProofId::from_uuid(Uuid::parse_str("11111111-1111-1111-1111-111111111111").unwrap())
}

/// A proof submission for the 40-point test mission
pub fn submission(wallet: &WalletAddress) -> NewProof {
    NewProof::new(
        test_project_id(),
        test_mission_id(),
        wallet.clone(),
        "swapped 10 USDC on devnet",
        "sig-ed25519-stub",
        json!({ "tx": "5gW8...", "amount": 10 }),
    )
}

/// A proof submission for the 15-point side mission
pub fn side_submission(wallet: &WalletAddress) -> NewProof {
    NewProof::new(
        test_project_id(),
        side_mission_id(),
        wallet.clone(),
        "joined the server",
        "sig-ed25519-stub",
        json!({ "discord_id": "user#1234" }),
    )
}

/// One scripted outcome for the fake chain writer.
pub enum WriterStep {
    Ok(&'static str),
    Retryable(&'static str),
    Fatal(&'static str),
}

/// Chain writer driven by a script of outcomes.
///
/// Pops one step per call; once the script runs dry every call
/// succeeds with a generated transaction reference. Records every
/// call so tests can assert on ordering and payload.
pub struct ScriptedWriter {
    script: Mutex<VecDeque<WriterStep>>,
    pub calls: Mutex<Vec<(String, u64, ProofId)>>,
}

impl ScriptedWriter {
    pub fn ok() -> Self {
        Self::with_script(vec![])
    }

    pub fn with_script(steps: Vec<WriterStep>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ChainWriter for ScriptedWriter {
    async fn add_points(
        &self,
        wallet: &WalletAddress,
        points: u64,
        proof_id: &ProofId,
    ) -> Result<String, ChainError> {
        let call_no = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((wallet.as_str().to_string(), points, *proof_id));
            calls.len()
        };
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(WriterStep::Ok(tx)) => Ok(tx.to_string()),
            Some(WriterStep::Retryable(msg)) => Err(ChainError::Unavailable(msg.to_string())),
            Some(WriterStep::Fatal(msg)) => Err(ChainError::Rejected(msg.to_string())),
            None => Ok(format!("tx-{call_no}")),
        }
    }
}

/// Chain reader over a fixed wallet-to-total map.
pub struct StaticReader {
    totals: HashMap<String, u64>,
    failing: bool,
}

impl StaticReader {
    pub fn with_totals(totals: &[(&WalletAddress, u64)]) -> Self {
        Self {
            totals: totals
                .iter()
                .map(|(w, t)| (w.as_str().to_string(), *t))
                .collect(),
            failing: false,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            totals: HashMap::new(),
            failing: true,
        }
    }
}

#[async_trait]
impl ChainReader for StaticReader {
    async fn wallet_total(&self, wallet: &WalletAddress) -> Result<u64, ChainError> {
        if self.failing {
            return Err(ChainError::Unavailable("rpc endpoint down".to_string()));
        }
        Ok(self.totals.get(wallet.as_str()).copied().unwrap_or(0))
    }
}

/// Worker tuning with no sleeps, for fast tests.
pub fn fast_worker_config() -> WorkerConfig {
    WorkerConfig {
        max_items: 10,
        backoff: BackoffPolicy::none(),
        batch_interval: Duration::from_secs(3600),
    }
}

/// Service over a caller-supplied store, for tests that also poke at
/// the keys directly.
pub async fn build_service_on(
    store: Arc<dyn Store>,
    writer: Arc<dyn ChainWriter>,
    reader: Arc<dyn ChainReader>,
    trigger_secret: Option<&str>,
) -> SettlementService {
    let catalog = StaticCatalog::new();
    catalog
        .insert(test_project_id(), test_mission_id(), 40)
        .await;
    catalog
        .insert(test_project_id(), side_mission_id(), 15)
        .await;

    SettlementService::new(
        store,
        Arc::new(catalog),
        Arc::new(Preverified),
        writer,
        reader,
        fast_worker_config(),
        trigger_secret.map(String::from),
    )
}

/// Service over an in-memory store with the test catalog loaded.
pub async fn build_service(
    writer: Arc<dyn ChainWriter>,
    reader: Arc<dyn ChainReader>,
    trigger_secret: Option<&str>,
) -> SettlementService {
    build_service_on(
        Arc::new(MemoryStore::new()),
        writer,
        reader,
        trigger_secret,
    )
    .await
}

/// Service with an always-succeeding writer and an empty-chain reader.
pub async fn default_service() -> (SettlementService, Arc<ScriptedWriter>) {
    let writer = Arc::new(ScriptedWriter::ok());
    let service = build_service(
        writer.clone(),
        Arc::new(StaticReader::with_totals(&[])),
        None,
    )
    .await;
    (service, writer)
}

//! Questline Settler Library
//!
//! Mission-proof settlement core: an append-only proof event log with
//! derived status, a deduplicated FIFO settlement queue, and a retrying
//! batch worker that pushes approved points on chain.
//!
//! ## Modules
//!
//! - [`domain`] - Core domain types (proofs, events, settlement records)
//! - [`store`] - Key-value store abstraction (memory, SQLite, PostgreSQL)
//! - [`log`] - Append-only proof event log
//! - [`queue`] - Deduplicated settlement queue
//! - [`tracker`] - Per-proof chain status records
//! - [`worker`] - Batch settlement worker and scheduler
//! - [`reconcile`] - Off-chain vs on-chain reconciliation and repair
//! - [`service`] - Facade wiring the components together
//! - [`chain`] - Chain adapter traits and error classification
//! - [`crypto`] - Hashing utilities (evidence digests, trigger secrets)
//! - [`telemetry`] - Logging setup

pub mod catalog;
pub mod chain;
pub mod config;
pub mod crypto;
pub mod domain;
pub mod error;
pub mod log;
pub mod queue;
pub mod reconcile;
pub mod retry;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod tracker;
pub mod verify;
pub mod worker;

// Re-export commonly used types
pub use domain::{
    BatchReport, ChainStatus, ChainStatusRecord, Decision, MissionId, NewProof, ProcessedItem,
    Proof, ProofEvent, ProofId, ProofStatus, ProjectId, ReconcileReport, ReconcileVerdict,
    SettlementStatus, SweepReport, WalletAddress,
};

pub use chain::{ChainError, ChainReader, ChainWriter, ErrorDisposition};
pub use error::{Result, SettlerError};
pub use service::SettlementService;
pub use store::{Store, StoreConfig};

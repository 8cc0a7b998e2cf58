//! Store abstraction for the settlement core.
//!
//! A single flat key space with string values plus list and set
//! primitives, enough to carry proof records, indexes, the settlement
//! queue, and the aggregate counters. Components hold an `Arc<dyn Store>`
//! and never know which backend is behind it; `StoreConfig` is the only
//! place that does.
//!
//! There are no multi-key transactions. Callers keep cross-key invariants
//! by ordering their writes, and `set_cas` gives single-key optimistic
//! concurrency.

mod memory;
mod postgres;
mod sqlite;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use sqlite::SqliteStore;

use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::error::Result;

/// Key-value store with list and set primitives.
///
/// Values are opaque strings (the components store JSON). `set_cas`
/// compares the full current value, so a previously-read raw value acts
/// as the version token for optimistic locking.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Store: Send + Sync {
    /// Read a value
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value unconditionally
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Write only when the key does not exist yet; true when written
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool>;

    /// Write only when the current value equals `expected`; true when
    /// written. The comparison and write are atomic per backend.
    async fn set_cas(&self, key: &str, expected: &str, value: &str) -> Result<bool>;

    /// Remove a key; true when it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Atomically add `by` to an integer value (missing counts as 0),
    /// returning the new value
    async fn incr(&self, key: &str, by: i64) -> Result<i64>;

    /// Append to the back of a list, returning the new length
    async fn list_push_back(&self, key: &str, value: &str) -> Result<u64>;

    /// Pop from the front of a list. Atomic: two concurrent poppers
    /// never receive the same element.
    async fn list_pop_front(&self, key: &str) -> Result<Option<String>>;

    /// Length of a list (missing list is empty)
    async fn list_len(&self, key: &str) -> Result<u64>;

    /// All elements of a list, front to back, without consuming them
    async fn list_all(&self, key: &str) -> Result<Vec<String>>;

    /// Add a member to a set; true when newly added
    async fn set_add(&self, key: &str, member: &str) -> Result<bool>;

    /// Remove a member from a set; true when it was present
    async fn set_remove(&self, key: &str, member: &str) -> Result<bool>;

    /// Membership test
    async fn set_contains(&self, key: &str, member: &str) -> Result<bool>;

    /// All members of a set, in unspecified order
    async fn set_members(&self, key: &str) -> Result<Vec<String>>;

    /// Drop every key, list, and set whose key starts with `prefix`,
    /// returning how many were removed
    async fn clear_prefix(&self, prefix: &str) -> Result<u64>;
}

/// Persisted key layout. Everything the settlement core stores lives
/// under these names. The admin reset wipes the queue, membership set,
/// and aggregate keys; `proof:` keys and chain status records survive
/// it.
pub mod keys {
    use crate::domain::{ProofId, WalletAddress};

    /// Set of all proof ids
    pub const PROOF_INDEX: &str = "proof:index";

    /// FIFO list of proof ids waiting for settlement
    pub const SETTLE_QUEUE: &str = "settle:queue";

    /// Membership set mirroring the queue for O(1) dedup
    pub const SETTLE_QUEUED: &str = "settle:queued";

    /// Set of proof ids that have a chain status record
    pub const CHAIN_STATUS_INDEX: &str = "settle:chainstatus:index";

    /// Counter of successfully settled proofs
    pub const FINALIZED_COUNT: &str = "settle:finalized_count";

    /// RFC 3339 timestamp of the last worker batch
    pub const LAST_SYNC_AT: &str = "settle:last_sync_at";

    /// Most recent settlement failure message
    pub const LAST_ERROR: &str = "settle:last_error";

    pub fn proof(proof_id: &ProofId) -> String {
        format!("proof:{proof_id}")
    }

    pub fn wallet_proofs(wallet: &WalletAddress) -> String {
        format!("proof:wallet:{wallet}")
    }

    pub fn chain_status(proof_id: &ProofId) -> String {
        format!("settle:chainstatus:{proof_id}")
    }
}

/// Backend selection, normally built by `Config::from_env`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    /// Process-local store for tests and embedded use
    Memory,
    /// SQLite file (or `sqlite::memory:`) for single-node deployments
    Sqlite { url: String },
    /// PostgreSQL for production
    Postgres { url: String },
}

impl StoreConfig {
    /// Connect the configured backend, running its schema setup.
    pub async fn build(&self) -> Result<Arc<dyn Store>> {
        match self {
            StoreConfig::Memory => Ok(Arc::new(MemoryStore::new())),
            StoreConfig::Sqlite { url } => {
                let store = SqliteStore::connect(url).await?;
                store.initialize().await?;
                Ok(Arc::new(store))
            }
            StoreConfig::Postgres { url } => {
                let store = PostgresStore::connect(url).await?;
                store.initialize().await?;
                Ok(Arc::new(store))
            }
        }
    }
}

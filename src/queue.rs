//! Deduplicated FIFO settlement queue.
//!
//! A list carries the FIFO order and a membership set gives O(1) dedup.
//! `set_add` is the gate: an id enters the list only when it was newly
//! added to the set, so the list never holds an id twice. A popped id is
//! immediately re-enqueueable, which is how retries re-enter.

use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::ProofId;
use crate::error::Result;
use crate::store::{keys, Store};

/// FIFO of proof ids awaiting settlement, at most one occurrence each.
pub struct SettlementQueue {
    store: Arc<dyn Store>,
}

impl SettlementQueue {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Add an id to the back of the queue. Returns `false` without
    /// touching the list when the id is already queued.
    pub async fn enqueue(&self, proof_id: &ProofId) -> Result<bool> {
        let id = proof_id.to_string();
        let added = self.store.set_add(keys::SETTLE_QUEUED, &id).await?;
        if !added {
            debug!(proof_id = %proof_id, "Already queued for settlement");
            return Ok(false);
        }

        let depth = match self.store.list_push_back(keys::SETTLE_QUEUE, &id).await {
            Ok(depth) => depth,
            Err(err) => {
                // Release the membership slot, otherwise the id could
                // never be enqueued again.
                if let Err(cleanup) = self.store.set_remove(keys::SETTLE_QUEUED, &id).await {
                    warn!(
                        proof_id = %proof_id,
                        error = %cleanup,
                        "Failed queue push left a stale membership entry"
                    );
                }
                return Err(err);
            }
        };
        debug!(proof_id = %proof_id, depth, "Queued for settlement");
        Ok(true)
    }

    /// Pop the oldest queued id and release its membership slot.
    pub async fn dequeue(&self) -> Result<Option<ProofId>> {
        loop {
            let Some(entry) = self.store.list_pop_front(keys::SETTLE_QUEUE).await? else {
                return Ok(None);
            };
            self.store.set_remove(keys::SETTLE_QUEUED, &entry).await?;

            match ProofId::from_str(&entry) {
                Ok(proof_id) => return Ok(Some(proof_id)),
                Err(_) => {
                    warn!(entry = %entry, "Dropping corrupt queue entry");
                }
            }
        }
    }

    /// How many ids are waiting.
    pub async fn len(&self) -> Result<u64> {
        self.store.list_len(keys::SETTLE_QUEUE).await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Whether an id is currently queued.
    pub async fn contains(&self, proof_id: &ProofId) -> Result<bool> {
        self.store
            .set_contains(keys::SETTLE_QUEUED, &proof_id.to_string())
            .await
    }

    /// Drop the queue and its membership set. Admin reset only.
    pub async fn clear(&self) -> Result<()> {
        self.store.clear_prefix(keys::SETTLE_QUEUE).await?;
        self.store.clear_prefix(keys::SETTLE_QUEUED).await?;
        Ok(())
    }
}

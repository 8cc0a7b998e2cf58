//! Per-proof chain settlement status.
//!
//! One record per proof, written by upsert with patch merge: fields the
//! patch leaves unset inherit from the stored record. `Finalized` is
//! terminal; a patch against a finalized record is ignored so a late
//! retry or stray requeue can never un-finalize a settled proof.

use std::str::FromStr;
use std::sync::Arc;

use tracing::warn;

use crate::domain::{ChainStatusPatch, ChainStatusRecord, ProofId, WalletAddress};
use crate::error::Result;
use crate::store::{keys, Store};

/// Tracks where each proof's settlement stands against the chain.
pub struct ChainStatusTracker {
    store: Arc<dyn Store>,
}

impl ChainStatusTracker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Create or merge-update the record for a proof.
    ///
    /// Returns the record as stored after the call. A finalized record
    /// is returned unchanged regardless of the patch.
    pub async fn upsert(
        &self,
        proof_id: &ProofId,
        wallet: &WalletAddress,
        patch: ChainStatusPatch,
    ) -> Result<ChainStatusRecord> {
        let key = keys::chain_status(proof_id);

        let mut record = match self.store.get(&key).await? {
            Some(raw) => serde_json::from_str::<ChainStatusRecord>(&raw)?,
            None => ChainStatusRecord::new(*proof_id, wallet.clone()),
        };

        if record.status.is_terminal() {
            if patch.status.is_some_and(|status| status != record.status) {
                warn!(
                    proof_id = %proof_id,
                    attempted = %patch.status.unwrap_or_default(),
                    "Ignoring status change on finalized settlement"
                );
            }
            return Ok(record);
        }

        record.apply(&patch);

        let raw = serde_json::to_string(&record)?;
        self.store.set(&key, &raw).await?;
        self.store
            .set_add(keys::CHAIN_STATUS_INDEX, &proof_id.to_string())
            .await?;

        Ok(record)
    }

    /// Fetch the record for a proof, if any.
    pub async fn get(&self, proof_id: &ProofId) -> Result<Option<ChainStatusRecord>> {
        match self.store.get(&keys::chain_status(proof_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Whether a proof has a settlement record at all.
    pub async fn has_record(&self, proof_id: &ProofId) -> Result<bool> {
        self.store
            .set_contains(keys::CHAIN_STATUS_INDEX, &proof_id.to_string())
            .await
    }

    /// Every settlement record, in unspecified order.
    pub async fn all(&self) -> Result<Vec<ChainStatusRecord>> {
        let members = self.store.set_members(keys::CHAIN_STATUS_INDEX).await?;
        let mut records = Vec::with_capacity(members.len());
        for member in members {
            let Ok(proof_id) = ProofId::from_str(&member) else {
                warn!(entry = %member, "Skipping corrupt settlement index entry");
                continue;
            };
            match self.get(&proof_id).await? {
                Some(record) => records.push(record),
                None => {
                    warn!(proof_id = %proof_id, "Settlement index entry without record");
                }
            }
        }
        Ok(records)
    }
}

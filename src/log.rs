//! Append-only proof log.
//!
//! Owns proof records and their event histories. Writes after submission
//! go through a compare-and-swap on the raw stored value, so two
//! concurrent decisions on one proof cannot both land; the loser sees
//! `Conflict` and re-reads.

use std::str::FromStr;
use std::sync::Arc;

use tracing::{info, warn};

use crate::catalog::MissionCatalog;
use crate::domain::{
    Decision, NewProof, Proof, ProofEvent, ProofId, ProofStatus, WalletAddress,
    REJECTED_REPUTATION_DELTA,
};
use crate::error::{Result, SettlerError};
use crate::store::{keys, Store};
use crate::verify::SignatureVerifier;

/// Proof records with append-only event histories and derived status.
pub struct ProofLog {
    store: Arc<dyn Store>,
    catalog: Arc<dyn MissionCatalog>,
    verifier: Arc<dyn SignatureVerifier>,
}

impl ProofLog {
    pub fn new(
        store: Arc<dyn Store>,
        catalog: Arc<dyn MissionCatalog>,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Self {
        Self {
            store,
            catalog,
            verifier,
        }
    }

    /// Accept a signed submission and create its proof record.
    ///
    /// The record is born `Pending` with a single `Submitted` event and
    /// zero points. The proof id lands in the global index and the
    /// submitter's per-wallet index.
    pub async fn submit(&self, submission: NewProof) -> Result<Proof> {
        if submission.wallet.is_empty() {
            return Err(SettlerError::Validation("wallet must not be empty".into()));
        }
        if submission.message.trim().is_empty() {
            return Err(SettlerError::Validation("message must not be empty".into()));
        }
        if submission.signature.trim().is_empty() {
            return Err(SettlerError::Validation(
                "signature must not be empty".into(),
            ));
        }

        if !self.verifier.verify(
            &submission.wallet,
            &submission.message,
            &submission.signature,
            &submission.project_id,
            &submission.mission_id,
        ) {
            return Err(SettlerError::SignatureInvalid);
        }

        let proof = Proof::from_submission(submission);
        let raw = serde_json::to_string(&proof)?;

        let written = self
            .store
            .set_if_absent(&keys::proof(&proof.proof_id), &raw)
            .await?;
        if !written {
            return Err(SettlerError::AlreadyExists(proof.proof_id));
        }

        let id = proof.proof_id.to_string();
        self.store.set_add(keys::PROOF_INDEX, &id).await?;
        self.store
            .list_push_back(&keys::wallet_proofs(&proof.wallet), &id)
            .await?;

        info!(
            proof_id = %proof.proof_id,
            project_id = %proof.project_id,
            mission_id = %proof.mission_id,
            wallet = %proof.wallet,
            "Proof submitted"
        );

        Ok(proof)
    }

    /// Apply a reviewer decision to a pending proof.
    ///
    /// Approval looks up the mission weight and credits points and
    /// reputation; rejection applies the fixed reputation penalty. The
    /// write is conditional on the record not having changed since it
    /// was read.
    pub async fn decide(
        &self,
        proof_id: &ProofId,
        decision: Decision,
        reviewer: WalletAddress,
        reason: Option<String>,
    ) -> Result<Proof> {
        let (mut proof, expected_raw) = self.load(proof_id).await?;

        let status = proof.status();
        if status != ProofStatus::Pending {
            return Err(SettlerError::InvalidState {
                proof_id: *proof_id,
                expected: ProofStatus::Pending,
                actual: status,
            });
        }

        match decision {
            Decision::Approve => {
                let weight = self
                    .catalog
                    .mission_weight(&proof.project_id, &proof.mission_id)
                    .await?
                    .ok_or_else(|| SettlerError::MissionNotFound {
                        project_id: proof.project_id.clone(),
                        mission_id: proof.mission_id.clone(),
                    })?;

                let reputation = i64::try_from(weight).map_err(|_| {
                    SettlerError::Validation(format!(
                        "mission weight {weight} exceeds the supported range"
                    ))
                })?;
                proof.points = weight;
                proof.reputation_delta += reputation;
                proof.append(ProofEvent::approved(reviewer.clone(), reason));
            }
            Decision::Reject => {
                proof.reputation_delta += REJECTED_REPUTATION_DELTA;
                proof.append(ProofEvent::rejected(reviewer.clone(), reason));
            }
        }

        self.write_cas(&proof, &expected_raw).await?;

        info!(
            proof_id = %proof.proof_id,
            decision = ?decision,
            reviewer = %reviewer,
            points = proof.points,
            status = %proof.status(),
            "Proof decided"
        );

        Ok(proof)
    }

    /// Revoke a previously approved proof.
    ///
    /// Points stay recorded on the proof for audit, but the derived
    /// status stops counting it as approved and it is no longer
    /// eligible for settlement.
    pub async fn revoke(
        &self,
        proof_id: &ProofId,
        actor: WalletAddress,
        reason: Option<String>,
    ) -> Result<Proof> {
        let (mut proof, expected_raw) = self.load(proof_id).await?;

        let status = proof.status();
        if status != ProofStatus::Approved {
            return Err(SettlerError::InvalidState {
                proof_id: *proof_id,
                expected: ProofStatus::Approved,
                actual: status,
            });
        }

        proof.append(ProofEvent::revoked(actor.clone(), reason));
        self.write_cas(&proof, &expected_raw).await?;

        warn!(
            proof_id = %proof.proof_id,
            actor = %actor,
            points = proof.points,
            "Proof revoked"
        );

        Ok(proof)
    }

    /// Fetch a proof by id.
    pub async fn get(&self, proof_id: &ProofId) -> Result<Proof> {
        let (proof, _) = self.load(proof_id).await?;
        Ok(proof)
    }

    /// All proofs submitted by a wallet, in submission order.
    pub async fn list_wallet(&self, wallet: &WalletAddress) -> Result<Vec<Proof>> {
        let ids = self.store.list_all(&keys::wallet_proofs(wallet)).await?;
        let mut proofs = Vec::with_capacity(ids.len());
        for id in ids {
            match ProofId::from_str(&id) {
                Ok(proof_id) => proofs.push(self.get(&proof_id).await?),
                Err(_) => {
                    warn!(wallet = %wallet, entry = %id, "Skipping corrupt wallet index entry");
                }
            }
        }
        Ok(proofs)
    }

    /// Every proof id in the global index, in unspecified order.
    pub async fn list_ids(&self) -> Result<Vec<ProofId>> {
        let members = self.store.set_members(keys::PROOF_INDEX).await?;
        let mut ids = Vec::with_capacity(members.len());
        for member in members {
            match ProofId::from_str(&member) {
                Ok(proof_id) => ids.push(proof_id),
                Err(_) => {
                    warn!(entry = %member, "Skipping corrupt proof index entry");
                }
            }
        }
        Ok(ids)
    }

    /// Load a proof together with the raw value it was read from, which
    /// acts as the token for the conditional write-back.
    async fn load(&self, proof_id: &ProofId) -> Result<(Proof, String)> {
        let raw = self
            .store
            .get(&keys::proof(proof_id))
            .await?
            .ok_or(SettlerError::ProofNotFound(*proof_id))?;
        let proof: Proof = serde_json::from_str(&raw)?;
        Ok((proof, raw))
    }

    async fn write_cas(&self, proof: &Proof, expected_raw: &str) -> Result<()> {
        let updated = serde_json::to_string(proof)?;
        let written = self
            .store
            .set_cas(&keys::proof(&proof.proof_id), expected_raw, &updated)
            .await?;
        if !written {
            warn!(proof_id = %proof.proof_id, "Lost concurrent update race");
            return Err(SettlerError::Conflict(proof.proof_id));
        }
        Ok(())
    }
}

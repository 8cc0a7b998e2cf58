//! Signature verification seam.
//!
//! Wallets sign the proof message with their own key scheme; which scheme
//! depends on the chain the deployment targets. Verification is therefore
//! injected rather than implemented here. The check is pure and cheap, so
//! the trait stays synchronous.

#[cfg(test)]
use mockall::automock;

use crate::domain::{MissionId, ProjectId, WalletAddress};

/// Checks that a submitted proof was signed by the claiming wallet.
#[cfg_attr(test, automock)]
pub trait SignatureVerifier: Send + Sync {
    /// Returns true when `signature` is a valid signature by `wallet`
    /// over `message` in the context of the named mission.
    fn verify(
        &self,
        wallet: &WalletAddress,
        message: &str,
        signature: &str,
        project_id: &ProjectId,
        mission_id: &MissionId,
    ) -> bool;
}

/// Accept-all verifier for deployments where an upstream gateway has
/// already authenticated the submission.
#[derive(Debug, Default, Clone, Copy)]
pub struct Preverified;

impl SignatureVerifier for Preverified {
    fn verify(
        &self,
        _wallet: &WalletAddress,
        _message: &str,
        _signature: &str,
        _project_id: &ProjectId,
        _mission_id: &MissionId,
    ) -> bool {
        true
    }
}

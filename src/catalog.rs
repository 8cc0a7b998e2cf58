//! Mission catalog seam.
//!
//! Point awards are driven by mission configuration that lives upstream.
//! The proof log only needs one lookup, so the trait stays small and the
//! in-memory implementation doubles as the test fixture.

use std::collections::HashMap;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::sync::RwLock;

use crate::domain::{MissionId, ProjectId};
use crate::error::Result;

/// Resolves the point weight configured for a mission.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MissionCatalog: Send + Sync {
    /// Points awarded for completing a mission, `None` if the mission
    /// is unknown to the catalog.
    async fn mission_weight(
        &self,
        project_id: &ProjectId,
        mission_id: &MissionId,
    ) -> Result<Option<u64>>;
}

/// Catalog backed by an in-memory table.
#[derive(Default)]
pub struct StaticCatalog {
    weights: RwLock<HashMap<(ProjectId, MissionId), u64>>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or overwrite a mission weight.
    pub async fn insert(&self, project_id: ProjectId, mission_id: MissionId, points: u64) {
        let mut weights = self.weights.write().await;
        weights.insert((project_id, mission_id), points);
    }
}

#[async_trait]
impl MissionCatalog for StaticCatalog {
    async fn mission_weight(
        &self,
        project_id: &ProjectId,
        mission_id: &MissionId,
    ) -> Result<Option<u64>> {
        let weights = self.weights.read().await;
        Ok(weights
            .get(&(project_id.clone(), mission_id.clone()))
            .copied())
    }
}

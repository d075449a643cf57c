//! Read-only snapshot published to view consumers.

use crate::model::entity::{Entity, EntityId, EntityOrigin};
use crate::model::heatmap::{HeatmapPoint, RiskAnalysis};
use crate::model::session::{Identity, JourneyStatus};
use crate::reconcile::display_order;
use crate::service::dispatcher::BackendSync;
use serde::{Deserialize, Serialize};

/// The local user's journey as shown to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JourneyView {
    pub status: JourneyStatus,
    pub journey_id: Option<String>,
    pub backend_sync: BackendSync,
}

/// Complete merged state at one revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingView {
    /// Incremented on every publish.
    pub revision: u64,
    /// Merge order: decoys, remotes, self.
    pub entities: Vec<Entity>,
    pub identity: Option<Identity>,
    pub journey: JourneyView,
    pub heatmap: Vec<HeatmapPoint>,
    /// `None` until a health check has run.
    pub backend_online: Option<bool>,
    pub risk: Option<RiskAnalysis>,
}

impl TrackingView {
    /// Entities ordered for incident lists: critical first.
    pub fn display_order(&self) -> Vec<Entity> {
        display_order(&self.entities)
    }

    pub fn self_entity(&self) -> Option<&Entity> {
        self.entities
            .iter()
            .find(|entity| entity.origin == EntityOrigin::SelfJourney)
    }

    pub fn entity(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.iter().find(|entity| &entity.id == id)
    }

    pub fn critical_count(&self) -> usize {
        self.entities
            .iter()
            .filter(|entity| entity.status.is_critical())
            .count()
    }
}

//! Three-source entity reconciliation.
//!
//! # Responsibility
//! - Merge decoy, remote and self entities into one view collection.
//! - Provide the display ordering consumers apply on top of merge order.
//!
//! # Invariants
//! - Ids are unique in the merged collection.
//! - Collisions resolve by precedence: self over remote over decoy.
//! - Repeated remote ids keep the first record.
//! - Merge order is decoys, then remotes, then self.
//! - Display ordering is stable: critical first, otherwise merge order.

use crate::model::entity::{Entity, EntityId};
use std::collections::HashSet;

/// Merges the three entity sources.
pub fn merge(decoys: &[Entity], remotes: &[Entity], self_entity: Option<&Entity>) -> Vec<Entity> {
    let mut claimed: HashSet<&EntityId> = HashSet::new();
    if let Some(own) = self_entity {
        claimed.insert(&own.id);
    }
    let remotes = remotes
        .iter()
        .filter(|entity| claimed.insert(&entity.id))
        .collect::<Vec<_>>();

    let mut merged = Vec::with_capacity(decoys.len() + remotes.len() + 1);
    merged.extend(
        decoys
            .iter()
            .filter(|entity| claimed.insert(&entity.id))
            .cloned(),
    );
    merged.extend(remotes.into_iter().cloned());
    merged.extend(self_entity.cloned());
    merged
}

/// Returns a copy ordered for display: critical entities first.
pub fn display_order(entities: &[Entity]) -> Vec<Entity> {
    let mut ordered = entities.to_vec();
    // `sort_by_key` is stable, so ties keep merge order.
    ordered.sort_by_key(|entity| !entity.status.is_critical());
    ordered
}

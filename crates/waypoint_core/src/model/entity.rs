//! Entity domain model.
//!
//! # Responsibility
//! - Define the canonical point shape shared by decoy, remote and self sources.
//! - Own the grid clamping rule so no entity can sit outside the view.
//!
//! # Invariants
//! - `EntityId` is created once per entity; numeric backend ids are
//!   converted at normalization time, never at merge time.
//! - `GridPosition` coordinates are always within `[GRID_MIN, GRID_MAX]`.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Lower bound of the shared view grid.
pub const GRID_MIN: f64 = 0.0;
/// Upper bound of the shared view grid.
pub const GRID_MAX: f64 = 100.0;
/// Center of the grid, used when a source omits a coordinate.
pub const GRID_CENTER: f64 = 50.0;

/// Canonical identity shared by all entity sources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for EntityId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<u64> for EntityId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

/// Safety status rendered for one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    Safe,
    Active,
    Critical,
}

impl EntityStatus {
    pub fn is_critical(self) -> bool {
        matches!(self, Self::Critical)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Active => "active",
            Self::Critical => "critical",
        }
    }
}

/// Source that produced an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityOrigin {
    /// Simulated background traffic.
    Decoy,
    /// Reported by the backend.
    Remote,
    /// The local user's own journey.
    #[serde(rename = "self")]
    SelfJourney,
}

impl EntityOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Decoy => "decoy",
            Self::Remote => "remote",
            Self::SelfJourney => "self",
        }
    }
}

/// Point on the `[0,100] x [0,100]` view grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridPosition {
    pub x: f64,
    pub y: f64,
}

impl GridPosition {
    /// Creates a position with both coordinates clamped into the grid.
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x: clamp_to_grid(x),
            y: clamp_to_grid(y),
        }
    }

    pub fn center() -> Self {
        Self::new(GRID_CENTER, GRID_CENTER)
    }

    /// Returns this position moved by `(dx, dy)` and clamped.
    pub fn displaced(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

/// Clamps one coordinate into the grid. NaN maps to `GRID_MIN`.
pub fn clamp_to_grid(value: f64) -> f64 {
    if value.is_nan() {
        return GRID_MIN;
    }
    value.clamp(GRID_MIN, GRID_MAX)
}

/// Named emergency contact attached to an identity or entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestContact {
    pub name: String,
    pub phone: String,
}

/// Optional descriptive payload shown by operator views.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_type: Option<String>,
    /// Ordered by preference.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub best_contacts: Vec<BestContact>,
}

impl EntityMetadata {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.contact_number.is_none()
            && self.home_address.is_none()
            && self.alert_type.is_none()
            && self.best_contacts.is_empty()
    }
}

/// One trackable point on the shared view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub status: EntityStatus,
    pub position: GridPosition,
    pub origin: EntityOrigin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EntityMetadata>,
}

impl Entity {
    pub fn new(
        id: impl Into<EntityId>,
        name: impl Into<String>,
        status: EntityStatus,
        position: GridPosition,
        origin: EntityOrigin,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status,
            position,
            origin,
            metadata: None,
        }
    }

    /// Attaches metadata, dropping it when every field is empty.
    pub fn with_metadata(mut self, metadata: EntityMetadata) -> Self {
        self.metadata = if metadata.is_empty() {
            None
        } else {
            Some(metadata)
        };
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{clamp_to_grid, EntityId, EntityOrigin, GridPosition};

    #[test]
    fn grid_position_clamps_out_of_range_values() {
        let position = GridPosition::new(-4.0, 180.5);
        assert_eq!(position.x, 0.0);
        assert_eq!(position.y, 100.0);
    }

    #[test]
    fn clamp_maps_nan_to_grid_min() {
        assert_eq!(clamp_to_grid(f64::NAN), 0.0);
    }

    #[test]
    fn numeric_and_string_ids_share_one_identity() {
        assert_eq!(EntityId::from(7_u64), EntityId::from("7"));
    }

    #[test]
    fn self_origin_serializes_as_self() {
        let value = serde_json::to_value(EntityOrigin::SelfJourney).expect("serialize origin");
        assert_eq!(value, serde_json::json!("self"));
    }
}

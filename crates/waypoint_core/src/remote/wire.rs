//! Backend wire shapes and normalization into canonical entities.
//!
//! # Responsibility
//! - Mirror the REST request/response bodies exactly.
//! - Convert remote journey records into `Entity` values.
//!
//! # Invariants
//! - Normalized remote entities always carry `EntityOrigin::Remote`.
//! - Missing coordinates default to the grid center; present ones are clamped.
//! - Records without a usable id are dropped, never invented.
//! - A normalized poll holds each canonical id at most once.

use crate::model::entity::{
    Entity, EntityId, EntityMetadata, EntityOrigin, EntityStatus, GridPosition, GRID_CENTER,
};
use crate::model::heatmap::{BoundingBox, HeatmapPoint, RiskAnalysis};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// `GET /journeys` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JourneysResponse {
    #[serde(default)]
    pub journeys: Vec<RemoteJourneyRecord>,
}

/// One backend-tracked journey. Only `id` is required to be usable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteJourneyRecord {
    /// String or number on the wire.
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub metadata: Option<EntityMetadata>,
}

/// `GET /intelligence/heatmap` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HeatmapResponse {
    #[serde(default)]
    pub points: Vec<GeoPoint>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub weight: f64,
}

/// `POST /journey/{id}/start` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartJourneyRequest {
    pub user_id: String,
}

/// `POST /alert/dispatch` body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchRequest {
    pub journey_id: String,
    pub user_id: String,
    pub location: DispatchLocation,
}

/// Location sent with a dispatch. Carries grid coordinates, `lat = x`, `lng = y`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DispatchLocation {
    pub lat: f64,
    pub lng: f64,
}

impl DispatchLocation {
    pub fn from_grid(position: GridPosition) -> Self {
        Self {
            lat: position.x,
            lng: position.y,
        }
    }
}

/// `POST /journey/{id}/analyze` response.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeResponse {
    #[serde(default)]
    pub status: Option<String>,
    pub data: RiskAnalysis,
}

/// Converts a wire id into the canonical identity.
///
/// Integral numbers render without a fractional part so `7`, `7.0` and `"7"`
/// all map to the same id.
pub fn canonical_id(raw: &Value) -> Option<EntityId> {
    match raw {
        Value::String(value) => {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| EntityId::new(trimmed))
        }
        Value::Number(number) => {
            if let Some(value) = number.as_u64() {
                Some(EntityId::from(value))
            } else if let Some(value) = number.as_i64() {
                Some(EntityId::new(value.to_string()))
            } else {
                number.as_f64().filter(|value| value.is_finite()).map(|value| {
                    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
                        EntityId::new((value as i64).to_string())
                    } else {
                        EntityId::new(value.to_string())
                    }
                })
            }
        }
        _ => None,
    }
}

/// Maps a backend status label onto the view status.
pub fn remote_status(raw: Option<&str>) -> EntityStatus {
    match raw.map(|value| value.trim().to_ascii_lowercase()) {
        Some(value) if matches!(value.as_str(), "critical" | "panic" | "panic_dispatched") => {
            EntityStatus::Critical
        }
        Some(value) if value == "active" => EntityStatus::Active,
        _ => EntityStatus::Safe,
    }
}

/// Normalizes one remote record, returning `None` when it has no usable id.
pub fn normalize_record(record: &RemoteJourneyRecord) -> Option<Entity> {
    let id = record.id.as_ref().and_then(canonical_id)?;
    let name = record
        .name
        .as_deref()
        .or(record.user_id.as_deref())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Journey {id}"));
    let position = GridPosition::new(
        record.x.unwrap_or(GRID_CENTER),
        record.y.unwrap_or(GRID_CENTER),
    );

    let entity = Entity::new(
        id,
        name,
        remote_status(record.status.as_deref()),
        position,
        EntityOrigin::Remote,
    );
    Some(match record.metadata.clone() {
        Some(metadata) => entity.with_metadata(metadata),
        None => entity,
    })
}

/// Normalizes a full poll response, keeping backend order.
///
/// Records repeating an already seen canonical id are dropped; the first one
/// in backend order wins.
pub fn normalize_journeys(response: &JourneysResponse) -> Vec<Entity> {
    let mut seen = HashSet::new();
    response
        .journeys
        .iter()
        .filter_map(normalize_record)
        .filter(|entity| seen.insert(entity.id.clone()))
        .collect()
}

/// Projects heatmap points onto the grid.
pub fn project_heatmap(response: &HeatmapResponse, bounds: &BoundingBox) -> Vec<HeatmapPoint> {
    response
        .points
        .iter()
        .map(|point| HeatmapPoint::new(bounds.to_grid(point.lat, point.lng), point.weight))
        .collect()
}

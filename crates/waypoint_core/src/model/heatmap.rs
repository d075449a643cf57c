//! Risk intelligence model and geographic projection.
//!
//! # Responsibility
//! - Project backend latitude/longitude into the shared view grid.
//! - Define heatmap points and journey risk analysis results.
//!
//! # Invariants
//! - Projection is a pure function of the bounding box and input.
//! - Projected coordinates are always clamped into the grid.
//! - Heatmap weights are finite and non-negative.

use crate::model::entity::{clamp_to_grid, GridPosition};
use serde::{Deserialize, Serialize};

/// Geographic box mapped onto the full view grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

/// Johannesburg/Pretoria demo area.
pub const DEFAULT_BOUNDS: BoundingBox = BoundingBox {
    min_lat: -26.5,
    max_lat: -25.5,
    min_lng: 27.5,
    max_lng: 28.5,
};

impl BoundingBox {
    /// Projects `(lat, lng)` onto the grid.
    ///
    /// Longitude maps to `x`; latitude maps to `y` inverted, so higher
    /// latitudes render closer to the top edge.
    pub fn to_grid(&self, lat: f64, lng: f64) -> GridPosition {
        let y_pct = (lat - self.min_lat) / (self.max_lat - self.min_lat);
        let x_pct = (lng - self.min_lng) / (self.max_lng - self.min_lng);
        GridPosition {
            x: clamp_to_grid(x_pct * 100.0),
            y: clamp_to_grid(100.0 - y_pct * 100.0),
        }
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        DEFAULT_BOUNDS
    }
}

/// Shorthand for projecting through `DEFAULT_BOUNDS`.
pub fn to_grid(lat: f64, lng: f64) -> GridPosition {
    DEFAULT_BOUNDS.to_grid(lat, lng)
}

/// Weighted risk point on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeatmapPoint {
    pub position: GridPosition,
    pub weight: f64,
}

impl HeatmapPoint {
    pub fn new(position: GridPosition, weight: f64) -> Self {
        let weight = if weight.is_finite() && weight > 0.0 {
            weight
        } else {
            0.0
        };
        Self { position, weight }
    }
}

/// Backend risk score for one journey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAnalysis {
    pub journey_id: String,
    /// 1 (low) to 5 (high).
    pub risk_level: u8,
    #[serde(default)]
    pub factors: Vec<String>,
}

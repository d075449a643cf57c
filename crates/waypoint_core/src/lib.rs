//! Core journey tracking and alert synchronization for Waypoint.
//! This crate owns the merged entity view and every journey state transition.

pub mod config;
pub mod db;
pub mod engine;
pub mod lifecycle;
pub mod logging;
pub mod model;
pub mod reconcile;
pub mod remote;
pub mod repo;
pub mod service;
pub mod sim;

pub use config::{ConfigError, CoreConfig};
pub use engine::{JourneyView, TickerHandle, TrackingEngine, TrackingView};
pub use lifecycle::{JourneyAction, JourneyLifecycle, Transition, TransitionOutcome};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status, LoggingError};
pub use model::entity::{Entity, EntityId, EntityMetadata, EntityOrigin, EntityStatus, GridPosition};
pub use model::heatmap::{BoundingBox, HeatmapPoint, RiskAnalysis};
pub use model::session::{ContactProfile, Identity, JourneyId, JourneyStatus, Role, Session};
pub use remote::client::{BackendError, BackendResult, HttpTrackingBackend, TrackingBackend};
pub use repo::resilient_store::ResilientSessionStore;
pub use repo::session_repo::{RepoError, RepoResult, SessionStore, SqliteSessionStore};
pub use service::dispatcher::{BackendSync, SyncedAction};
pub use sim::SimulationGenerator;

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

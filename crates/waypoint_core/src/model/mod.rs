//! Domain model for the shared tracking view.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Keep one entity shape for decoy, remote and self sources.
//!
//! # Invariants
//! - Every entity is identified by one canonical `EntityId`.
//! - Positions never leave the `[0,100]` grid.

pub mod entity;
pub mod heatmap;
pub mod session;

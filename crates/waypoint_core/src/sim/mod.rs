//! Decoy traffic simulation.
//!
//! # Responsibility
//! - Hold the fixed decoy population that fills the shared view.
//! - Advance decoys with a bounded random walk on every tick.
//!
//! # Invariants
//! - Decoy ids, names and statuses never change after construction.
//! - Each step moves `x` and `y` independently by a uniform value in
//!   `[-MAX_STEP, MAX_STEP]` and clamps into the grid.
//! - A step depends only on the current positions (no velocity/history).

use crate::model::entity::{Entity, EntityId, EntityOrigin, EntityStatus, GridPosition};
use rand::Rng;
use std::time::Duration;

/// Shared cadence of the simulation step and the remote poll.
pub const TICK_PERIOD: Duration = Duration::from_millis(2000);
/// Largest per-axis displacement of one step.
pub const MAX_STEP: f64 = 1.0;

/// Bounded random walk over a fixed decoy set.
#[derive(Debug, Clone)]
pub struct SimulationGenerator {
    decoys: Vec<Entity>,
}

impl SimulationGenerator {
    /// Creates a generator; every input is re-tagged as a decoy.
    pub fn new(decoys: Vec<Entity>) -> Self {
        let decoys = decoys
            .into_iter()
            .map(|mut entity| {
                entity.origin = EntityOrigin::Decoy;
                entity.position = GridPosition::new(entity.position.x, entity.position.y);
                entity
            })
            .collect();
        Self { decoys }
    }

    /// Demo population used when no other seed is configured.
    pub fn with_default_population() -> Self {
        Self::new(default_decoys())
    }

    pub fn decoys(&self) -> &[Entity] {
        &self.decoys
    }

    /// Advances all decoys one step using the thread-local RNG.
    pub fn step(&mut self) {
        self.step_with(&mut rand::thread_rng());
    }

    /// Advances all decoys one step using the provided RNG.
    pub fn step_with<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for decoy in &mut self.decoys {
            let dx = rng.gen_range(-MAX_STEP..=MAX_STEP);
            let dy = rng.gen_range(-MAX_STEP..=MAX_STEP);
            decoy.position = decoy.position.displaced(dx, dy);
        }
    }
}

fn default_decoys() -> Vec<Entity> {
    vec![
        decoy(1, "Thabo M.", EntityStatus::Safe, 20.0, 30.0),
        decoy(2, "Sarah L.", EntityStatus::Safe, 80.0, 15.0),
        decoy(3, "Unit 42", EntityStatus::Critical, 50.0, 50.0),
    ]
}

fn decoy(id: u64, name: &str, status: EntityStatus, x: f64, y: f64) -> Entity {
    Entity::new(
        EntityId::from(id),
        name,
        status,
        GridPosition::new(x, y),
        EntityOrigin::Decoy,
    )
}

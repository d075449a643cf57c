//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the session persistence contract.
//! - Isolate SQLite details from lifecycle orchestration.
//!
//! # Invariants
//! - Repository writes must call `Session::validate()` before persistence.
//! - Engine-facing access goes through `ResilientSessionStore`, which never
//!   raises storage errors.

pub mod resilient_store;
pub mod session_repo;

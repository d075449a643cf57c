//! Backend integration: REST client, wire shapes and remote poll state.
//!
//! # Responsibility
//! - Keep HTTP and JSON details out of lifecycle and reconciliation code.
//!
//! # Invariants
//! - Transient backend failures never propagate past this boundary as
//!   user-visible errors; callers receive `BackendResult` and degrade.

pub mod client;
pub mod poller;
pub mod wire;

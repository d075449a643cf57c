//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate lifecycle, persistence and backend calls into use-case APIs.
//! - Keep UI/FFI layers decoupled from storage and transport details.

pub mod dispatcher;

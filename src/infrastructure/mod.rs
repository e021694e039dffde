//! Infrastructure layer for external integrations.
//!
//! This layer implements interfaces defined by the domain layer.
//!
//! # Modules
//!
//! - [`persistence`] - Resource store adapters (PostgreSQL and in-memory)
//! - [`probe`] - Long URL reachability checks

pub mod persistence;
pub mod probe;

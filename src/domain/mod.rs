//! Domain layer: entities, persistence contracts and collaborator traits.
//!
//! # Architecture
//!
//! - [`entities`] - Accounts, short URLs, pricing plans, ledger entries
//! - [`store`] - Unit-of-work and resource-store traits plus query specifications
//! - [`probe`] - External URL reachability contract
//! - [`caller`] - Identity of the caller as supplied by the boundary
//!
//! The domain layer has no dependency on concrete adapters; those live in
//! [`crate::infrastructure`].

pub mod caller;
pub mod entities;
pub mod probe;
pub mod store;

pub use caller::Caller;

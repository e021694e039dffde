//! Resource store adapters.
//!
//! # Adapters
//!
//! - [`PgStore`] - PostgreSQL, one transaction per writable scope
//! - [`MemoryStore`] - process memory with optimistic commit-time conflict detection

pub mod memory_store;
pub mod pg_store;
mod sql;

pub use memory_store::{MemoryScope, MemoryStore};
pub use pg_store::{PgScope, PgStore};

//! Collision-checked short code allocation.

use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::entities::ShortUrl;
use crate::domain::store::{Filter, Query, ResourceStore};
use crate::error::AppError;
use crate::utils::code_generator::generate_code;

/// Source of candidate codes.
pub type CodeSource = Arc<dyn Fn() -> Result<String, AppError> + Send + Sync>;

/// Draws random codes until one is free among live short URLs.
///
/// The check runs inside the caller's scope. Two scopes can still pick the
/// same code concurrently; the store's uniqueness constraint rejects the
/// second insert with [`AppError::Conflict`].
pub struct ShortCodeAllocator<S: ResourceStore> {
    store: Arc<S>,
    max_attempts: u32,
    source: CodeSource,
}

impl<S: ResourceStore> ShortCodeAllocator<S> {
    pub fn new(store: Arc<S>, max_attempts: u32) -> Self {
        Self::with_source(store, max_attempts, Arc::new(generate_code))
    }

    /// Allocator drawing from a custom source.
    pub fn with_source(store: Arc<S>, max_attempts: u32, source: CodeSource) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
            source,
        }
    }

    /// # Errors
    ///
    /// - [`AppError::CapacityExhausted`] after `max_attempts` collisions
    /// - [`AppError::Internal`] if the random source fails
    pub async fn allocate(&self, scope: &mut S::Scope) -> Result<String, AppError> {
        for attempt in 1..=self.max_attempts {
            let code = (self.source)()?;

            let taken = self
                .store
                .count::<ShortUrl>(
                    scope,
                    &Query::new().filter(Filter::eq(ShortUrl::SHORT_CODE, code.as_str())),
                )
                .await?;
            if taken == 0 {
                return Ok(code);
            }

            debug!(attempt, code = %code, "short code collision");
        }

        warn!(attempts = self.max_attempts, "short code space exhausted");
        Err(AppError::capacity_exhausted(
            "no free short code available, try again later",
            json!({ "attempts": self.max_attempts }),
        ))
    }
}

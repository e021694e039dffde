//! Reachability check for long URLs.

use async_trait::async_trait;

use crate::error::AppError;

/// Verifies that a long URL answers before it is shortened.
///
/// # Implementations
///
/// - [`crate::infrastructure::probe::HttpUrlProbe`] - HTTP GET via `reqwest`
/// - [`crate::infrastructure::probe::AcceptAllProbe`] - accepts every URL
/// - Test mocks available with `cfg(test)`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UrlProbe: Send + Sync {
    /// # Errors
    ///
    /// Returns [`AppError::Validation`] if the URL cannot be fetched or
    /// answers `404 Not Found`.
    async fn check(&self, long_url: &str) -> Result<(), AppError>;
}

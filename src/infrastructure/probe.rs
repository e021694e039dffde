//! URL probe implementations.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::probe::UrlProbe;
use crate::error::AppError;

const NOT_FOUND_MESSAGE: &str = "request url not found, please provide a valid Long URL";

/// Issues a `GET` against the long URL and rejects it when the request fails
/// or the target answers `404 Not Found`. Any other status is accepted.
pub struct HttpUrlProbe {
    http: reqwest::Client,
}

impl HttpUrlProbe {
    /// Builds a probe whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Internal`] if the HTTP client cannot be constructed.
    pub fn new(timeout: Duration) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                AppError::internal("Failed to build HTTP client", json!({ "reason": e.to_string() }))
            })?;

        Ok(Self { http })
    }
}

#[async_trait]
impl UrlProbe for HttpUrlProbe {
    async fn check(&self, long_url: &str) -> Result<(), AppError> {
        let response = self.http.get(long_url).send().await.map_err(|e| {
            warn!(url = %long_url, error = %e, "long url probe failed");
            AppError::bad_request(
                NOT_FOUND_MESSAGE,
                json!({ "url": long_url, "reason": e.to_string() }),
            )
        })?;

        let status = response.status();
        debug!(url = %long_url, status = status.as_u16(), "long url probed");

        if status == StatusCode::NOT_FOUND {
            return Err(AppError::bad_request(
                NOT_FOUND_MESSAGE,
                json!({ "url": long_url, "status": status.as_u16() }),
            ));
        }

        Ok(())
    }
}

/// Accepts every URL. Used when probing is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAllProbe;

#[async_trait]
impl UrlProbe for AcceptAllProbe {
    async fn check(&self, _long_url: &str) -> Result<(), AppError> {
        Ok(())
    }
}

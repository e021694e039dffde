//! Long URL parsing and canonicalisation.
//!
//! Duplicate detection compares canonical forms, so `HTTPS://Example.com:443/a#top`
//! and `https://example.com/a` count as the same registration.

use serde_json::json;
use url::Url;

use crate::error::AppError;

#[derive(Debug, thiserror::Error)]
pub enum LongUrlError {
    #[error("Invalid URL format: {0}")]
    InvalidFormat(String),

    #[error("Only HTTP and HTTPS URLs can be shortened")]
    UnsupportedScheme,

    #[error("URL has no host")]
    MissingHost,
}

impl From<LongUrlError> for AppError {
    fn from(e: LongUrlError) -> Self {
        AppError::bad_request(e.to_string(), json!({ "field": "long_url" }))
    }
}

/// Parses an absolute `http`/`https` URL and returns its canonical text.
///
/// # Canonical form
///
/// - Surrounding whitespace trimmed
/// - Host lowercased
/// - Default port (80 / 443) dropped
/// - Fragment dropped
/// - Path and query kept verbatim
///
/// # Errors
///
/// Returns [`LongUrlError`] when the input is not an absolute URL, uses another
/// scheme, or has no host.
pub fn canonicalize(input: &str) -> Result<String, LongUrlError> {
    let mut url =
        Url::parse(input.trim()).map_err(|e| LongUrlError::InvalidFormat(e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(LongUrlError::UnsupportedScheme);
    }

    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or(LongUrlError::MissingHost)?
        .to_ascii_lowercase();
    url.set_host(Some(&host))
        .map_err(|e| LongUrlError::InvalidFormat(e.to_string()))?;

    // Default ports are already dropped by the parser.
    url.set_fragment(None);

    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_form() {
        assert_eq!(
            canonicalize("  HTTPS://EXAMPLE.COM:443/Path?key=VALUE#anchor ").unwrap(),
            "https://example.com/Path?key=VALUE"
        );
    }

    #[test]
    fn test_bare_host_gets_root_path() {
        assert_eq!(canonicalize("http://example.com").unwrap(), "http://example.com/");
    }

    #[test]
    fn test_custom_port_kept() {
        assert_eq!(
            canonicalize("http://localhost:3000/test").unwrap(),
            "http://localhost:3000/test"
        );
    }

    #[test]
    fn test_relative_input_rejected() {
        assert!(matches!(
            canonicalize("example.com/page"),
            Err(LongUrlError::InvalidFormat(_))
        ));
        assert!(matches!(canonicalize(""), Err(LongUrlError::InvalidFormat(_))));
    }

    #[test]
    fn test_other_schemes_rejected() {
        for input in ["ftp://example.com/file", "javascript:alert(1)", "mailto:a@b.c"] {
            assert!(matches!(
                canonicalize(input),
                Err(LongUrlError::UnsupportedScheme)
            ));
        }
    }

    #[test]
    fn test_error_converts_to_validation() {
        let err: AppError = LongUrlError::UnsupportedScheme.into();
        assert!(err.is_validation());
        assert_eq!(err.details()["field"], "long_url");
    }
}

//! Short code generation.
//!
//! Codes are [`CODE_LENGTH`] symbols drawn uniformly from a 62-symbol
//! alphanumeric alphabet. Random bytes come from the OS via `getrandom`;
//! bytes at or above [`ACCEPT_BELOW`] are discarded so every symbol is
//! equally likely.

use serde_json::json;

use crate::error::AppError;

/// Length of every generated short code.
pub const CODE_LENGTH: usize = 5;

const ALPHABET: &[u8; 62] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Largest multiple of 62 that fits in a byte.
const ACCEPT_BELOW: u8 = 248;

/// Generates one random short code.
///
/// # Errors
///
/// Returns [`AppError::Internal`] if the OS random source fails.
///
/// # Examples
///
/// ```ignore
/// let code = generate_code()?;
/// assert_eq!(code.len(), 5);
/// assert!(is_valid_code(&code));
/// ```
pub fn generate_code() -> Result<String, AppError> {
    let mut code = String::with_capacity(CODE_LENGTH);
    let mut buffer = [0u8; 16];

    while code.len() < CODE_LENGTH {
        getrandom::fill(&mut buffer).map_err(|e| {
            AppError::internal("Random source failure", json!({ "reason": e.to_string() }))
        })?;

        for byte in buffer.iter().copied().filter(|b| *b < ACCEPT_BELOW) {
            if code.len() == CODE_LENGTH {
                break;
            }
            code.push(ALPHABET[usize::from(byte % 62)] as char);
        }
    }

    Ok(code)
}

/// True when `code` has the shape of a generated short code.
pub fn is_valid_code(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.bytes().all(|b| b.is_ascii_alphanumeric())
}

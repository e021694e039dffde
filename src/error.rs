//! Error taxonomy shared by the store adapters and the metering services.
//!
//! Every failure is constructed at the check that detects it and travels
//! unchanged to the caller. A boundary layer maps [`AppError::code`] to its
//! own response format; [`AppError::to_body`] provides a ready-made JSON shape.

use serde::Serialize;
use serde_json::{Value, json};

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorInfo,
}

#[derive(Debug, Serialize)]
pub struct ErrorInfo {
    pub code: &'static str,
    pub message: String,
    pub details: Value,
}

/// Failure kinds produced by the metering core.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Bad input or a business-rule violation.
    #[error("{message}")]
    Validation { message: String, details: Value },

    /// Wallet cannot cover the requested amount. A validation failure.
    #[error("{message}")]
    InsufficientBalance { message: String, details: Value },

    /// Caller identity does not match the target resource.
    #[error("{message}")]
    Unauthorized { message: String, details: Value },

    /// The resource exists but the operation is not permitted in its state.
    #[error("{message}")]
    Forbidden { message: String, details: Value },

    #[error("{message}")]
    NotFound { message: String, details: Value },

    /// Uniqueness violation or a write that lost a race at commit.
    #[error("{message}")]
    Conflict { message: String, details: Value },

    /// No free short code could be found within the attempt budget.
    #[error("{message}")]
    CapacityExhausted { message: String, details: Value },

    /// Store failure.
    #[error("{message}")]
    Database { message: String, details: Value },

    #[error("{message}")]
    Internal { message: String, details: Value },
}

impl AppError {
    pub fn bad_request(message: impl Into<String>, details: Value) -> Self {
        Self::Validation {
            message: message.into(),
            details,
        }
    }

    pub fn insufficient_balance(message: impl Into<String>, details: Value) -> Self {
        Self::InsufficientBalance {
            message: message.into(),
            details,
        }
    }

    pub fn unauthorized(message: impl Into<String>, details: Value) -> Self {
        Self::Unauthorized {
            message: message.into(),
            details,
        }
    }

    pub fn forbidden(message: impl Into<String>, details: Value) -> Self {
        Self::Forbidden {
            message: message.into(),
            details,
        }
    }

    pub fn not_found(message: impl Into<String>, details: Value) -> Self {
        Self::NotFound {
            message: message.into(),
            details,
        }
    }

    pub fn conflict(message: impl Into<String>, details: Value) -> Self {
        Self::Conflict {
            message: message.into(),
            details,
        }
    }

    pub fn capacity_exhausted(message: impl Into<String>, details: Value) -> Self {
        Self::CapacityExhausted {
            message: message.into(),
            details,
        }
    }

    pub fn database(message: impl Into<String>, details: Value) -> Self {
        Self::Database {
            message: message.into(),
            details,
        }
    }

    pub fn internal(message: impl Into<String>, details: Value) -> Self {
        Self::Internal {
            message: message.into(),
            details,
        }
    }

    /// Stable machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "validation_error",
            AppError::InsufficientBalance { .. } => "insufficient_balance",
            AppError::Unauthorized { .. } => "unauthorized",
            AppError::Forbidden { .. } => "forbidden",
            AppError::NotFound { .. } => "not_found",
            AppError::Conflict { .. } => "conflict",
            AppError::CapacityExhausted { .. } => "capacity_exhausted",
            AppError::Database { .. } => "database_error",
            AppError::Internal { .. } => "internal_error",
        }
    }

    /// True for plain validation failures and for [`AppError::InsufficientBalance`].
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppError::Validation { .. } | AppError::InsufficientBalance { .. }
        )
    }

    pub fn details(&self) -> &Value {
        match self {
            AppError::Validation { details, .. }
            | AppError::InsufficientBalance { details, .. }
            | AppError::Unauthorized { details, .. }
            | AppError::Forbidden { details, .. }
            | AppError::NotFound { details, .. }
            | AppError::Conflict { details, .. }
            | AppError::CapacityExhausted { details, .. }
            | AppError::Database { details, .. }
            | AppError::Internal { details, .. } => details,
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: ErrorInfo {
                code: self.code(),
                message: self.to_string(),
                details: self.details().clone(),
            },
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let fields = serde_json::to_value(&errors).unwrap_or(Value::Null);
        AppError::bad_request("Validation failed", json!({ "fields": fields }))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        map_sqlx_error(e)
    }
}

pub fn map_sqlx_error(e: sqlx::Error) -> AppError {
    if let Some(db) = e.as_database_error() {
        if db.is_unique_violation() {
            return AppError::conflict(
                "Unique constraint violation",
                json!({ "constraint": db.constraint() }),
            );
        }
        if matches!(db.code().as_deref(), Some("40001") | Some("40P01")) {
            return AppError::conflict("Concurrent modification detected", json!({}));
        }
        if db.is_check_violation() {
            return AppError::bad_request(
                "Check constraint violation",
                json!({ "constraint": db.constraint() }),
            );
        }
    }

    tracing::error!(error = %e, "store failure");
    AppError::database("Database error", json!({}))
}

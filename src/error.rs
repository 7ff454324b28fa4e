//! Error taxonomy returned by graph operations.
//!
//! Callers branch on four shapes: constraint violations, not-found,
//! not-singular and validation failures. Everything else is an
//! infrastructure failure that should be logged and surfaced.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error carried inside classified variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
    /// The data violates a uniqueness, foreign-key or check rule.
    #[error("constraint failed: {message}")]
    Constraint {
        message: String,
        #[source]
        source: BoxError,
    },

    /// Zero rows matched an operation that expected exactly one.
    #[error("{label} not found")]
    NotFound { label: String },

    /// More than one row matched an operation that expected exactly one.
    #[error("{label} not singular")]
    NotSingular { label: String },

    /// The operation spec itself is malformed.
    #[error("validation failed for field {field:?}: {source}")]
    Validation {
        field: String,
        #[source]
        source: BoxError,
    },

    /// Unclassified driver error.
    #[error(transparent)]
    Driver(#[from] sqlx::Error),

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation deadline exceeded")]
    DeadlineExceeded,

    /// The operation failed and rolling back its transaction failed too.
    #[error("{source}: rolling back transaction: {rollback}")]
    Rollback {
        #[source]
        source: Box<Error>,
        rollback: sqlx::Error,
    },
}

impl Error {
    pub fn constraint(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Error::Constraint {
            message: message.into(),
            source: source.into(),
        }
    }

    pub fn not_found(label: impl Into<String>) -> Self {
        Error::NotFound {
            label: label.into(),
        }
    }

    pub fn not_singular(label: impl Into<String>) -> Self {
        Error::NotSingular {
            label: label.into(),
        }
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        let reason: String = reason.into();
        Error::Validation {
            field: field.into(),
            source: BoxError::from(reason),
        }
    }

    /// The error that caused the operation to fail, looking through a
    /// failed rollback.
    pub fn cause(&self) -> &Error {
        match self {
            Error::Rollback { source, .. } => source.cause(),
            other => other,
        }
    }

    pub fn is_constraint_error(&self) -> bool {
        matches!(self.cause(), Error::Constraint { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.cause(), Error::NotFound { .. })
    }

    pub fn is_not_singular(&self) -> bool {
        matches!(self.cause(), Error::NotSingular { .. })
    }

    pub fn is_validation_error(&self) -> bool {
        matches!(self.cause(), Error::Validation { .. })
    }
}

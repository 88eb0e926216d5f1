//! # Store Errors
//!
//! Everything a repository call can fail with, and how each failure is
//! classified for the caller.
//!
//! ```text
//! sqlx::Error ───────────┐
//! deadline elapsed ──────┼──► DbError ──category()──► Validation | Forbidden
//! CoreError (rule) ──────┘                            NotFound   | Conflict
//!                                                     Store      | Upstream
//! ```
//!
//! | Variant | Category |
//! |---|---|
//! | `NotFound` | NotFound |
//! | `UniqueViolation`, `Conflict` | Conflict |
//! | `Domain(e)` | whatever `e` is |
//! | everything else | Store |

use std::time::Duration;

use kassa_core::{CoreError, ErrorCategory, ValidationError};
use sqlx::error::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    /// No order, receipt or till with that number.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// An insert collided with a UNIQUE index, e.g. two tills racing for
    /// the same `till_no`. SQLite names only the column, so `value` is
    /// known just when the caller raised the error itself.
    #[error("Duplicate {field}{}", already_exists(.value))]
    UniqueViolation { field: String, value: Option<String> },

    /// A guarded UPDATE matched nothing: wrong state or a stale version.
    #[error("{entity} {id} conflict: {reason}")]
    Conflict {
        entity: String,
        id: String,
        reason: String,
    },

    /// Rolled back after running past its budget.
    #[error("{operation} exceeded its {budget:?} deadline")]
    DeadlineExceeded {
        operation: &'static str,
        budget: Duration,
    },

    /// A JSON column did not decode.
    #[error("Corrupt {column} column: {message}")]
    Corrupt { column: String, message: String },

    /// Foreign key, CHECK or NOT NULL constraint.
    #[error("Constraint violated: {0}")]
    Constraint(String),

    #[error("Store unavailable: {0}")]
    ConnectionFailed(String),

    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Commit or rollback did not go through.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// A ledger rule rejected the operation.
    #[error(transparent)]
    Domain(#[from] CoreError),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: Some(value.into()),
        }
    }

    pub fn conflict(entity: impl Into<String>, id: impl ToString, reason: impl Into<String>) -> Self {
        DbError::Conflict {
            entity: entity.into(),
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn corrupt(column: impl Into<String>, err: impl ToString) -> Self {
        DbError::Corrupt {
            column: column.into(),
            message: err.to_string(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            DbError::NotFound { .. } => ErrorCategory::NotFound,
            DbError::UniqueViolation { .. } | DbError::Conflict { .. } => ErrorCategory::Conflict,
            DbError::Domain(err) => err.category(),
            _ => ErrorCategory::Store,
        }
    }
}

fn already_exists(value: &Option<String>) -> String {
    match value {
        Some(value) => format!(": '{}' already exists", value),
        None => String::new(),
    }
}

/// SQLite reports the offending index as `UNIQUE constraint failed: t.col`.
fn unique_column(message: &str) -> String {
    message
        .rsplit_once(": ")
        .map(|(_, column)| column.to_string())
        .unwrap_or_else(|| message.to_string())
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Row", "?"),
            sqlx::Error::Database(db_err) => match db_err.kind() {
                ErrorKind::UniqueViolation => DbError::UniqueViolation {
                    field: unique_column(db_err.message()),
                    value: None,
                },
                ErrorKind::ForeignKeyViolation | ErrorKind::CheckViolation | ErrorKind::NotNullViolation => {
                    DbError::Constraint(db_err.message().to_string())
                }
                _ => DbError::QueryFailed(db_err.message().to_string()),
            },
            sqlx::Error::PoolTimedOut => DbError::ConnectionFailed("no free connection".to_string()),
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("pool closed".to_string()),
            sqlx::Error::Io(e) => DbError::ConnectionFailed(e.to_string()),
            other => DbError::QueryFailed(other.to_string()),
        }
    }
}

impl From<ValidationError> for DbError {
    fn from(err: ValidationError) -> Self {
        DbError::Domain(CoreError::Validation(err))
    }
}

pub type DbResult<T> = Result<T, DbError>;

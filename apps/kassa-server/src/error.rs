//! # API Error Type
//!
//! Unified error and reply types for the ledger services.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Kassa                                  │
//! │                                                                         │
//! │  Service method                                                         │
//! │  Result<T, ApiError>                                                    │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  Capability check ─── CoreError::Forbidden ──────────┐                 │
//! │         │                                             │                 │
//! │         ▼                                             ▼                 │
//! │  Ledger operation ─── DbError::Conflict ─────────► ApiError            │
//! │         │              DbError::QueryFailed ───────►  code + message   │
//! │         │                                             + trace           │
//! │         ▼                                             │                 │
//! │  Reply<T> ◄───────────────────────────────────────────┘                 │
//! │  { "response": "success" | "forbidden" | "error", ... }                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The trace carries the underlying error text. It is attached for
//! operators and never replaces the code.

use kassa_core::{CoreError, ErrorCategory, ValidationError};
use kassa_db::DbError;
use serde::Serialize;

/// Result type for service internals.
pub type ApiResult<T> = Result<T, ApiError>;

/// A failed ledger operation, as the caller sees it.
///
/// ## Serialization
/// ```json
/// {
///   "code": "CONFLICT",
///   "message": "Receipt 120261016012 conflict: cannot void a PAID receipt",
///   "trace": null
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,

    /// Underlying error text, when it differs from the message
    pub trace: Option<String>,
}

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Missing or malformed identity token
    Unauthenticated,

    /// Capability or approval check failed
    Forbidden,

    /// Input validation failed
    ValidationError,

    /// No matching order, receipt or till
    NotFound,

    /// A state predicate or version check prevented the write
    Conflict,

    /// Store failure, including deadline expiry
    StoreError,

    /// Identity, till or catalog service call failed
    UpstreamError,
}

impl From<ErrorCategory> for ErrorCode {
    fn from(category: ErrorCategory) -> Self {
        match category {
            ErrorCategory::Validation => ErrorCode::ValidationError,
            ErrorCategory::Forbidden => ErrorCode::Forbidden,
            ErrorCategory::NotFound => ErrorCode::NotFound,
            ErrorCategory::Conflict => ErrorCode::Conflict,
            ErrorCategory::Store => ErrorCode::StoreError,
            ErrorCategory::Upstream => ErrorCode::UpstreamError,
        }
    }
}

impl ApiError {
    /// Creates a new API error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
            trace: None,
        }
    }

    /// Attaches the underlying error text.
    pub fn with_trace(mut self, trace: impl ToString) -> Self {
        self.trace = Some(trace.to_string());
        self
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Unauthenticated, message)
    }

    /// True for errors the caller should see as "forbidden".
    pub fn is_forbidden(&self) -> bool {
        matches!(self.code, ErrorCode::Forbidden | ErrorCode::Unauthenticated)
    }
}

/// Converts store errors to API errors.
///
/// Store failures get a generic message; the detail moves to the trace.
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Domain(core) => core.into(),
            DbError::DeadlineExceeded { operation, .. } => {
                tracing::error!(operation, "Store deadline exceeded");
                ApiError::new(ErrorCode::StoreError, "The operation timed out").with_trace(err)
            }
            other => {
                let code = ErrorCode::from(other.category());
                if code == ErrorCode::StoreError {
                    tracing::error!(error = %other, "Store operation failed");
                    ApiError::new(code, "Store operation failed").with_trace(other)
                } else {
                    ApiError::new(code, other.to_string())
                }
            }
        }
    }
}

/// Converts core errors to API errors.
impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let code = ErrorCode::from(err.category());
        match err {
            CoreError::Upstream { ref service, .. } => {
                tracing::error!(service = %service, error = %err, "Upstream call failed");
                ApiError::new(code, format!("The {} service is unavailable", service)).with_trace(err)
            }
            other => ApiError::new(code, other.to_string()),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        CoreError::from(err).into()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// =============================================================================
// Reply
// =============================================================================

/// Top-level outcome of a service call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Forbidden,
    Error,
}

/// Structured result of every service call.
///
/// ```json
/// { "response": "success", "code": null, "message": "", "trace": null, "data": {...} }
/// { "response": "forbidden", "code": "FORBIDDEN", "message": "amina does not have the approve_sales right", ... }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct Reply<T> {
    pub response: Outcome,
    pub code: Option<ErrorCode>,
    pub message: String,
    pub trace: Option<String>,
    pub data: Option<T>,
}

impl<T> Reply<T> {
    pub fn success(data: T) -> Self {
        Reply {
            response: Outcome::Success,
            code: None,
            message: String::new(),
            trace: None,
            data: Some(data),
        }
    }

    pub fn failure(err: ApiError) -> Self {
        let response = if err.is_forbidden() {
            Outcome::Forbidden
        } else {
            Outcome::Error
        };
        Reply {
            response,
            code: Some(err.code),
            message: err.message,
            trace: err.trace,
            data: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.response == Outcome::Success
    }
}

impl<T> From<ApiResult<T>> for Reply<T> {
    fn from(result: ApiResult<T>) -> Self {
        match result {
            Ok(data) => Reply::success(data),
            Err(err) => Reply::failure(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kassa_core::ApprovalRejection;
    use std::time::Duration;

    #[test]
    fn test_forbidden_keeps_its_category() {
        let err: ApiError = CoreError::forbidden("amina does not have the cash_rollups right").into();
        let reply: Reply<()> = Err(err).into();
        assert_eq!(reply.response, Outcome::Forbidden);
        assert_eq!(reply.code, Some(ErrorCode::Forbidden));
    }

    #[test]
    fn test_approval_rejections_are_forbidden() {
        let err: ApiError = CoreError::from(ApprovalRejection::TokenExpired {
            approver: "otieno".into(),
        })
        .into();
        assert!(err.is_forbidden());
    }

    #[test]
    fn test_store_failure_moves_detail_to_trace() {
        let err: ApiError = DbError::QueryFailed("disk I/O error".into()).into();
        assert_eq!(err.code, ErrorCode::StoreError);
        assert_eq!(err.message, "Store operation failed");
        assert!(err.trace.unwrap().contains("disk I/O error"));

        let reply: Reply<()> = Err(ApiError::from(DbError::QueryFailed("x".into()))).into();
        assert_eq!(reply.response, Outcome::Error);
    }

    #[test]
    fn test_deadline_is_a_store_error() {
        let err: ApiError = DbError::DeadlineExceeded {
            operation: "merge",
            budget: Duration::from_secs(30),
        }
        .into();
        assert_eq!(err.code, ErrorCode::StoreError);
        assert!(err.trace.unwrap().contains("merge"));
    }

    #[test]
    fn test_domain_errors_unwrap_through_the_store() {
        let err: ApiError = DbError::Domain(ValidationError::required("item_code").into()).into();
        assert_eq!(err.code, ErrorCode::ValidationError);

        let err: ApiError = DbError::conflict("Order", 7, "not pending").into();
        assert_eq!(err.code, ErrorCode::Conflict);
        assert!(err.trace.is_none());
    }

    #[test]
    fn test_upstream_message_names_the_service() {
        let err: ApiError = CoreError::upstream("inventory", "connection refused").into();
        assert_eq!(err.code, ErrorCode::UpstreamError);
        assert!(err.message.contains("inventory"));
        assert!(err.trace.unwrap().contains("connection refused"));
    }

    #[test]
    fn test_reply_serializes_lowercase_response() {
        let json = serde_json::to_value(Reply::success(42)).unwrap();
        assert_eq!(json["response"], "success");
        assert_eq!(json["data"], 42);
    }
}

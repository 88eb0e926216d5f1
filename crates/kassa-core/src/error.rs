//! # Error Types
//!
//! Domain error types for kassa-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  kassa-core errors (this file)                                         │
//! │  ├── CoreError         - Domain rule violations                        │
//! │  ├── ValidationError   - Input validation failures                     │
//! │  └── ApprovalRejection - Why a till-open approval was refused          │
//! │                                                                         │
//! │  kassa-db errors (separate crate)                                      │
//! │  └── DbError           - Store failures, deadlines, wraps CoreError    │
//! │                                                                         │
//! │  kassa-server errors (app)                                             │
//! │  └── ApiError          - Structured reply (success/forbidden/error)    │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → ApiError → caller       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every error maps onto one [`ErrorCategory`]. Upper layers pick the reply
//! shape from the category and keep the original message as trace.

use serde::Serialize;
use thiserror::Error;

// =============================================================================
// Error Category
// =============================================================================

/// The caller-visible classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed or missing input; retrying the same call will fail again.
    Validation,
    /// The caller lacks a capability or an approval was refused.
    Forbidden,
    /// A referenced order, receipt or till does not exist.
    NotFound,
    /// The record exists but its state or version rejects the change.
    Conflict,
    /// The relational store failed or a deadline elapsed.
    Store,
    /// A remote collaborator (identity, till assignment, catalog) failed.
    Upstream,
}

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations raised by the ledger.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),

    /// The caller's capability set does not permit the operation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Till-open approval was refused.
    #[error("Approval rejected: {0}")]
    Approval(#[from] ApprovalRejection),

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The record exists but is in the wrong state, or was modified
    /// concurrently since it was read.
    ///
    /// ## When This Occurs
    /// - Deleting an item from an order that is no longer pending
    /// - Voiding a receipt that has already been paid
    /// - Writing a cart with a stale version number
    #[error("{entity} {id} conflict: {reason}")]
    Conflict {
        entity: String,
        id: String,
        reason: String,
    },

    /// Completing an order that has no items.
    #[error("Order {0} has no items")]
    EmptyOrder(i64),

    /// The caller is not attached to an open till.
    #[error("No till assigned to the current session")]
    TillRequired,

    /// A remote collaborator failed or returned an unusable payload.
    #[error("{service} failed: {message}")]
    Upstream { service: String, message: String },
}

impl CoreError {
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn conflict(entity: impl Into<String>, id: impl ToString, reason: impl Into<String>) -> Self {
        CoreError::Conflict {
            entity: entity.into(),
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        CoreError::Forbidden(message.into())
    }

    pub fn upstream(service: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::Upstream {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Classifies this error for the caller.
    pub fn category(&self) -> ErrorCategory {
        match self {
            CoreError::Validation(_) | CoreError::EmptyOrder(_) | CoreError::TillRequired => {
                ErrorCategory::Validation
            }
            CoreError::Forbidden(_) | CoreError::Approval(_) => ErrorCategory::Forbidden,
            CoreError::NotFound { .. } => ErrorCategory::NotFound,
            CoreError::Conflict { .. } => ErrorCategory::Conflict,
            CoreError::Upstream { .. } => ErrorCategory::Upstream,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Bad input, caught before anything is written.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("missing {field}")]
    Required { field: String },

    #[error("{field} must be greater than zero")]
    MustBePositive { field: String },

    #[error("{field} outside {min}..={max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Also raised when a derived number would overflow its digits.
    #[error("malformed {field}: {reason}")]
    InvalidFormat { field: String, reason: String },

    #[error("{field} accepts only {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

impl ValidationError {
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }
}

// =============================================================================
// Approval Rejection
// =============================================================================

/// Why the approver of a till opening was refused.
///
/// Each variant renders a distinct message so the cashier knows whether to
/// fetch another supervisor or just a fresh token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApprovalRejection {
    #[error("{approver} is not allowed to approve till openings")]
    ApproverLacksRights { approver: String },

    #[error("approval token does not match {approver}'s current token")]
    TokenMismatch { approver: String },

    #[error("{approver}'s approval token has expired")]
    TokenExpired { approver: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

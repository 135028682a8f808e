//! Shared error types.

use crate::ids::TenantId;
use serde::Serialize;
use thiserror::Error;

/// Standardized error type shared across the federation crates.
///
/// Handler crates define their own richer error enums; this type covers
/// the cross-cutting cases (lookup misses, tenant isolation, validation)
/// that every crate needs.
#[derive(Debug, Clone, Error, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoreError {
    /// Requested resource was not found.
    #[error("{resource} not found{}", id.as_ref().map(|i| format!(": {i}")).unwrap_or_default())]
    NotFound {
        /// The type of resource that was not found (e.g. "Account", "Role").
        resource: String,
        /// Optional identifier of the resource.
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    /// Tenant isolation violation.
    ///
    /// An operation attempted to access data belonging to a different
    /// tenant. This is a security error, not an operational one.
    #[error("Tenant mismatch: expected {expected}, got {actual}")]
    TenantMismatch {
        expected: TenantId,
        actual: TenantId,
    },

    /// Input validation failure.
    #[error("Validation error on field '{field}': {message}")]
    Validation {
        /// The field that failed validation.
        field: String,
        /// Description of the validation failure.
        message: String,
    },

    /// A uniqueness constraint was violated (e.g. duplicate email).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Failure in the backing store.
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Type alias for Results using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

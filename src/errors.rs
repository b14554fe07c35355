//! Application error model with MCP error mapping
//!
//! Defines a typed error hierarchy using `thiserror` for internal error handling,
//! and maps each variant to the appropriate MCP `ErrorData` type for protocol
//! compliance. Failures raised by the automation host itself are modelled by
//! [`HostError`](crate::host::HostError) and converted here.

use rmcp::model::ErrorData;
use serde_json::json;
use thiserror::Error;

use crate::host::HostError;

/// Application error type
///
/// Covers all error cases the Outlook MCP server may encounter. Each variant
/// maps to an appropriate MCP error code in [`ErrorData`].
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid user input (validation failed, malformed request)
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Resource not found (default folder, stale handle)
    #[error("not found: {0}")]
    NotFound(String),
    /// A folder path segment did not resolve
    ///
    /// `matched_prefix` is the longest prefix that did resolve and `siblings`
    /// lists the child folder names available at the point of failure.
    #[error("folder '{path}' not found (resolved up to '{matched_prefix}')")]
    FolderNotFound {
        path: String,
        matched_prefix: String,
        siblings: Vec<String>,
    },
    /// The automation host cannot be reached at all
    #[error("automation host unavailable: {0}")]
    HostUnavailable(String),
    /// The host refused a restriction predicate
    #[error("restriction rejected: {0}")]
    RestrictionRejected(String),
    /// Caller-side wait for a host job expired
    #[error("operation timed out: {0}")]
    Timeout(String),
    /// Internal error (unexpected failure, external crate error)
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Convenience constructor for `InvalidInput`
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Convert to MCP `ErrorData`
    ///
    /// Maps each `AppError` variant to the appropriate MCP error type and
    /// includes a structured `code` field for client error handling.
    ///
    /// # Mappings
    ///
    /// - `InvalidInput` → `invalid_params`
    /// - `NotFound` → `resource_not_found`
    /// - `FolderNotFound` → `resource_not_found` (with prefix and siblings)
    /// - `HostUnavailable` → `internal_error`
    /// - `RestrictionRejected` → `invalid_request`
    /// - `Timeout` → `internal_error`
    /// - `Internal` → `internal_error`
    pub fn to_error_data(&self) -> ErrorData {
        match self {
            Self::InvalidInput(msg) => {
                ErrorData::invalid_params(msg.clone(), Some(json!({ "code": "invalid_input" })))
            }
            Self::NotFound(msg) => {
                ErrorData::resource_not_found(msg.clone(), Some(json!({ "code": "not_found" })))
            }
            Self::FolderNotFound {
                path,
                matched_prefix,
                siblings,
            } => ErrorData::resource_not_found(
                format!("{self}; use outlook_list_folders to see available folders"),
                Some(json!({
                    "code": "folder_not_found",
                    "path": path,
                    "matched_prefix": matched_prefix,
                    "siblings": siblings,
                })),
            ),
            Self::HostUnavailable(msg) => ErrorData::internal_error(
                msg.clone(),
                Some(json!({ "code": "host_unavailable" })),
            ),
            Self::RestrictionRejected(msg) => ErrorData::invalid_request(
                msg.clone(),
                Some(json!({ "code": "restriction_rejected" })),
            ),
            Self::Timeout(msg) => {
                ErrorData::internal_error(msg.clone(), Some(json!({ "code": "timeout" })))
            }
            Self::Internal(msg) => {
                ErrorData::internal_error(msg.clone(), Some(json!({ "code": "internal" })))
            }
        }
    }

    /// Whether this error means the host session is gone
    pub fn is_host_lost(&self) -> bool {
        matches!(self, Self::HostUnavailable(_))
    }
}

impl From<HostError> for AppError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::Unavailable(msg) => Self::HostUnavailable(msg),
            HostError::Rejected(msg) => Self::RestrictionRejected(msg),
            HostError::Unsupported => {
                Self::RestrictionRejected("host does not support restrictions".to_owned())
            }
            HostError::Stale(msg) => Self::NotFound(format!("handle is no longer valid: {msg}")),
            HostError::OutOfRange(position) => {
                Self::Internal(format!("item position {position} is out of range"))
            }
            HostError::Dereference(msg) => Self::Internal(format!("item could not be read: {msg}")),
        }
    }
}

/// Type alias for fallible return values
///
/// Use this for all internal functions that can fail. Provides a consistent
/// error type throughout the codebase.
pub type AppResult<T> = Result<T, AppError>;

//! Error types for the review-relay domain.
//!
//! Each failure surface has its own type so callers can decide locally what to
//! catch and what to escalate:
//!
//! - [`ConfigurationError`]: a required setting is missing or invalid; fatal at
//!   startup for the component that needs it.
//! - [`GatewayError`]: a remote API (agent or hosting) call failed.
//! - [`RepositoryError`]: the session store could not be read or written.
//! - [`StoreError`]: everything a session store operation can fail with,
//!   including addressing a task that does not exist.

use thiserror::Error;

use crate::{TaskId, TaskStateKind};

/// Maximum number of characters of a response body retained in a
/// [`GatewayError::Status`] excerpt.
pub const RESPONSE_EXCERPT_LIMIT: usize = 200;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// A required setting is missing or has an unusable value.
///
/// Produced at load time; no component starts with an invalid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Configuration error: {message}")]
pub struct ConfigurationError {
    /// Description of the configuration problem.
    pub message: String,
}

impl ConfigurationError {
    /// Creates a [`ConfigurationError`] from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// A call to a remote gateway (agent API or hosting API) failed.
///
/// Every variant is treated identically by the lifecycle code: the failing
/// call's context is abandoned and the failure is logged. The variants exist
/// so the log line says *why*.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The remote answered with a non-success HTTP status.
    #[error("HTTP {status} from {operation}: {excerpt}")]
    Status {
        /// Name of the failing operation (e.g. `"create_session"`).
        operation: &'static str,
        /// HTTP status code.
        status: u16,
        /// Leading portion of the response body, at most
        /// [`RESPONSE_EXCERPT_LIMIT`] characters.
        excerpt: String,
    },

    /// The request could not be sent or the response could not be read.
    #[error("transport failure in {operation}: {message}")]
    Transport {
        /// Name of the failing operation.
        operation: &'static str,
        /// Underlying transport error text.
        message: String,
    },

    /// The call did not complete within its configured timeout.
    #[error("{operation} timed out")]
    Timeout {
        /// Name of the failing operation.
        operation: &'static str,
    },

    /// The remote answered successfully but the body was not what the
    /// protocol promises (invalid JSON, missing required field).
    #[error("malformed response from {operation}: {message}")]
    MalformedResponse {
        /// Name of the failing operation.
        operation: &'static str,
        /// What was wrong with the body.
        message: String,
    },

    /// The request was refused locally, before anything was sent, because
    /// its arguments cannot be expressed in the remote protocol.
    #[error("invalid request for {operation}: {message}")]
    InvalidRequest {
        /// Name of the failing operation.
        operation: &'static str,
        /// Which argument was unusable.
        message: String,
    },
}

impl GatewayError {
    /// Builds a [`GatewayError::Status`], truncating the body to the excerpt limit.
    pub fn status(operation: &'static str, status: u16, body: &str) -> Self {
        Self::Status {
            operation,
            status,
            excerpt: excerpt(body),
        }
    }

    /// The HTTP status code, when the failure was a non-success response.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The response body excerpt, when the failure was a non-success response.
    pub fn excerpt(&self) -> Option<&str> {
        match self {
            Self::Status { excerpt, .. } => Some(excerpt.as_str()),
            _ => None,
        }
    }
}

/// Truncates `body` to at most [`RESPONSE_EXCERPT_LIMIT`] characters on a
/// character boundary.
pub fn excerpt(body: &str) -> String {
    body.chars().take(RESPONSE_EXCERPT_LIMIT).collect()
}

// ---------------------------------------------------------------------------
// Session store
// ---------------------------------------------------------------------------

/// The persisted task collection could not be read or written.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The backing storage could not be read.
    #[error("failed to read session store at {location}: {message}")]
    Read { location: String, message: String },

    /// The backing storage was readable but its content is not a valid task
    /// collection. The store is never silently treated as empty in this case.
    #[error("session store at {location} is corrupt: {message}")]
    Corrupt { location: String, message: String },

    /// The backing storage could not be written.
    #[error("failed to write session store at {location}: {message}")]
    Write { location: String, message: String },
}

/// Errors returned by [`crate::SessionStore`] operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Storage-level failure.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// A state-changing operation addressed a task that is not in the store.
    #[error("task {task_id} not found in session store")]
    NotFound { task_id: TaskId },

    /// A terminal-marking operation addressed a task that already left `open`.
    ///
    /// The stored record is left unchanged.
    #[error("task {task_id} is already {state}")]
    AlreadyTerminal {
        task_id: TaskId,
        state: TaskStateKind,
    },
}

impl StoreError {
    /// Returns `true` for [`StoreError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_keeps_code_and_truncated_excerpt() {
        let body = "x".repeat(500);
        let err = GatewayError::status("create_session", 502, &body);
        assert_eq!(err.status_code(), Some(502));
        assert_eq!(err.excerpt().map(str::len), Some(RESPONSE_EXCERPT_LIMIT));
    }

    #[test]
    fn non_status_errors_have_no_code() {
        let err = GatewayError::Timeout {
            operation: "get_session",
        };
        assert_eq!(err.status_code(), None);
        assert_eq!(err.excerpt(), None);
        assert_eq!(err.to_string(), "get_session timed out");
    }

    #[test]
    fn invalid_request_names_the_local_cause() {
        let err = GatewayError::InvalidRequest {
            operation: "create_comment",
            message: "repository no-slash is not in owner/repo form".into(),
        };
        assert_eq!(err.status_code(), None);
        assert!(err.to_string().starts_with("invalid request for create_comment"));
    }

    #[test]
    fn excerpt_respects_char_boundaries() {
        let body = "é".repeat(300);
        assert_eq!(excerpt(&body).chars().count(), RESPONSE_EXCERPT_LIMIT);
    }
}

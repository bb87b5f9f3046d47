//! Error types for the reconciliation engine.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An error reported by the remote API, kept exactly as the remote sent it.
///
/// The code and message are the only actionable diagnostic an operator gets,
/// so every layer passes this value through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    /// The remote error code (e.g. `RequestLimitExceeded`).
    pub code: String,
    /// The remote error message.
    pub message: String,
    /// The remote request id, if the API returned one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl RemoteError {
    /// Create a remote error from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            request_id: None,
        }
    }

    /// Attach the remote request id.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(request_id) = &self.request_id {
            write!(f, " (request id: {})", request_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for RemoteError {}

/// Errors surfaced by the engine to the orchestrating runtime.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A transient remote failure. Only seen by callers that opt out of retrying.
    #[error("Transient remote error: {0}")]
    Transient(RemoteError),

    /// A fatal remote failure, surfaced after a single attempt.
    #[error("Remote error: {0}")]
    Remote(RemoteError),

    /// The remote resource does not exist.
    #[error("Resource not found: {0}")]
    NotFound(RemoteError),

    /// The remote API reports the resource is already in the requested state.
    #[error("Already in desired state: {0}")]
    AlreadyInDesiredState(RemoteError),

    /// The time budget elapsed before the operation succeeded.
    #[error(
        "Deadline exceeded: {action} timed out after {elapsed:?}{}",
        describe_last(.last_status, .last_error)
    )]
    DeadlineExceeded {
        /// The action that timed out.
        action: String,
        /// How long the engine kept trying.
        elapsed: Duration,
        /// The last status observed by a waiter, if any.
        last_status: Option<String>,
        /// The last remote error observed, verbatim.
        last_error: Option<RemoteError>,
    },

    /// A waiter observed a status from its fatal set.
    #[error("Unexpected status '{status}' while waiting for {action}")]
    UnexpectedStatus {
        /// The action being waited on.
        action: String,
        /// The fatal status reported by the remote API.
        status: String,
    },

    /// A required attribute is absent.
    #[error("Malformed shape: required attribute '{path}' is absent")]
    MalformedShape {
        /// Dotted path of the missing attribute.
        path: String,
    },

    /// A value disagrees with the type declared by the shape descriptor.
    #[error("Type mismatch at '{path}': expected {expected}, got {found}")]
    TypeMismatch {
        /// Dotted path of the offending value.
        path: String,
        /// The type declared by the shape.
        expected: String,
        /// The type actually found.
        found: String,
    },

    /// A persisted composite identifier could not be decoded.
    #[error("Invalid identifier '{id}': {reason}")]
    Identifier {
        /// The identifier as persisted.
        id: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An update tried to change an attribute that forces replacement.
    #[error("Attribute '{0}' cannot be changed")]
    ImmutableAttribute(String),

    /// The remote resource exists but a later step failed.
    #[error("Resource '{id}' was partially applied: {source}")]
    PartiallyApplied {
        /// The identifier of the partially created resource.
        id: String,
        /// The failure that interrupted the operation.
        source: Box<EngineError>,
    },

    /// The engine configuration is invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn describe_last(status: &Option<String>, error: &Option<RemoteError>) -> String {
    let mut out = String::new();
    if let Some(status) = status {
        out.push_str(&format!("; last status: {}", status));
    }
    if let Some(error) = error {
        out.push_str(&format!("; last error: {}", error));
    }
    out
}

impl EngineError {
    /// Build a type mismatch error.
    pub fn type_mismatch(
        path: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            path: path.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Get the error message as a string.
    ///
    /// Remote variants return the remote message verbatim; everything else
    /// returns its display form.
    pub fn message(&self) -> String {
        match self.remote_error() {
            Some(remote) => remote.message.clone(),
            None => self.to_string(),
        }
    }

    /// The last remote error carried by this error, if any.
    ///
    /// Looks through [`EngineError::PartiallyApplied`] to the underlying failure.
    pub fn remote_error(&self) -> Option<&RemoteError> {
        match self {
            Self::Transient(e) | Self::Remote(e) | Self::NotFound(e) => Some(e),
            Self::AlreadyInDesiredState(e) => Some(e),
            Self::DeadlineExceeded { last_error, .. } => last_error.as_ref(),
            Self::PartiallyApplied { source, .. } => source.remote_error(),
            _ => None,
        }
    }

    /// Whether the executor may retry this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Whether this error means the remote resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// The identifier of a partially applied resource, if this is one.
    pub fn partial_id(&self) -> Option<&str> {
        match self {
            Self::PartiallyApplied { id, .. } => Some(id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_display() {
        let err = RemoteError::new("RequestLimitExceeded", "too many requests");
        assert_eq!(err.to_string(), "[RequestLimitExceeded] too many requests");

        let err = err.with_request_id("req-1");
        assert_eq!(
            err.to_string(),
            "[RequestLimitExceeded] too many requests (request id: req-1)"
        );
    }

    #[test]
    fn test_error_display() {
        let err = EngineError::MalformedShape {
            path: "vpc.subnet_id".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Malformed shape: required attribute 'vpc.subnet_id' is absent"
        );

        let err = EngineError::type_mismatch("count", "int64", "string");
        assert_eq!(
            err.to_string(),
            "Type mismatch at 'count': expected int64, got string"
        );

        let err = EngineError::Identifier {
            id: "a#b".to_string(),
            reason: "component count mismatch".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid identifier 'a#b': component count mismatch"
        );
    }

    #[test]
    fn test_deadline_keeps_last_error() {
        let last = RemoteError::new("InternalError", "backend busy");
        let err = EngineError::DeadlineExceeded {
            action: "CreateInstance".to_string(),
            elapsed: Duration::from_secs(3),
            last_status: None,
            last_error: Some(last.clone()),
        };

        assert_eq!(
            err.to_string(),
            "Deadline exceeded: CreateInstance timed out after 3s; last error: [InternalError] backend busy"
        );
        assert_eq!(err.remote_error(), Some(&last));
        assert_eq!(err.message(), "backend busy");
    }

    #[test]
    fn test_deadline_with_status_only() {
        let err = EngineError::DeadlineExceeded {
            action: "wait".to_string(),
            elapsed: Duration::from_secs(10),
            last_status: Some("creating".to_string()),
            last_error: None,
        };
        assert_eq!(
            err.to_string(),
            "Deadline exceeded: wait timed out after 10s; last status: creating"
        );
        assert!(err.remote_error().is_none());
    }

    #[test]
    fn test_partially_applied_exposes_inner_error() {
        let inner = EngineError::Remote(RemoteError::new("FailedOperation", "boom"));
        let err = EngineError::PartiallyApplied {
            id: "ins-1".to_string(),
            source: Box::new(inner),
        };

        assert_eq!(err.partial_id(), Some("ins-1"));
        assert_eq!(err.remote_error().map(|e| e.code.as_str()), Some("FailedOperation"));
        assert_eq!(
            err.to_string(),
            "Resource 'ins-1' was partially applied: Remote error: [FailedOperation] boom"
        );
    }

    #[test]
    fn test_classification_helpers() {
        let transient = EngineError::Transient(RemoteError::new("InternalError", "x"));
        assert!(transient.is_retryable());
        assert!(!transient.is_not_found());

        let missing = EngineError::NotFound(RemoteError::new("ResourceNotFound", "gone"));
        assert!(missing.is_not_found());
        assert!(!missing.is_retryable());
        assert_eq!(missing.message(), "gone");

        let config = EngineError::Configuration("bad".to_string());
        assert_eq!(config.message(), "Configuration error: bad");
    }
}

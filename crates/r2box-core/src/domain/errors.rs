//! Domain error types
//!
//! This module defines errors raised while constructing or transitioning
//! domain values. These are distinct from `ErrorCode`/`CoreError`, which
//! describe failures surfaced over the wire by the broker.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid bucket name
    #[error("Invalid bucket name: {0}")]
    InvalidBucketName(String),

    /// Invalid object key
    #[error("Invalid object key: {0}")]
    InvalidObjectKey(String),

    /// Invalid R2 account ID
    #[error("Invalid account ID: {0}")]
    InvalidAccountId(String),

    /// Invalid ETag
    #[error("Invalid ETag: {0}")]
    InvalidEtag(String),

    /// Invalid pagination continuation token
    #[error("Invalid continuation token: {0}")]
    InvalidContinuationToken(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),
}

// ============================================================================
// Wire error taxonomy
// ============================================================================

/// Stable machine-readable error codes carried on every error envelope.
///
/// This is the single source of truth for the `code → HTTP status` table;
/// `status_code()` below is the only place that mapping exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    ValidationInvalidParam,
    ValidationFileTooLarge,
    AuthInvalidCredentials,
    AuthPermissionDenied,
    BucketNotFound,
    ObjectNotFound,
    R2ServiceError,
    R2Timeout,
    InternalServerError,
}

impl ErrorCode {
    /// The wire string for this code, e.g. `"BUCKET_NOT_FOUND"`.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationInvalidParam => "VALIDATION_INVALID_PARAM",
            Self::ValidationFileTooLarge => "VALIDATION_FILE_TOO_LARGE",
            Self::AuthInvalidCredentials => "AUTH_INVALID_CREDENTIALS",
            Self::AuthPermissionDenied => "AUTH_PERMISSION_DENIED",
            Self::BucketNotFound => "BUCKET_NOT_FOUND",
            Self::ObjectNotFound => "OBJECT_NOT_FOUND",
            Self::R2ServiceError => "R2_SERVICE_ERROR",
            Self::R2Timeout => "R2_TIMEOUT",
            Self::InternalServerError => "INTERNAL_SERVER_ERROR",
        }
    }

    /// The HTTP status this code maps to. The only place this mapping lives.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::ValidationInvalidParam => 400,
            Self::ValidationFileTooLarge => 413,
            Self::AuthInvalidCredentials => 401,
            Self::AuthPermissionDenied => 403,
            Self::BucketNotFound | Self::ObjectNotFound => 404,
            Self::R2ServiceError => 502,
            Self::R2Timeout => 504,
            Self::InternalServerError => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The error type that crosses every component boundary above the domain
/// layer: the Provider Client raises it, the Transfer Engine stores it
/// verbatim in a task's `error` field, and the Broker's `ApiError` wraps it
/// to pick an HTTP status with no further classification.
#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct CoreError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl CoreError {
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalServerError, message)
    }
}

impl From<DomainError> for CoreError {
    fn from(err: DomainError) -> Self {
        Self::new(ErrorCode::ValidationInvalidParam, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DomainError::InvalidBucketName("AB".to_string());
        assert_eq!(err.to_string(), "Invalid bucket name: AB");

        let err = DomainError::InvalidState {
            from: "Queued".to_string(),
            to: "Completed".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid state transition from Queued to Completed"
        );
    }

    #[test]
    fn test_error_equality() {
        let err1 = DomainError::InvalidObjectKey("/leading".to_string());
        let err2 = DomainError::InvalidObjectKey("/leading".to_string());
        let err3 = DomainError::InvalidObjectKey("other".to_string());

        assert_eq!(err1, err2);
        assert_ne!(err1, err3);
    }

    #[test]
    fn test_error_clone() {
        let err = DomainError::ValidationFailed("test".to_string());
        let cloned = err.clone();
        assert_eq!(err, cloned);
    }

    #[test]
    fn error_code_http_status_matches_taxonomy_table() {
        assert_eq!(ErrorCode::ValidationInvalidParam.http_status(), 400);
        assert_eq!(ErrorCode::ValidationFileTooLarge.http_status(), 413);
        assert_eq!(ErrorCode::AuthInvalidCredentials.http_status(), 401);
        assert_eq!(ErrorCode::AuthPermissionDenied.http_status(), 403);
        assert_eq!(ErrorCode::BucketNotFound.http_status(), 404);
        assert_eq!(ErrorCode::ObjectNotFound.http_status(), 404);
        assert_eq!(ErrorCode::R2ServiceError.http_status(), 502);
        assert_eq!(ErrorCode::R2Timeout.http_status(), 504);
        assert_eq!(ErrorCode::InternalServerError.http_status(), 500);
    }

    #[test]
    fn error_code_as_str_is_screaming_snake_case() {
        assert_eq!(ErrorCode::BucketNotFound.as_str(), "BUCKET_NOT_FOUND");
        assert_eq!(ErrorCode::R2Timeout.as_str(), "R2_TIMEOUT");
    }

    #[test]
    fn core_error_carries_optional_details() {
        let err = CoreError::new(ErrorCode::ObjectNotFound, "no such key")
            .with_details(serde_json::json!({"key": "a/b.txt"}));
        assert_eq!(err.code, ErrorCode::ObjectNotFound);
        assert!(err.details.is_some());
        assert_eq!(err.to_string(), "OBJECT_NOT_FOUND: no such key");
    }

    #[test]
    fn domain_error_converts_to_validation_core_error() {
        let domain_err = DomainError::InvalidBucketName("AB".into());
        let core_err: CoreError = domain_err.into();
        assert_eq!(core_err.code, ErrorCode::ValidationInvalidParam);
    }
}

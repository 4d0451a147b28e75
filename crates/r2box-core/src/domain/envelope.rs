//! Wire envelope shapes
//!
//! Every Broker response is wrapped in one of these. `Envelope` owns the
//! JSON shape; construction is the Broker's job (it's the only component
//! that knows the current request id and can attach a success payload or
//! a `CoreError`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{CoreError, ErrorCode};
use super::newtypes::RequestId;

/// Correlation/timestamp metadata attached to every envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMeta {
    pub timestamp: DateTime<Utc>,
    pub request_id: RequestId,
}

impl EnvelopeMeta {
    #[must_use]
    pub fn new(request_id: RequestId) -> Self {
        Self {
            timestamp: Utc::now(),
            request_id,
        }
    }
}

/// The error payload nested inside an error envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&CoreError> for EnvelopeError {
    fn from(err: &CoreError) -> Self {
        Self {
            code: err.code.as_str().to_string(),
            message: err.message.clone(),
            details: err.details.clone(),
        }
    }
}

/// Tagged success/error wire envelope: `{ status: "ok"|"error", ... }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Envelope<T> {
    Ok {
        data: T,
        meta: EnvelopeMeta,
    },
    Error {
        error: EnvelopeError,
        meta: EnvelopeMeta,
    },
}

impl<T> Envelope<T> {
    #[must_use]
    pub fn ok(data: T, request_id: RequestId) -> Self {
        Self::Ok {
            data,
            meta: EnvelopeMeta::new(request_id),
        }
    }

    #[must_use]
    pub fn err(err: &CoreError, request_id: RequestId) -> Self {
        Self::Error {
            error: EnvelopeError::from(err),
            meta: EnvelopeMeta::new(request_id),
        }
    }

    #[must_use]
    pub fn http_status(&self, ok_status: u16) -> u16 {
        match self {
            Self::Ok { .. } => ok_status,
            Self::Error { error, .. } => error_code_from_str(&error.code).http_status(),
        }
    }
}

fn error_code_from_str(code: &str) -> ErrorCode {
    match code {
        "VALIDATION_FILE_TOO_LARGE" => ErrorCode::ValidationFileTooLarge,
        "AUTH_INVALID_CREDENTIALS" => ErrorCode::AuthInvalidCredentials,
        "AUTH_PERMISSION_DENIED" => ErrorCode::AuthPermissionDenied,
        "BUCKET_NOT_FOUND" => ErrorCode::BucketNotFound,
        "OBJECT_NOT_FOUND" => ErrorCode::ObjectNotFound,
        "R2_SERVICE_ERROR" => ErrorCode::R2ServiceError,
        "R2_TIMEOUT" => ErrorCode::R2Timeout,
        "INTERNAL_SERVER_ERROR" => ErrorCode::InternalServerError,
        _ => ErrorCode::ValidationInvalidParam,
    }
}

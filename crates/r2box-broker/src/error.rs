//! Centralizes `CoreError` → HTTP response conversion. `ApiError` is the
//! only type a handler ever returns on its `Err` path, and its
//! `IntoResponse` impl is the only place an HTTP status is chosen —
//! mirroring the pack's `ApiError` + `ApiErrorExt` convention.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use r2box_core::domain::envelope::Envelope;
use r2box_core::domain::errors::CoreError;
use r2box_core::domain::newtypes::RequestId;
use tracing::{error, warn};

/// A `CoreError` paired with the request id it failed under, so the
/// error envelope's `meta.requestId` matches every other log line for
/// this request.
pub struct ApiError {
    core: CoreError,
    request_id: RequestId,
}

impl ApiError {
    #[must_use]
    pub fn new(core: CoreError, request_id: RequestId) -> Self {
        Self { core, request_id }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.core.code.http_status();
        let envelope: Envelope<()> = Envelope::err(&self.core, self.request_id);

        if status >= 500 {
            error!(code = %self.core.code, status, "request failed");
        } else {
            warn!(code = %self.core.code, status, "request rejected");
        }

        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(envelope)).into_response()
    }
}

/// Builds a success envelope response with the given status code.
pub fn respond_ok<T: serde::Serialize>(
    status: StatusCode,
    request_id: RequestId,
    data: T,
) -> Response {
    let envelope = Envelope::ok(data, request_id);
    (status, Json(envelope)).into_response()
}

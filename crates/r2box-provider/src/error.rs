//! Provider → taxonomy error mapping
//!
//! A single classification function per R2 error, collapsing the
//! provider's error metadata into `r2box_core::ErrorCode`. All of
//! `aws-sdk-s3`'s generated per-operation error enums implement
//! `ProvideErrorMetadata`, so one generic function covers every call site
//! instead of one match arm per operation error type.

use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use r2box_core::domain::errors::{CoreError, ErrorCode};
use serde_json::json;

/// Classifies any `aws-sdk-s3` operation error into the wire taxonomy.
///
/// Network faults and transport-level timeouts are detected before provider
/// error codes are consulted, since an `SdkError::TimeoutError` /
/// `DispatchFailure` never carries an R2 error code to classify.
pub fn classify_sdk_error<E, R>(err: SdkError<E, R>) -> CoreError
where
    E: ProvideErrorMetadata,
{
    match &err {
        SdkError::TimeoutError(_) => {
            return CoreError::new(ErrorCode::R2Timeout, "request to R2 timed out");
        }
        SdkError::DispatchFailure(failure) => {
            return CoreError::new(
                ErrorCode::R2ServiceError,
                format!("network dispatch failure: {failure:?}"),
            );
        }
        SdkError::ConstructionFailure(_) => {
            return CoreError::internal("failed to construct R2 request");
        }
        _ => {}
    }

    let code = err.code().unwrap_or("Unknown").to_string();
    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| "R2 request failed".to_string());
    let http_status = err
        .raw_response()
        .map(|resp| resp.status().as_u16())
        .unwrap_or(0);

    let mapped = classify_provider_code(&code, http_status);

    CoreError::new(mapped, message).with_details(json!({
        "providerCode": code,
        "httpStatus": http_status,
    }))
}

/// Pure mapping from an R2/S3 error code (and, failing that, HTTP status)
/// to the wire taxonomy. Split out from [`classify_sdk_error`] so the
/// mapping table itself is testable without constructing a real
/// `SdkError`.
fn classify_provider_code(code: &str, http_status: u16) -> ErrorCode {
    match code {
        "NoSuchBucket" => ErrorCode::BucketNotFound,
        "NoSuchKey" => ErrorCode::ObjectNotFound,
        "AccessDenied" => ErrorCode::AuthPermissionDenied,
        "InvalidAccessKeyId" | "SignatureDoesNotMatch" | "RequestTimeTooSkewed" => {
            ErrorCode::AuthInvalidCredentials
        }
        _ if (500..600).contains(&http_status) => ErrorCode::R2ServiceError,
        _ if http_status == 403 => ErrorCode::AuthPermissionDenied,
        _ if http_status == 401 => ErrorCode::AuthInvalidCredentials,
        _ if http_status == 404 => ErrorCode::ObjectNotFound,
        _ => ErrorCode::InternalServerError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_no_such_bucket_to_bucket_not_found() {
        assert_eq!(
            classify_provider_code("NoSuchBucket", 404),
            ErrorCode::BucketNotFound
        );
    }

    #[test]
    fn maps_no_such_key_to_object_not_found() {
        assert_eq!(
            classify_provider_code("NoSuchKey", 404),
            ErrorCode::ObjectNotFound
        );
    }

    #[test]
    fn maps_invalid_access_key_to_auth_invalid_credentials() {
        assert_eq!(
            classify_provider_code("InvalidAccessKeyId", 403),
            ErrorCode::AuthInvalidCredentials
        );
        assert_eq!(
            classify_provider_code("SignatureDoesNotMatch", 403),
            ErrorCode::AuthInvalidCredentials
        );
        assert_eq!(
            classify_provider_code("RequestTimeTooSkewed", 403),
            ErrorCode::AuthInvalidCredentials
        );
    }

    #[test]
    fn maps_access_denied_to_auth_permission_denied() {
        assert_eq!(
            classify_provider_code("AccessDenied", 403),
            ErrorCode::AuthPermissionDenied
        );
    }

    #[test]
    fn maps_unrecognized_5xx_to_r2_service_error() {
        assert_eq!(
            classify_provider_code("InternalError", 503),
            ErrorCode::R2ServiceError
        );
    }

    #[test]
    fn falls_back_to_http_status_when_code_is_unrecognized() {
        assert_eq!(
            classify_provider_code("SomeNewError", 404),
            ErrorCode::ObjectNotFound
        );
        assert_eq!(
            classify_provider_code("SomeNewError", 401),
            ErrorCode::AuthInvalidCredentials
        );
        assert_eq!(
            classify_provider_code("SomeNewError", 200),
            ErrorCode::InternalServerError
        );
    }
}

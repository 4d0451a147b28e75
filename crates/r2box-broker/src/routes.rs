//! Route handlers. Every handler returns
//! `Result<Response, ApiError>`; envelope construction is centralized in
//! [`crate::error::respond_ok`] and `ApiError`'s `IntoResponse` impl.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Extension, Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use r2box_core::domain::cache::CacheKey;
use r2box_core::domain::errors::{CoreError, ErrorCode};
use r2box_core::domain::newtypes::{BucketName, ContinuationToken, ObjectKey, RequestId};
use r2box_core::domain::object_store::ListingPage;
use r2box_core::ports::object_store::ByteRange;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{respond_ok, ApiError};
use crate::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "uptime": state.uptime_secs(),
        "version": crate::state::VERSION,
    }))
}

pub async fn list_buckets(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
) -> Result<Response, ApiError> {
    let buckets = state
        .provider
        .list_buckets()
        .await
        .map_err(|e| ApiError::new(e, request_id))?;

    Ok(respond_ok(
        StatusCode::OK,
        request_id,
        json!({ "count": buckets.len(), "buckets": buckets }),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListObjectsQuery {
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    #[serde(default = "default_max_keys")]
    pub max_keys: u32,
    #[serde(default)]
    pub continuation_token: Option<String>,
}

fn default_delimiter() -> String {
    "/".to_string()
}

fn default_max_keys() -> u32 {
    1000
}

pub async fn list_objects(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
    Query(query): Query<ListObjectsQuery>,
    Extension(request_id): Extension<RequestId>,
) -> Result<Response, ApiError> {
    let bucket = BucketName::new(bucket).map_err(|e| ApiError::new(e.into(), request_id))?;
    let prefix = query.prefix.clone().unwrap_or_default();
    let continuation = match &query.continuation_token {
        Some(t) => Some(ContinuationToken::new(t.clone()).map_err(|e| ApiError::new(e.into(), request_id))?),
        None => None,
    };

    // Only the first page of a hierarchical listing is ever cached; a
    // continued page always goes straight to the provider.
    let consult_cache = query.delimiter == "/" && continuation.is_none();
    let cache_key = CacheKey::new(None, bucket.clone(), prefix.clone());

    if consult_cache {
        if let Some(entry) = state.cache.get(&cache_key).await {
            let page = ListingPage {
                bucket: bucket.clone(),
                prefix: prefix.clone(),
                key_count: (entry.objects.len() + entry.common_prefixes.len()) as u64,
                objects: entry.objects,
                common_prefixes: entry.common_prefixes,
                is_truncated: entry.continuation_token.is_some(),
                continuation_token: entry.continuation_token,
            };
            return Ok(respond_ok(StatusCode::OK, request_id, listing_body(&page)));
        }
    }

    let page = state
        .provider
        .list_objects(
            &bucket,
            Some(&prefix),
            &query.delimiter,
            query.max_keys,
            continuation.as_ref(),
        )
        .await
        .map_err(|e| ApiError::new(e, request_id))?;

    if consult_cache {
        state.cache.put(cache_key, &page).await;
    }

    Ok(respond_ok(StatusCode::OK, request_id, listing_body(&page)))
}

fn listing_body(page: &ListingPage) -> serde_json::Value {
    json!({
        "objects": page.objects,
        "pagination": {
            "prefix": page.prefix,
            "commonPrefixes": page.common_prefixes,
            "keyCount": page.key_count,
            "isTruncated": page.is_truncated,
            "continuationToken": page.continuation_token,
        }
    })
}

pub async fn get_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
    Extension(request_id): Extension<RequestId>,
) -> Result<Response, ApiError> {
    let bucket = BucketName::new(bucket).map_err(|e| ApiError::new(e.into(), request_id))?;
    let key = ObjectKey::new(key).map_err(|e| ApiError::new(e.into(), request_id))?;
    let range = headers
        .get(axum::http::header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_range_header);

    let stream = state
        .provider
        .get_object(&bucket, &key, range)
        .await
        .map_err(|e| ApiError::new(e, request_id))?;

    let status = if range.is_some() { StatusCode::PARTIAL_CONTENT } else { StatusCode::OK };
    let mut response = Response::builder()
        .status(status)
        .header(axum::http::header::CONTENT_TYPE, stream.content_type.clone())
        .header(axum::http::header::CONTENT_LENGTH, stream.content_length)
        .header(axum::http::header::ETAG, stream.etag.as_str())
        .header(
            axum::http::header::LAST_MODIFIED,
            stream.last_modified.to_rfc2822(),
        )
        .body(Body::from_stream(stream.body))
        .map_err(|e| ApiError::new(CoreError::internal(e.to_string()), request_id))?;

    response.headers_mut().insert(
        "x-r2box-request-id",
        HeaderValue::from_str(&request_id.to_string()).unwrap_or(HeaderValue::from_static("")),
    );
    Ok(response)
}

/// Parses a single-range `Range: bytes=start-end` header into a
/// `ByteRange`, using `http-range-header` for the syntactic parse. Multi-
/// range requests are collapsed to their first range since the broker
/// only ever streams one contiguous body per response.
fn parse_range_header(value: &str) -> Option<ByteRange> {
    let parsed = http_range_header::parse_range_header(value).ok()?;
    let (start, end) = parsed.ranges.into_iter().next()?;

    use http_range_header::{EndPosition, StartPosition};
    let start = match start {
        StartPosition::Index(idx) => idx,
        StartPosition::FromLast(_) => return None,
    };
    let end = match end {
        EndPosition::Index(idx) => Some(idx),
        EndPosition::LastByte => None,
    };

    Some(ByteRange { start, end })
}

pub async fn put_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
    Extension(request_id): Extension<RequestId>,
    request: axum::extract::Request,
) -> Result<Response, ApiError> {
    let bucket = BucketName::new(bucket).map_err(|e| ApiError::new(e.into(), request_id))?;
    let key = ObjectKey::new(key).map_err(|e| ApiError::new(e.into(), request_id))?;

    let content_length = headers
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| {
            ApiError::new(
                CoreError::new(ErrorCode::ValidationInvalidParam, "Content-Length header is required"),
                request_id,
            )
        })?;
    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    let stream = request
        .into_body()
        .into_data_stream()
        .map(|chunk| chunk.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)))
        .boxed();

    let result = state
        .provider
        .put_object(&bucket, &key, stream, content_length, &content_type)
        .await
        .map_err(|e| ApiError::new(e, request_id))?;

    state.cache.invalidate_prefix(&bucket, &parent_prefix(key.as_str())).await;

    Ok(respond_ok(
        StatusCode::CREATED,
        request_id,
        json!({ "key": key.as_str(), "etag": result.etag.as_str(), "size": result.size }),
    ))
}

pub async fn delete_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    Extension(request_id): Extension<RequestId>,
) -> Result<Response, ApiError> {
    let bucket = BucketName::new(bucket).map_err(|e| ApiError::new(e.into(), request_id))?;
    let key = ObjectKey::new(key).map_err(|e| ApiError::new(e.into(), request_id))?;

    let result = state
        .provider
        .delete_object(&bucket, &key)
        .await
        .map_err(|e| ApiError::new(e, request_id))?;

    state.cache.invalidate_prefix(&bucket, &parent_prefix(key.as_str())).await;

    Ok(respond_ok(
        StatusCode::OK,
        request_id,
        json!({ "key": key.as_str(), "deleted": result.deleted }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct BatchDeleteRequest {
    pub keys: Vec<String>,
}

#[derive(Debug, Serialize)]
struct FailedDelete {
    key: String,
    reason: String,
}

/// Keys per `deleteBatch` call to the Provider Client, matching the
/// provider's own multi-object-delete ceiling.
const BATCH_CHUNK_SIZE: usize = 1000;

pub async fn delete_batch(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
    Extension(request_id): Extension<RequestId>,
    request: axum::extract::Request,
) -> Result<Response, ApiError> {
    let bytes = axum::body::to_bytes(request.into_body(), usize::MAX)
        .await
        .map_err(|e| ApiError::new(CoreError::internal(e.to_string()), request_id))?;
    let payload: BatchDeleteRequest = serde_json::from_slice(&bytes).map_err(|e| {
        ApiError::new(
            CoreError::new(ErrorCode::ValidationInvalidParam, format!("invalid request body: {e}")),
            request_id,
        )
    })?;

    let bucket = BucketName::new(bucket).map_err(|e| ApiError::new(e.into(), request_id))?;

    let mut keys = Vec::with_capacity(payload.keys.len());
    for raw in payload.keys {
        keys.push(ObjectKey::new(raw).map_err(|e| ApiError::new(e.into(), request_id))?);
    }

    let mut deleted = 0u64;
    let mut failed = Vec::new();
    let mut invalidated_prefixes: BTreeSet<String> = BTreeSet::new();

    for chunk in keys.chunks(BATCH_CHUNK_SIZE) {
        let outcomes = state
            .provider
            .delete_batch(&bucket, chunk)
            .await
            .map_err(|e| ApiError::new(e, request_id))?;

        for outcome in outcomes {
            invalidated_prefixes.insert(parent_prefix(outcome.key.as_str()));
            if outcome.deleted {
                deleted += 1;
            } else {
                failed.push(FailedDelete {
                    key: outcome.key.as_str().to_string(),
                    reason: outcome
                        .error
                        .map(|e| e.message)
                        .unwrap_or_else(|| "unknown error".to_string()),
                });
            }
        }
    }

    for prefix in invalidated_prefixes {
        state.cache.invalidate_prefix(&bucket, &prefix).await;
    }

    Ok(respond_ok(
        StatusCode::OK,
        request_id,
        json!({ "deleted": deleted, "failed": failed }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
    Query(query): Query<SearchQuery>,
    Extension(request_id): Extension<RequestId>,
) -> Result<Response, ApiError> {
    let bucket = BucketName::new(bucket).map_err(|e| ApiError::new(e.into(), request_id))?;
    let objects = state
        .provider
        .search(&bucket, &query.q)
        .await
        .map_err(|e| ApiError::new(e, request_id))?;

    Ok(respond_ok(StatusCode::OK, request_id, json!({ "objects": objects })))
}

pub async fn shutdown(State(state): State<Arc<AppState>>) -> StatusCode {
    state.shutdown.cancel();
    StatusCode::NO_CONTENT
}

/// The folder prefix a key belongs to, e.g. `"sub/x.bin"` → `"sub/"` and
/// `"root.bin"` → `""` — the prefix the Folder Cache's `invalidatePrefix`
/// expects, matching the Transfer Engine's own upload worker.
fn parent_prefix(key: &str) -> String {
    match key.rfind('/') {
        Some(idx) => key[..=idx].to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_prefix_of_nested_key() {
        assert_eq!(parent_prefix("sub/x.bin"), "sub/");
    }

    #[test]
    fn parent_prefix_of_root_key() {
        assert_eq!(parent_prefix("root.bin"), "");
    }
}

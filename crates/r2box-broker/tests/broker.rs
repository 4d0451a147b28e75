//! End-to-end router tests driven through `tower::util::ServiceExt::oneshot`
//! against an in-memory `FakeProvider`, the same double pattern the
//! Transfer Engine's own test module uses.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use futures_core::stream::BoxStream;
use r2box_broker::state::AppState;
use r2box_cache::FolderCache;
use r2box_core::domain::errors::{CoreError, ErrorCode};
use r2box_core::domain::newtypes::{BucketName, ContinuationToken, ETag, ObjectKey};
use r2box_core::domain::object_store::{Bucket, ListingPage, Object};
use r2box_core::ports::object_store::{
    BatchDeleteOutcome, ByteRange, DeleteObjectResult, ObjectStoreProvider, ObjectStream,
    PutObjectResult,
};
use r2box_core::config::TransferConfig;
use r2box_transfer::TransferEngine;
use serde_json::Value;
use tower::util::ServiceExt;

/// An in-memory stand-in for the Provider Client, mirroring the Transfer
/// Engine's own `FakeProvider` test double.
#[derive(Default)]
struct FakeProvider {
    objects: StdMutex<HashMap<(String, String), Bytes>>,
    list_calls: StdMutex<u32>,
}

impl FakeProvider {
    fn seed(&self, bucket: &str, key: &str, body: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), Bytes::copy_from_slice(body));
    }
}

fn test_etag() -> ETag {
    ETag::new("\"fake\"".to_string()).unwrap()
}

#[async_trait::async_trait]
impl ObjectStoreProvider for FakeProvider {
    async fn list_buckets(&self) -> Result<Vec<Bucket>, CoreError> {
        Ok(vec![Bucket {
            name: BucketName::new("test-bucket".to_string()).unwrap(),
            creation_date: Utc::now(),
        }])
    }

    async fn list_objects(
        &self,
        bucket: &BucketName,
        prefix: Option<&str>,
        _delimiter: &str,
        _max_keys: u32,
        _continuation_token: Option<&ContinuationToken>,
    ) -> Result<ListingPage, CoreError> {
        *self.list_calls.lock().unwrap() += 1;
        let prefix = prefix.unwrap_or("");
        let objects: Vec<Object> = self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((b, k), _)| b == bucket.as_str() && k.starts_with(prefix))
            .map(|((_, k), v)| Object {
                key: ObjectKey::new(k.clone()).unwrap(),
                size: v.len() as u64,
                last_modified: Utc::now(),
                etag: test_etag(),
            })
            .collect();
        ListingPage::new(bucket.clone(), prefix.to_string(), objects, vec![], false, None)
            .map_err(CoreError::from)
    }

    async fn get_object(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        _range: Option<ByteRange>,
    ) -> Result<ObjectStream, CoreError> {
        let bytes = self
            .objects
            .lock()
            .unwrap()
            .get(&(bucket.as_str().to_string(), key.as_str().to_string()))
            .cloned()
            .ok_or_else(|| CoreError::new(ErrorCode::ObjectNotFound, "no such object in fake provider"))?;
        let content_length = bytes.len() as u64;
        let body: BoxStream<'static, Result<Bytes, CoreError>> =
            stream::once(async move { Ok(bytes) }).boxed();
        Ok(ObjectStream {
            body,
            content_length,
            content_type: "application/octet-stream".to_string(),
            etag: test_etag(),
            last_modified: Utc::now(),
        })
    }

    async fn put_object(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        mut body: BoxStream<'static, Result<Bytes, std::io::Error>>,
        _content_length: u64,
        _content_type: &str,
    ) -> Result<PutObjectResult, CoreError> {
        let mut buf: Vec<u8> = Vec::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| CoreError::new(ErrorCode::InternalServerError, e.to_string()))?;
            buf.extend_from_slice(&chunk);
        }
        let size = buf.len() as u64;
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.as_str().to_string(), key.as_str().to_string()), Bytes::from(buf));
        Ok(PutObjectResult { etag: test_etag(), size })
    }

    async fn delete_object(&self, bucket: &BucketName, key: &ObjectKey) -> Result<DeleteObjectResult, CoreError> {
        let removed = self
            .objects
            .lock()
            .unwrap()
            .remove(&(bucket.as_str().to_string(), key.as_str().to_string()))
            .is_some();
        Ok(DeleteObjectResult { deleted: removed })
    }

    async fn delete_batch(
        &self,
        bucket: &BucketName,
        keys: &[ObjectKey],
    ) -> Result<Vec<BatchDeleteOutcome>, CoreError> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let deleted = self
                .objects
                .lock()
                .unwrap()
                .remove(&(bucket.as_str().to_string(), key.as_str().to_string()))
                .is_some();
            out.push(BatchDeleteOutcome { key: key.clone(), deleted, error: None });
        }
        Ok(out)
    }

    async fn search(&self, bucket: &BucketName, query: &str) -> Result<Vec<Object>, CoreError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((b, k), _)| b == bucket.as_str() && k.contains(query))
            .map(|((_, k), v)| Object {
                key: ObjectKey::new(k.clone()).unwrap(),
                size: v.len() as u64,
                last_modified: Utc::now(),
                etag: test_etag(),
            })
            .collect())
    }
}

fn test_app() -> (axum::Router, Arc<FakeProvider>) {
    let provider = Arc::new(FakeProvider::default());
    let provider_dyn: Arc<dyn ObjectStoreProvider> = provider.clone();
    let cache = Arc::new(FolderCache::new(10));
    let transfer = Arc::new(TransferEngine::new(
        provider_dyn.clone(),
        cache.clone(),
        TransferConfig::default(),
    ));
    let state = Arc::new(AppState::new(provider_dyn, cache, transfer));
    let app = r2box_broker::build_router(state, &["http://localhost:5173".to_string()]);
    (app, provider)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_ok_status() {
    let (app, _provider) = test_app();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn list_buckets_returns_envelope_with_count() {
    let (app, _provider) = test_app();
    let request = Request::builder().uri("/buckets").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["data"]["count"], 1);
}

#[tokio::test]
async fn put_then_get_object_round_trips_body() {
    let (app, _provider) = test_app();

    let put_request = Request::builder()
        .method("PUT")
        .uri("/buckets/test-bucket/objects/hello.txt")
        .header("content-length", "5")
        .header("content-type", "text/plain")
        .body(Body::from("hello"))
        .unwrap();
    let put_response = app.clone().oneshot(put_request).await.unwrap();
    assert_eq!(put_response.status(), StatusCode::CREATED);
    let put_json = body_json(put_response).await;
    assert_eq!(put_json["data"]["key"], "hello.txt");
    assert_eq!(put_json["data"]["size"], 5);

    let get_request = Request::builder()
        .uri("/buckets/test-bucket/objects/hello.txt")
        .body(Body::empty())
        .unwrap();
    let get_response = app.oneshot(get_request).await.unwrap();
    assert_eq!(get_response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(get_response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"hello");
}

#[tokio::test]
async fn get_missing_object_returns_not_found_envelope() {
    let (app, _provider) = test_app();
    let request = Request::builder()
        .uri("/buckets/test-bucket/objects/missing.txt")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["status"], "error");
    assert_eq!(json["error"]["code"], "OBJECT_NOT_FOUND");
}

/// A second identical first-page listing must be served from cache
/// rather than hitting the provider again.
#[tokio::test]
async fn repeated_first_page_listing_is_served_from_cache() {
    let (app, provider) = test_app();
    provider.seed("test-bucket", "a.txt", b"one");

    let list = || {
        Request::builder()
            .uri("/buckets/test-bucket/objects?delimiter=%2F")
            .body(Body::empty())
            .unwrap()
    };

    let first = app.clone().oneshot(list()).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let second = app.oneshot(list()).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);

    assert_eq!(*provider.list_calls.lock().unwrap(), 1, "second listing should hit the cache, not the provider");
}

/// A PUT into a bucket invalidates the cached listing for its parent
/// folder, so the next listing reflects the new object.
#[tokio::test]
async fn put_invalidates_cached_parent_listing() {
    let (app, provider) = test_app();
    provider.seed("test-bucket", "existing.txt", b"x");

    let list = || {
        Request::builder()
            .uri("/buckets/test-bucket/objects?delimiter=%2F")
            .body(Body::empty())
            .unwrap()
    };

    let first = app.clone().oneshot(list()).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let put_request = Request::builder()
        .method("PUT")
        .uri("/buckets/test-bucket/objects/new.txt")
        .header("content-length", "3")
        .body(Body::from("new"))
        .unwrap();
    let put_response = app.clone().oneshot(put_request).await.unwrap();
    assert_eq!(put_response.status(), StatusCode::CREATED);

    let second = app.oneshot(list()).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);

    assert_eq!(
        *provider.list_calls.lock().unwrap(),
        2,
        "cache must be invalidated after a mutation so the second listing re-queries the provider"
    );
}

#[tokio::test]
async fn batch_delete_reports_deleted_and_missing_keys() {
    let (app, provider) = test_app();
    provider.seed("test-bucket", "one.txt", b"1");

    let request = Request::builder()
        .method("DELETE")
        .uri("/buckets/test-bucket/batch-delete")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({ "keys": ["one.txt", "missing.txt"] }).to_string(),
        ))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["deleted"], 1);
    assert_eq!(json["data"]["failed"].as_array().unwrap().len(), 1);
    assert_eq!(json["data"]["failed"][0]["key"], "missing.txt");
}

#[tokio::test]
async fn shutdown_flips_cancellation_token() {
    let (app, _provider) = test_app();
    let request = Request::builder().method("POST").uri("/shutdown").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

/// Enqueuing an upload through `/transfers/uploads` against a real
/// temp-file source reaches COMPLETED and is visible from `GET
/// /transfers/{id}` — the HTTP surface over the Transfer Engine that
/// `r2box cp`/`r2box get` poll for progress.
#[tokio::test]
async fn enqueued_upload_completes_and_is_pollable_by_id() {
    let (app, _provider) = test_app();
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("local.txt");
    tokio::fs::write(&src, b"payload").await.unwrap();

    let enqueue = Request::builder()
        .method("POST")
        .uri("/transfers/uploads")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({
                "bucket": "test-bucket",
                "key": "local.txt",
                "localPath": src.to_str().unwrap(),
                "totalSize": 7,
            })
            .to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(enqueue).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    let id = json["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(json["data"]["status"], "QUEUED");

    let mut status = String::new();
    for _ in 0..200 {
        let get = Request::builder().uri(format!("/transfers/{id}")).body(Body::empty()).unwrap();
        let response = app.clone().oneshot(get).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        status = json["data"]["status"].as_str().unwrap().to_string();
        if status == "COMPLETED" || status == "FAILED" {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    assert_eq!(status, "COMPLETED");
}

#[tokio::test]
async fn cancel_of_unknown_task_id_is_accepted_idempotently() {
    let (app, _provider) = test_app();
    let request = Request::builder()
        .method("POST")
        .uri(format!("/transfers/{}/cancel", uuid::Uuid::new_v4()))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn get_unknown_task_returns_not_found_envelope() {
    let (app, _provider) = test_app();
    let request = Request::builder()
        .uri(format!("/transfers/{}", uuid::Uuid::new_v4()))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "OBJECT_NOT_FOUND");
}

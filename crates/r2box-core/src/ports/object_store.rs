//! Object storage provider port (driven/secondary port)
//!
//! This module defines the interface for interacting with the R2-compatible
//! object storage backend. The concrete implementation lives in
//! `r2box-provider` and talks to Cloudflare R2 via `aws-sdk-s3`; this trait
//! lets `r2box-transfer` and `r2box-broker` depend on the contract alone,
//! which also makes both testable against an in-memory double.
//!
//! ## Design Notes
//!
//! - Methods here return `Result<_, CoreError>` rather than
//!   `anyhow::Result`: a `CoreError` is already classified against the
//!   wire error taxonomy by the time it leaves the provider, since it
//!   is stored verbatim in a
//!   `TransferTask::error` and mapped to an HTTP status with no further
//!   reclassification at the broker.
//! - `get_object` returns a streaming body; implementations must not buffer
//!   the full object in memory.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_core::stream::BoxStream;

use crate::domain::errors::CoreError;
use crate::domain::newtypes::{BucketName, ContinuationToken, ETag, ObjectKey};
use crate::domain::object_store::{Bucket, ListingPage};

/// A streamed chunk of object body; `Err` signals an I/O fault mid-stream.
pub type ObjectChunk = Result<Bytes, CoreError>;

/// A byte range requested via the HTTP `Range` header (inclusive bounds).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

/// The body and metadata returned by `get_object`.
pub struct ObjectStream {
    pub body: BoxStream<'static, ObjectChunk>,
    pub content_length: u64,
    pub content_type: String,
    pub etag: ETag,
    pub last_modified: DateTime<Utc>,
}

impl std::fmt::Debug for ObjectStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStream")
            .field("content_length", &self.content_length)
            .field("content_type", &self.content_type)
            .field("etag", &self.etag)
            .field("last_modified", &self.last_modified)
            .finish_non_exhaustive()
    }
}

/// Result of a successful `put_object` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutObjectResult {
    pub etag: ETag,
    pub size: u64,
}

/// Result of a single-key delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteObjectResult {
    pub deleted: bool,
}

/// Per-key outcome of a `delete_batch` call.
#[derive(Debug, Clone)]
pub struct BatchDeleteOutcome {
    pub key: ObjectKey,
    pub deleted: bool,
    pub error: Option<CoreError>,
}

/// Port trait for R2-compatible object storage operations.
///
/// All methods operate against the endpoint derived from the currently
/// loaded `Credentials`; callers are responsible for supplying a client
/// already bound to an account (construction happens in `r2box-provider`).
#[async_trait::async_trait]
pub trait ObjectStoreProvider: Send + Sync {
    /// Lists every bucket visible to the current credentials.
    async fn list_buckets(&self) -> Result<Vec<Bucket>, CoreError>;

    /// Lists objects under `prefix` (bucket root if `None`), honoring
    /// `delimiter` (`"/"` for hierarchical listing, `""` for a flat
    /// recursive listing used by recursive delete) and `max_keys` (capped
    /// at 1000 by the implementation regardless of the requested value).
    async fn list_objects(
        &self,
        bucket: &BucketName,
        prefix: Option<&str>,
        delimiter: &str,
        max_keys: u32,
        continuation_token: Option<&ContinuationToken>,
    ) -> Result<ListingPage, CoreError>;

    /// Streams an object's body, optionally restricted to `range`. Must
    /// never buffer the full object in memory.
    async fn get_object(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        range: Option<ByteRange>,
    ) -> Result<ObjectStream, CoreError>;

    /// Streams `body` into the object at `key`. `content_length` must be
    /// known up front (R2, like S3, requires it for a non-multipart PUT).
    async fn put_object(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        body: BoxStream<'static, Result<Bytes, std::io::Error>>,
        content_length: u64,
        content_type: &str,
    ) -> Result<PutObjectResult, CoreError>;

    async fn delete_object(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
    ) -> Result<DeleteObjectResult, CoreError>;

    /// Deletes up to 1000 keys via the provider's native multi-delete.
    /// Partial failures are reported per key rather than failing the
    /// whole call.
    async fn delete_batch(
        &self,
        bucket: &BucketName,
        keys: &[ObjectKey],
    ) -> Result<Vec<BatchDeleteOutcome>, CoreError>;

    /// Provider-delegated search within a bucket.
    async fn search(
        &self,
        bucket: &BucketName,
        query: &str,
    ) -> Result<Vec<crate::domain::object_store::Object>, CoreError>;
}

//! R2 Provider Client (`r2box-provider::client`)
//!
//! Implements `r2box_core::ports::object_store::ObjectStoreProvider` on top
//! of `aws-sdk-s3`, configured with a static credential provider and a
//! custom endpoint derived from the account id — the same
//! `aws_sdk_s3::Client::from_conf` + `.endpoint_url(...)` shape used
//! throughout the pack's S3-compatible client references, rather than a
//! hand-rolled SigV4 signer.

use std::time::Duration;

use async_trait::async_trait;
use aws_credential_types::Credentials as AwsCredentials;
use aws_sdk_s3::config::{BehaviorVersion, Builder as S3ConfigBuilder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures_core::stream::BoxStream;
use http_body_util::{BodyExt, StreamBody};
use r2box_core::domain::credentials::Credentials as R2Credentials;
use r2box_core::domain::errors::{CoreError, ErrorCode};
use r2box_core::domain::newtypes::{BucketName, ContinuationToken, ETag, ObjectKey};
use r2box_core::domain::object_store::{Bucket, ListingPage, Object};
use r2box_core::ports::object_store::{
    BatchDeleteOutcome, ByteRange, DeleteObjectResult, ObjectChunk, ObjectStoreProvider,
    ObjectStream, PutObjectResult,
};
use tracing::{debug, warn};

use crate::error::classify_sdk_error;

/// Deadline for a single Provider Client request.
pub const DEFAULT_REQUEST_DEADLINE: Duration = Duration::from_secs(30);

/// Deadline for an entire resource operation, e.g. a whole download.
pub const DEFAULT_RESOURCE_DEADLINE: Duration = Duration::from_secs(300);

/// Authenticated R2 client bound to one set of credentials.
///
/// Every call is wrapped in `tokio::time::timeout` using
/// `request_deadline`; the client itself never retries — retry policy is
/// the Transfer Engine's and the Broker's job.
pub struct R2Client {
    client: Client,
    request_deadline: Duration,
}

impl R2Client {
    /// Builds a client bound to the endpoint `https://{account_id}.r2.cloudflarestorage.com`.
    #[must_use]
    pub fn new(credentials: &R2Credentials) -> Self {
        Self::with_deadline(credentials, DEFAULT_REQUEST_DEADLINE)
    }

    #[must_use]
    pub fn with_deadline(credentials: &R2Credentials, request_deadline: Duration) -> Self {
        let aws_creds = AwsCredentials::new(
            credentials.access_key_id(),
            credentials.secret_access_key(),
            None,
            None,
            "r2box",
        );

        let config = S3ConfigBuilder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("auto"))
            .endpoint_url(credentials.endpoint())
            .credentials_provider(aws_creds)
            // R2 buckets don't resolve as DNS-style virtual-hosted subdomains
            // of the account endpoint; path style addressing is required.
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(config),
            request_deadline,
        }
    }

    async fn with_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, CoreError>>,
    ) -> Result<T, CoreError> {
        match tokio::time::timeout(self.request_deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::new(
                ErrorCode::R2Timeout,
                format!(
                    "R2 request exceeded the {}s deadline",
                    self.request_deadline.as_secs()
                ),
            )),
        }
    }
}

#[async_trait]
impl ObjectStoreProvider for R2Client {
    async fn list_buckets(&self) -> Result<Vec<Bucket>, CoreError> {
        self.with_timeout(async {
            let output = self
                .client
                .list_buckets()
                .send()
                .await
                .map_err(classify_sdk_error)?;

            let buckets = output
                .buckets()
                .iter()
                .filter_map(|b| {
                    let name = b.name()?.to_string();
                    let bucket_name = BucketName::new(name).ok()?;
                    let creation_date = b
                        .creation_date()
                        .and_then(|dt| DateTime::from_timestamp(dt.secs(), 0))
                        .unwrap_or_else(Utc::now);
                    Some(Bucket {
                        name: bucket_name,
                        creation_date,
                    })
                })
                .collect();

            Ok(buckets)
        })
        .await
    }

    async fn list_objects(
        &self,
        bucket: &BucketName,
        prefix: Option<&str>,
        delimiter: &str,
        max_keys: u32,
        continuation_token: Option<&ContinuationToken>,
    ) -> Result<ListingPage, CoreError> {
        self.with_timeout(async {
            let capped_max_keys = max_keys.min(1000);

            let mut request = self
                .client
                .list_objects_v2()
                .bucket(bucket.as_str())
                .max_keys(capped_max_keys as i32);

            if !delimiter.is_empty() {
                request = request.delimiter(delimiter);
            }
            if let Some(prefix) = prefix {
                request = request.prefix(prefix);
            }
            if let Some(token) = continuation_token {
                request = request.continuation_token(token.as_str());
            }

            let output = request.send().await.map_err(classify_sdk_error)?;

            let objects = output
                .contents()
                .iter()
                .filter_map(|obj| {
                    let key = ObjectKey::new(obj.key()?.to_string()).ok()?;
                    let etag = ETag::new(obj.e_tag().unwrap_or("\"\"").to_string()).ok()?;
                    let last_modified = obj
                        .last_modified()
                        .and_then(|dt| DateTime::from_timestamp(dt.secs(), 0))
                        .unwrap_or_else(Utc::now);
                    Some(Object {
                        key,
                        size: obj.size().unwrap_or(0).max(0) as u64,
                        last_modified,
                        etag,
                    })
                })
                .collect();

            let common_prefixes = output
                .common_prefixes()
                .iter()
                .filter_map(|p| p.prefix().map(str::to_string))
                .collect();

            let next_token = output
                .next_continuation_token()
                .map(|t| ContinuationToken::new(t.to_string()))
                .transpose()
                .map_err(CoreError::from)?;

            let is_truncated = output.is_truncated().unwrap_or(false) && next_token.is_some();

            ListingPage::new(
                bucket.clone(),
                prefix.unwrap_or_default().to_string(),
                objects,
                common_prefixes,
                is_truncated,
                next_token,
            )
            .map_err(CoreError::from)
        })
        .await
    }

    async fn get_object(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        range: Option<ByteRange>,
    ) -> Result<ObjectStream, CoreError> {
        self.with_timeout(async {
            let mut request = self.client.get_object().bucket(bucket.as_str()).key(key.as_str());

            if let Some(range) = range {
                let header = match range.end {
                    Some(end) => format!("bytes={}-{}", range.start, end),
                    None => format!("bytes={}-", range.start),
                };
                request = request.range(header);
            }

            let output = request.send().await.map_err(classify_sdk_error)?;

            let content_length = output.content_length().unwrap_or(0).max(0) as u64;
            let content_type = output
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let etag = ETag::new(output.e_tag().unwrap_or("\"\"").to_string())
                .unwrap_or_else(|_| ETag::new("\"unknown\"".to_string()).unwrap());
            let last_modified = output
                .last_modified()
                .and_then(|dt| DateTime::from_timestamp(dt.secs(), 0))
                .unwrap_or_else(Utc::now);

            let body: BoxStream<'static, ObjectChunk> = output
                .body
                .map(|chunk| {
                    chunk.map_err(|err| {
                        CoreError::new(
                            ErrorCode::R2ServiceError,
                            format!("error streaming object body: {err}"),
                        )
                    })
                })
                .boxed();

            Ok(ObjectStream {
                body,
                content_length,
                content_type,
                etag,
                last_modified,
            })
        })
        .await
    }

    async fn put_object(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        body: BoxStream<'static, Result<Bytes, std::io::Error>>,
        content_length: u64,
        content_type: &str,
    ) -> Result<PutObjectResult, CoreError> {
        self.with_timeout(async {
            let frame_stream = body.map(|chunk| chunk.map(http_body::Frame::data));
            let sdk_body =
                aws_smithy_types::body::SdkBody::from_body_1_x(StreamBody::new(frame_stream).boxed_unsync());
            let byte_stream = ByteStream::new(sdk_body);

            let output = self
                .client
                .put_object()
                .bucket(bucket.as_str())
                .key(key.as_str())
                .body(byte_stream)
                .content_length(content_length as i64)
                .content_type(content_type)
                .send()
                .await
                .map_err(classify_sdk_error)?;

            let etag = output
                .e_tag()
                .map(|e| ETag::new(e.to_string()))
                .transpose()
                .map_err(CoreError::from)?
                .unwrap_or_else(|| ETag::new("\"unknown\"".to_string()).unwrap());

            Ok(PutObjectResult {
                etag,
                size: content_length,
            })
        })
        .await
    }

    async fn delete_object(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
    ) -> Result<DeleteObjectResult, CoreError> {
        self.with_timeout(async {
            self.client
                .delete_object()
                .bucket(bucket.as_str())
                .key(key.as_str())
                .send()
                .await
                .map_err(classify_sdk_error)?;

            Ok(DeleteObjectResult { deleted: true })
        })
        .await
    }

    async fn delete_batch(
        &self,
        bucket: &BucketName,
        keys: &[ObjectKey],
    ) -> Result<Vec<BatchDeleteOutcome>, CoreError> {
        if keys.len() > 1000 {
            return Err(CoreError::new(
                ErrorCode::ValidationInvalidParam,
                "delete_batch accepts at most 1000 keys per call",
            ));
        }
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        self.with_timeout(async {
            let object_ids: Vec<_> = keys
                .iter()
                .map(|k| {
                    aws_sdk_s3::types::ObjectIdentifier::builder()
                        .key(k.as_str())
                        .build()
                        .expect("key is always set")
                })
                .collect();

            let delete = aws_sdk_s3::types::Delete::builder()
                .set_objects(Some(object_ids))
                .quiet(false)
                .build()
                .map_err(|err| CoreError::internal(err.to_string()))?;

            let output = self
                .client
                .delete_objects()
                .bucket(bucket.as_str())
                .delete(delete)
                .send()
                .await
                .map_err(classify_sdk_error)?;

            let mut outcomes: Vec<BatchDeleteOutcome> = output
                .deleted()
                .iter()
                .filter_map(|d| {
                    let key = ObjectKey::new(d.key()?.to_string()).ok()?;
                    Some(BatchDeleteOutcome {
                        key,
                        deleted: true,
                        error: None,
                    })
                })
                .collect();

            for err in output.errors() {
                let Some(raw_key) = err.key() else { continue };
                let Ok(key) = ObjectKey::new(raw_key.to_string()) else {
                    continue;
                };
                let reason = err
                    .message()
                    .unwrap_or("delete failed")
                    .to_string();
                warn!(key = %raw_key, reason, "batch delete: key failed");
                outcomes.push(BatchDeleteOutcome {
                    key,
                    deleted: false,
                    error: Some(CoreError::new(ErrorCode::R2ServiceError, reason)),
                });
            }

            Ok(outcomes)
        })
        .await
    }

    /// No native R2 search verb: a best-effort, client-side substring scan
    /// over a paginated `list_objects_v2`, documented as such rather than
    /// silently approximated.
    async fn search(&self, bucket: &BucketName, query: &str) -> Result<Vec<Object>, CoreError> {
        let mut matches = Vec::new();
        let mut continuation: Option<ContinuationToken> = None;
        let query_lower = query.to_lowercase();

        loop {
            let page = self
                .list_objects(bucket, None, "", 1000, continuation.as_ref())
                .await?;

            matches.extend(
                page.objects
                    .into_iter()
                    .filter(|obj| obj.key.as_str().to_lowercase().contains(&query_lower)),
            );

            if !page.is_truncated {
                break;
            }
            continuation = page.continuation_token;
        }

        debug!(bucket = %bucket, query, matches = matches.len(), "search completed");
        Ok(matches)
    }
}

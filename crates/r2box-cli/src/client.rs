//! Thin HTTP client over the broker's wire contract. Every subcommand
//! that needs to talk to a running broker — as opposed to the
//! Credential Store or Supervisor directly — goes through here so the
//! envelope-unwrapping and error-formatting logic lives in one place.

use anyhow::{bail, Context, Result};
use r2box_core::domain::envelope::Envelope;
use reqwest::RequestBuilder;
use serde_json::Value;

/// A client bound to one broker instance, identified by the loopback port
/// it was told to listen on.
pub struct BrokerClient {
    http: reqwest::Client,
    base_url: String,
}

impl BrokerClient {
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: format!("http://127.0.0.1:{port}"),
        }
    }

    pub async fn health(&self) -> Result<Value> {
        self.get_json("/health", &[]).await
    }

    pub async fn list_buckets(&self) -> Result<Value> {
        self.get_json("/buckets", &[]).await
    }

    pub async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        delimiter: &str,
        max_keys: u32,
        continuation_token: Option<&str>,
    ) -> Result<Value> {
        let mut query = vec![
            ("delimiter".to_string(), delimiter.to_string()),
            ("maxKeys".to_string(), max_keys.to_string()),
        ];
        if let Some(prefix) = prefix {
            query.push(("prefix".to_string(), prefix.to_string()));
        }
        if let Some(token) = continuation_token {
            query.push(("continuationToken".to_string(), token.to_string()));
        }
        self.get_json(&format!("/buckets/{bucket}/objects"), &query).await
    }

    /// Streams `file`'s contents into a `PUT`, returning the parsed
    /// `{key,etag,size}` response data.
    pub async fn upload(
        &self,
        bucket: &str,
        key: &str,
        file: tokio::fs::File,
        content_length: u64,
        content_type: &str,
    ) -> Result<Value> {
        let url = format!("{}/buckets/{bucket}/objects/{key}", self.base_url);
        let request = self
            .http
            .put(&url)
            .header(reqwest::header::CONTENT_LENGTH, content_length)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(reqwest::Body::from(file));
        self.send_json(request).await
    }

    pub async fn delete_object(&self, bucket: &str, key: &str) -> Result<Value> {
        let url = format!("{}/buckets/{bucket}/objects/{key}", self.base_url);
        self.send_json(self.http.delete(&url)).await
    }

    pub async fn delete_batch(&self, bucket: &str, keys: &[String]) -> Result<Value> {
        let url = format!("{}/buckets/{bucket}/batch-delete", self.base_url);
        let body = serde_json::json!({ "keys": keys });
        self.send_json(self.http.delete(&url).json(&body)).await
    }

    /// Enqueues an upload task on the broker's Transfer Engine and returns
    /// the queued task.
    pub async fn enqueue_upload(
        &self,
        bucket: &str,
        key: &str,
        local_path: &str,
        total_size: u64,
    ) -> Result<Value> {
        let url = format!("{}/transfers/uploads", self.base_url);
        let body = serde_json::json!({
            "bucket": bucket,
            "key": key,
            "localPath": local_path,
            "totalSize": total_size,
        });
        self.send_json(self.http.post(&url).json(&body)).await
    }

    pub async fn enqueue_download(
        &self,
        bucket: &str,
        key: &str,
        local_path: &str,
    ) -> Result<Value> {
        let url = format!("{}/transfers/downloads", self.base_url);
        let body = serde_json::json!({
            "bucket": bucket,
            "key": key,
            "localPath": local_path,
        });
        self.send_json(self.http.post(&url).json(&body)).await
    }

    pub async fn enqueue_delete(&self, bucket: &str, prefix: &str) -> Result<Value> {
        let url = format!("{}/transfers/deletes", self.base_url);
        let body = serde_json::json!({ "bucket": bucket, "prefix": prefix });
        self.send_json(self.http.post(&url).json(&body)).await
    }

    pub async fn get_transfer_task(&self, id: &str) -> Result<Value> {
        self.get_json(&format!("/transfers/{id}"), &[]).await
    }

    pub async fn cancel_transfer_task(&self, id: &str) -> Result<Value> {
        let url = format!("{}/transfers/{id}/cancel", self.base_url);
        self.send_json(self.http.post(&url)).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        let url = format!("{}/shutdown", self.base_url);
        self.http.post(&url).send().await.context("POST /shutdown failed")?;
        Ok(())
    }

    async fn get_json(&self, path: &str, query: &[(String, String)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        self.send_json(self.http.get(&url).query(query)).await
    }

    async fn send_json(&self, request: RequestBuilder) -> Result<Value> {
        let response = request.send().await.context("request to broker failed")?;
        if !response.status().is_success() {
            return Err(self.error_from_envelope(response).await);
        }

        let envelope: Envelope<Value> = response
            .json()
            .await
            .context("failed to parse broker response envelope")?;
        match envelope {
            Envelope::Ok { data, .. } => Ok(data),
            Envelope::Error { error, meta } => {
                bail!("broker error {}: {} [request {}]", error.code, error.message, meta.request_id)
            }
        }
    }

    async fn error_from_envelope(&self, response: reqwest::Response) -> anyhow::Error {
        let status = response.status();
        match response.json::<Envelope<Value>>().await {
            Ok(Envelope::Error { error, meta }) => {
                anyhow::anyhow!("broker error {}: {} [request {}]", error.code, error.message, meta.request_id)
            }
            Ok(Envelope::Ok { .. }) | Err(_) => anyhow::anyhow!("broker returned HTTP {status}"),
        }
    }
}

//! Transfer Engine routes. Not part of spec.md's literal §6 route table,
//! but required by the same section's note that a single-process broker
//! may host the Transfer Engine directly and "expose their state through
//! a separate status channel" — this is that channel, made reachable over
//! the same loopback contract every other route uses. A caller POSTs an
//! upload/download/delete to get back a queued task, then polls or lists
//! `GET /transfers` for progress the way `r2box cp`/`r2box get`/`r2box
//! rmdir` do.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::{Extension, Json};
use r2box_core::domain::errors::{CoreError, ErrorCode};
use r2box_core::domain::newtypes::{BucketName, RequestId, TaskId};
use r2box_core::domain::transfer::TransferTask;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{respond_ok, ApiError};
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct TaskBody {
    id: String,
    #[serde(rename = "type")]
    task_type: String,
    bucket: String,
    target: String,
    #[serde(rename = "localPath")]
    local_path: Option<String>,
    status: String,
    total: u64,
    transferred: u64,
    progress: f64,
    speed: f64,
    attempts: u32,
    error: Option<String>,
    #[serde(rename = "createdAt")]
    created_at: String,
}

impl From<&TransferTask> for TaskBody {
    fn from(task: &TransferTask) -> Self {
        use r2box_core::domain::transfer::TaskTarget;
        let target = match task.target() {
            TaskTarget::Key(k) => k.clone(),
            TaskTarget::Prefix(p) => p.clone(),
        };
        let progress = task.progress();
        Self {
            id: task.id().to_string(),
            task_type: task.task_type().to_string(),
            bucket: task.bucket().as_str().to_string(),
            target,
            local_path: task.local_path().map(str::to_string),
            status: task.status().name().to_string(),
            total: task.total(),
            transferred: progress.transferred,
            progress: progress.progress,
            speed: progress.speed,
            attempts: task.attempts(),
            error: task.error().map(str::to_string),
            created_at: task.created_at().to_rfc3339(),
        }
    }
}

fn parse_task_id(raw: &str, request_id: RequestId) -> Result<TaskId, ApiError> {
    raw.parse::<TaskId>().map_err(|e| {
        ApiError::new(
            CoreError::new(ErrorCode::ValidationInvalidParam, format!("invalid task id: {e}")),
            request_id,
        )
    })
}

fn parse_bucket(raw: String, request_id: RequestId) -> Result<BucketName, ApiError> {
    BucketName::new(raw).map_err(|e| ApiError::new(e.into(), request_id))
}

#[derive(Debug, Deserialize)]
pub struct EnqueueUploadRequest {
    pub bucket: String,
    pub key: String,
    #[serde(rename = "localPath")]
    pub local_path: String,
    #[serde(rename = "totalSize")]
    pub total_size: u64,
}

pub async fn enqueue_upload(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(body): Json<EnqueueUploadRequest>,
) -> Result<Response, ApiError> {
    let bucket = parse_bucket(body.bucket, request_id)?;
    let task = state.transfer.enqueue_upload(bucket, body.key, body.local_path, body.total_size);
    Ok(respond_ok(StatusCode::CREATED, request_id, json!(TaskBody::from(&task))))
}

#[derive(Debug, Deserialize)]
pub struct EnqueueDownloadRequest {
    pub bucket: String,
    pub key: String,
    #[serde(rename = "localPath")]
    pub local_path: String,
    #[serde(default, rename = "totalSize")]
    pub total_size: u64,
}

pub async fn enqueue_download(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(body): Json<EnqueueDownloadRequest>,
) -> Result<Response, ApiError> {
    let bucket = parse_bucket(body.bucket, request_id)?;
    let task = state.transfer.enqueue_download(bucket, body.key, body.local_path, body.total_size);
    Ok(respond_ok(StatusCode::CREATED, request_id, json!(TaskBody::from(&task))))
}

#[derive(Debug, Deserialize)]
pub struct EnqueueDeleteRequest {
    pub bucket: String,
    pub prefix: String,
    #[serde(default, rename = "totalCount")]
    pub total_count: u64,
}

pub async fn enqueue_delete(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(body): Json<EnqueueDeleteRequest>,
) -> Result<Response, ApiError> {
    let bucket = parse_bucket(body.bucket, request_id)?;
    let task = state.transfer.enqueue_delete(bucket, body.prefix, body.total_count);
    Ok(respond_ok(StatusCode::CREATED, request_id, json!(TaskBody::from(&task))))
}

pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
) -> Result<Response, ApiError> {
    let tasks: Vec<TaskBody> = state.transfer.list_tasks().iter().map(TaskBody::from).collect();
    Ok(respond_ok(StatusCode::OK, request_id, json!({ "tasks": tasks, "count": tasks.len() })))
}

pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Extension(request_id): Extension<RequestId>,
) -> Result<Response, ApiError> {
    let task_id = parse_task_id(&id, request_id)?;
    let task = state.transfer.get_task(&task_id).ok_or_else(|| {
        ApiError::new(CoreError::new(ErrorCode::ObjectNotFound, "no such transfer task"), request_id)
    })?;
    Ok(respond_ok(StatusCode::OK, request_id, json!(TaskBody::from(&task))))
}

pub async fn cancel_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Extension(request_id): Extension<RequestId>,
) -> Result<Response, ApiError> {
    let task_id = parse_task_id(&id, request_id)?;
    state.transfer.cancel(&task_id);
    Ok(respond_ok(StatusCode::ACCEPTED, request_id, json!({ "id": task_id.to_string() })))
}

pub async fn pause_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Extension(request_id): Extension<RequestId>,
) -> Result<Response, ApiError> {
    let task_id = parse_task_id(&id, request_id)?;
    state.transfer.pause(&task_id).map_err(|e| ApiError::new(e, request_id))?;
    Ok(respond_ok(StatusCode::ACCEPTED, request_id, json!({ "id": task_id.to_string() })))
}

pub async fn resume_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Extension(request_id): Extension<RequestId>,
) -> Result<Response, ApiError> {
    let task_id = parse_task_id(&id, request_id)?;
    state.transfer.resume(&task_id).map_err(|e| ApiError::new(e, request_id))?;
    let task = state.transfer.get_task(&task_id).ok_or_else(|| {
        ApiError::new(CoreError::new(ErrorCode::ObjectNotFound, "no such transfer task"), request_id)
    })?;
    Ok(respond_ok(StatusCode::OK, request_id, json!(TaskBody::from(&task))))
}

pub async fn retry_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Extension(request_id): Extension<RequestId>,
) -> Result<Response, ApiError> {
    let task_id = parse_task_id(&id, request_id)?;
    let task = state.transfer.retry(&task_id).map_err(|e| ApiError::new(e, request_id))?;
    Ok(respond_ok(StatusCode::CREATED, request_id, json!(TaskBody::from(&task))))
}

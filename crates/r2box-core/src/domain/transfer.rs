//! Transfer Task domain entity
//!
//! Represents a single upload, download, or recursive delete tracked by the
//! Transfer Engine.
//!
//! ## State Machine
//!
//! ```text
//! QUEUED ──admit──▶ RUNNING ──finish──▶ COMPLETED
//!    │                 │
//!    │                 ├─user──▶ PAUSED ──resume──▶ QUEUED
//!    │                 ├─user──▶ CANCELLED (terminal)
//!    │                 └─error──▶ FAILED   (terminal)
//! ```
//!
//! COMPLETED, CANCELLED and FAILED are terminal. PAUSED cannot transition
//! directly back to RUNNING — it must re-enter the queue first. A retry
//! never resurrects a FAILED task in place; it seeds a fresh task id
//! (`TransferTask::retry_from`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::{CoreError, DomainError};
use super::newtypes::{BucketName, TaskId};

/// The kind of bulk operation a task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    Upload,
    Download,
    Delete,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upload => write!(f, "UPLOAD"),
            Self::Download => write!(f, "DOWNLOAD"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// Where a task currently sits in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Queued,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Either a single object key (upload/download) or a prefix (recursive
/// delete) a task operates on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskTarget {
    Key(String),
    Prefix(String),
}

/// Progress sample for a RUNNING task, published at most once per ~200ms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub task_id: Option<TaskId>,
    pub transferred: u64,
    pub total: u64,
    /// Bytes or items per second, EWMA over the last few samples.
    pub speed: f64,
    pub progress: f64,
}

impl ProgressEvent {
    /// `progress` is derived from `status`, not just the transferred/total
    /// ratio: it reaches `1.0` only when `status` is COMPLETED, and is
    /// otherwise capped below `1.0` even if `transferred == total` (a
    /// download that has streamed every byte but not yet been renamed
    /// into place, for instance, is still RUNNING).
    #[must_use]
    pub fn new(transferred: u64, total: u64, speed: f64, status: TaskStatus) -> Self {
        let progress = if status == TaskStatus::Completed {
            1.0
        } else if total == 0 {
            0.0
        } else {
            (transferred as f64 / total as f64).clamp(0.0, 1.0).min(0.999)
        };
        Self {
            task_id: None,
            transferred,
            total,
            speed,
            progress,
        }
    }

    /// The same computation as [`ProgressEvent::new`], stamped with the
    /// task it describes — the shape published on the Transfer Engine's
    /// broadcast channel.
    #[must_use]
    pub fn for_task(task_id: TaskId, transferred: u64, total: u64, speed: f64, status: TaskStatus) -> Self {
        Self {
            task_id: Some(task_id),
            ..Self::new(transferred, total, speed, status)
        }
    }
}

/// A single upload, download, or recursive-delete job tracked end to end
/// by the Transfer Engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferTask {
    id: TaskId,
    task_type: TaskType,
    bucket: BucketName,
    target: TaskTarget,
    local_path: Option<String>,
    /// Total bytes (upload/download) or total item count (delete).
    total: u64,
    /// Bytes written/read (upload/download) or items deleted (delete).
    transferred: u64,
    speed: f64,
    status: TaskStatus,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    error: Option<String>,
    attempts: u32,
}

impl TransferTask {
    #[must_use]
    pub fn new_upload(bucket: BucketName, key: String, local_path: String, total_size: u64) -> Self {
        Self::new(TaskType::Upload, bucket, TaskTarget::Key(key), Some(local_path), total_size)
    }

    #[must_use]
    pub fn new_download(bucket: BucketName, key: String, local_path: String, total_size: u64) -> Self {
        Self::new(TaskType::Download, bucket, TaskTarget::Key(key), Some(local_path), total_size)
    }

    #[must_use]
    pub fn new_delete(bucket: BucketName, prefix: String, total_count: u64) -> Self {
        Self::new(TaskType::Delete, bucket, TaskTarget::Prefix(prefix), None, total_count)
    }

    fn new(
        task_type: TaskType,
        bucket: BucketName,
        target: TaskTarget,
        local_path: Option<String>,
        total: u64,
    ) -> Self {
        Self {
            id: TaskId::new(),
            task_type,
            bucket,
            target,
            local_path,
            total,
            transferred: 0,
            speed: 0.0,
            status: TaskStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            attempts: 0,
        }
    }

    /// Seeds a fresh task (new id, attempts+1) from a FAILED task, per the
    /// invariant that a cancelled or failed task is never re-run in place.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidState` if `self` is not FAILED.
    pub fn retry_from(&self) -> Result<Self, DomainError> {
        if self.status != TaskStatus::Failed {
            return Err(DomainError::InvalidState {
                from: self.status.name().to_string(),
                to: "QUEUED (retry)".to_string(),
            });
        }
        let mut task = Self::new(
            self.task_type,
            self.bucket.clone(),
            self.target.clone(),
            self.local_path.clone(),
            self.total,
        );
        task.attempts = self.attempts + 1;
        Ok(task)
    }

    #[must_use]
    pub fn id(&self) -> &TaskId {
        &self.id
    }

    #[must_use]
    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    #[must_use]
    pub fn bucket(&self) -> &BucketName {
        &self.bucket
    }

    #[must_use]
    pub fn target(&self) -> &TaskTarget {
        &self.target
    }

    /// The local filesystem path for an upload source or download
    /// destination; `None` for a DELETE task.
    #[must_use]
    pub fn local_path(&self) -> Option<&str> {
        self.local_path.as_deref()
    }

    /// Total bytes (upload/download) or total item count (delete).
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn status(&self) -> TaskStatus {
        self.status
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[must_use]
    pub fn progress(&self) -> ProgressEvent {
        ProgressEvent::new(self.transferred, self.total, self.speed, self.status)
    }

    /// Valid transitions: QUEUED→RUNNING; RUNNING→COMPLETED, PAUSED,
    /// CANCELLED, FAILED; PAUSED→QUEUED (re-admit only). Terminal states
    /// accept no further transitions.
    #[must_use]
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        matches!(
            (self.status, target),
            (TaskStatus::Queued, TaskStatus::Running)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Paused)
                | (TaskStatus::Running, TaskStatus::Cancelled)
                | (TaskStatus::Running, TaskStatus::Failed)
                | (TaskStatus::Queued, TaskStatus::Cancelled)
                | (TaskStatus::Paused, TaskStatus::Queued)
        )
    }

    /// # Errors
    /// Returns `DomainError::InvalidState` if the transition is not allowed.
    pub fn transition_to(&mut self, target: TaskStatus) -> Result<(), DomainError> {
        if !self.can_transition_to(target) {
            return Err(DomainError::InvalidState {
                from: self.status.name().to_string(),
                to: target.name().to_string(),
            });
        }

        match target {
            TaskStatus::Running if self.started_at.is_none() => {
                self.started_at = Some(Utc::now());
            }
            TaskStatus::Completed | TaskStatus::Cancelled => {
                self.completed_at = Some(Utc::now());
            }
            _ => {}
        }

        self.status = target;
        Ok(())
    }

    /// Records a fatal error and transitions to FAILED.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidState` if the task is already terminal.
    pub fn fail(&mut self, err: &CoreError) -> Result<(), DomainError> {
        self.transition_to(TaskStatus::Failed)?;
        self.error = Some(err.to_string());
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Updates `transferred`/`speed`, enforcing the monotonically
    /// non-decreasing invariant on `transferred`.
    pub fn record_progress(&mut self, transferred: u64, speed: f64) {
        self.transferred = self.transferred.max(transferred);
        self.speed = speed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket() -> BucketName {
        BucketName::new("my-bucket".to_string()).unwrap()
    }

    fn upload_task() -> TransferTask {
        TransferTask::new_upload(bucket(), "a.txt".to_string(), "/tmp/a.txt".to_string(), 1000)
    }

    #[test]
    fn new_task_starts_queued() {
        let task = upload_task();
        assert_eq!(task.status(), TaskStatus::Queued);
        assert_eq!(task.attempts(), 0);
    }

    #[test]
    fn queued_can_only_go_to_running_or_cancelled() {
        let task = upload_task();
        assert!(task.can_transition_to(TaskStatus::Running));
        assert!(task.can_transition_to(TaskStatus::Cancelled));
        assert!(!task.can_transition_to(TaskStatus::Completed));
        assert!(!task.can_transition_to(TaskStatus::Paused));
    }

    #[test]
    fn paused_cannot_go_directly_to_running() {
        let mut task = upload_task();
        task.transition_to(TaskStatus::Running).unwrap();
        task.transition_to(TaskStatus::Paused).unwrap();
        assert!(!task.can_transition_to(TaskStatus::Running));
        assert!(task.can_transition_to(TaskStatus::Queued));
    }

    #[test]
    fn terminal_states_reject_all_transitions() {
        let mut task = upload_task();
        task.transition_to(TaskStatus::Running).unwrap();
        task.transition_to(TaskStatus::Completed).unwrap();
        assert!(!task.can_transition_to(TaskStatus::Running));
        assert!(task.transition_to(TaskStatus::Failed).is_err());
    }

    #[test]
    fn fail_records_error_message() {
        let mut task = upload_task();
        task.transition_to(TaskStatus::Running).unwrap();
        let err = CoreError::internal("boom");
        task.fail(&err).unwrap();
        assert_eq!(task.status(), TaskStatus::Failed);
        assert!(task.error().unwrap().contains("boom"));
    }

    #[test]
    fn retry_from_failed_creates_fresh_id_and_increments_attempts() {
        let mut task = upload_task();
        task.transition_to(TaskStatus::Running).unwrap();
        task.fail(&CoreError::internal("boom")).unwrap();

        let retried = task.retry_from().unwrap();
        assert_ne!(retried.id(), task.id());
        assert_eq!(retried.attempts(), 1);
        assert_eq!(retried.status(), TaskStatus::Queued);
    }

    #[test]
    fn retry_from_non_failed_task_is_rejected() {
        let task = upload_task();
        assert!(task.retry_from().is_err());
    }

    #[test]
    fn progress_is_clamped_and_monotonic() {
        let mut task = upload_task();
        task.record_progress(300, 1024.0);
        assert!((task.progress().progress - 0.3).abs() < 1e-9);
        task.record_progress(100, 512.0);
        assert_eq!(task.progress().transferred, 300);
    }

    #[test]
    fn progress_never_reports_one_before_completed() {
        let mut task = upload_task();
        task.transition_to(TaskStatus::Running).unwrap();
        task.record_progress(1000, 0.0);
        assert_eq!(task.progress().transferred, task.total());
        assert!(task.progress().progress < 1.0, "RUNNING task must never report progress == 1.0");

        task.transition_to(TaskStatus::Completed).unwrap();
        assert_eq!(task.progress().progress, 1.0);
    }
}

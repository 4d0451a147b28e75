//! Transfer Engine: a bounded concurrent queue for upload, download, and
//! recursive-delete tasks with progress, pause/resume, cancel, and retry.

mod delete;
mod download;
mod upload;

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use r2box_cache::FolderCache;
use r2box_core::config::TransferConfig;
use r2box_core::domain::errors::{CoreError, ErrorCode};
use r2box_core::domain::newtypes::{BucketName, TaskId};
use r2box_core::domain::transfer::{TaskStatus, TaskType, TransferTask};
use r2box_core::ports::object_store::ObjectStoreProvider;
use tokio::sync::{broadcast, Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How often a running task is allowed to publish a progress sample.
pub const PROGRESS_THROTTLE: std::time::Duration = std::time::Duration::from_millis(200);

/// Per-task bookkeeping the engine keeps alongside the domain entity:
/// its cancellation handle and the last time a progress event was sent.
struct TaskHandle {
    cancel: CancellationToken,
    last_progress_emit: std::time::Instant,
}

/// The Transfer Engine: owns the task table, the admission semaphores,
/// and the progress broadcast channel. Cheap to clone (an `Arc` wrapper
/// is expected at the call site, mirroring how the Broker shares its
/// other long-lived handles via `AppState`).
pub struct TransferEngine {
    provider: Arc<dyn ObjectStoreProvider>,
    cache: Arc<FolderCache>,
    tasks: DashMap<TaskId, TransferTask>,
    handles: DashMap<TaskId, TaskHandle>,
    upload_semaphore: Arc<Semaphore>,
    download_semaphore: Arc<Semaphore>,
    delete_semaphores: DashMap<BucketName, Arc<Semaphore>>,
    progress_tx: broadcast::Sender<r2box_core::domain::transfer::ProgressEvent>,
    completed_order: Mutex<VecDeque<TaskId>>,
    failed_order: Mutex<VecDeque<TaskId>>,
    config: TransferConfig,
}

impl TransferEngine {
    #[must_use]
    pub fn new(
        provider: Arc<dyn ObjectStoreProvider>,
        cache: Arc<FolderCache>,
        config: TransferConfig,
    ) -> Self {
        let (progress_tx, _) = broadcast::channel(256);
        Self {
            provider,
            cache,
            tasks: DashMap::new(),
            handles: DashMap::new(),
            upload_semaphore: Arc::new(Semaphore::new(config.max_concurrent_uploads)),
            download_semaphore: Arc::new(Semaphore::new(config.max_concurrent_downloads)),
            delete_semaphores: DashMap::new(),
            progress_tx,
            completed_order: Mutex::new(VecDeque::new()),
            failed_order: Mutex::new(VecDeque::new()),
            config,
        }
    }

    /// Subscribes to the engine's progress broadcast channel.
    #[must_use]
    pub fn subscribe_progress(
        &self,
    ) -> broadcast::Receiver<r2box_core::domain::transfer::ProgressEvent> {
        self.progress_tx.subscribe()
    }

    #[must_use]
    pub fn get_task(&self, id: &TaskId) -> Option<TransferTask> {
        self.tasks.get(id).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn list_tasks(&self) -> Vec<TransferTask> {
        self.tasks.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Enqueues an upload and spawns its worker. Returns the queued task
    /// immediately; the caller observes progress via
    /// [`TransferEngine::subscribe_progress`] or repeated `get_task` polls.
    pub fn enqueue_upload(
        self: &Arc<Self>,
        bucket: BucketName,
        key: String,
        local_path: String,
        total_size: u64,
    ) -> TransferTask {
        let task = TransferTask::new_upload(bucket, key, local_path, total_size);
        self.admit(task)
    }

    pub fn enqueue_download(
        self: &Arc<Self>,
        bucket: BucketName,
        key: String,
        local_path: String,
        total_size: u64,
    ) -> TransferTask {
        let task = TransferTask::new_download(bucket, key, local_path, total_size);
        self.admit(task)
    }

    pub fn enqueue_delete(
        self: &Arc<Self>,
        bucket: BucketName,
        prefix: String,
        total_count: u64,
    ) -> TransferTask {
        let task = TransferTask::new_delete(bucket, prefix, total_count);
        self.admit(task)
    }

    fn admit(self: &Arc<Self>, task: TransferTask) -> TransferTask {
        let id = *task.id();
        let task_type = task.task_type();
        let cancel = CancellationToken::new();
        self.handles.insert(
            id,
            TaskHandle {
                cancel: cancel.clone(),
                last_progress_emit: std::time::Instant::now() - PROGRESS_THROTTLE,
            },
        );
        self.tasks.insert(id, task.clone());

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.run(id, task_type, cancel).await;
        });

        task
    }

    /// Requests cancellation of a task. Idempotent; cancelling an already
    /// terminal task is a no-op.
    pub fn cancel(&self, id: &TaskId) {
        if let Some(handle) = self.handles.get(id) {
            handle.cancel.cancel();
        }
    }

    /// Pauses a RUNNING task by cancelling its worker and transitioning it
    /// to PAUSED; the worker observes the cancellation at its next
    /// checkpoint and exits without marking the task FAILED.
    pub fn pause(&self, id: &TaskId) -> Result<(), CoreError> {
        let mut entry = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| CoreError::new(ErrorCode::ObjectNotFound, "no such transfer task"))?;
        entry
            .transition_to(TaskStatus::Paused)
            .map_err(CoreError::from)?;
        drop(entry);
        if let Some(handle) = self.handles.get(id) {
            handle.cancel.cancel();
        }
        Ok(())
    }

    /// Re-admits a PAUSED task: moves it back to QUEUED and spawns a fresh
    /// worker with a fresh cancellation token.
    pub fn resume(self: &Arc<Self>, id: &TaskId) -> Result<(), CoreError> {
        let (task_type, task) = {
            let mut entry = self
                .tasks
                .get_mut(id)
                .ok_or_else(|| CoreError::new(ErrorCode::ObjectNotFound, "no such transfer task"))?;
            entry
                .transition_to(TaskStatus::Queued)
                .map_err(CoreError::from)?;
            (entry.task_type(), entry.clone())
        };

        let cancel = CancellationToken::new();
        self.handles.insert(
            *task.id(),
            TaskHandle {
                cancel: cancel.clone(),
                last_progress_emit: std::time::Instant::now() - PROGRESS_THROTTLE,
            },
        );

        let engine = Arc::clone(self);
        let id = *id;
        tokio::spawn(async move {
            engine.run(id, task_type, cancel).await;
        });
        Ok(())
    }

    /// Creates and admits a fresh task from a FAILED one, per the
    /// never-resurrect-in-place invariant.
    pub fn retry(self: &Arc<Self>, id: &TaskId) -> Result<TransferTask, CoreError> {
        let failed = self
            .tasks
            .get(id)
            .ok_or_else(|| CoreError::new(ErrorCode::ObjectNotFound, "no such transfer task"))?
            .clone();
        let retried = failed.retry_from().map_err(CoreError::from)?;
        Ok(self.admit(retried))
    }

    fn delete_semaphore_for(&self, bucket: &BucketName) -> Arc<Semaphore> {
        self.delete_semaphores
            .entry(bucket.clone())
            .or_insert_with(|| {
                Arc::new(Semaphore::new(self.config.max_concurrent_deletes_per_bucket))
            })
            .clone()
    }

    /// Publishes a progress sample if at least [`PROGRESS_THROTTLE`] has
    /// elapsed since the last one for this task, and records it on the
    /// task (monotonic `transferred`, per the domain invariant).
    fn report_progress(&self, id: TaskId, transferred: u64, total: u64, speed: f64) {
        let status = {
            let Some(mut task) = self.tasks.get_mut(&id) else {
                return;
            };
            task.record_progress(transferred, speed);
            task.status()
        };

        let Some(mut handle) = self.handles.get_mut(&id) else {
            return;
        };
        if handle.last_progress_emit.elapsed() < PROGRESS_THROTTLE {
            return;
        }
        handle.last_progress_emit = std::time::Instant::now();
        drop(handle);

        let event =
            r2box_core::domain::transfer::ProgressEvent::for_task(id, transferred, total, speed, status);
        // No active subscribers is a normal, expected condition.
        let _ = self.progress_tx.send(event);
    }

    fn admit_running(&self, id: &TaskId) -> Result<(), CoreError> {
        self.tasks
            .get_mut(id)
            .ok_or_else(|| CoreError::new(ErrorCode::ObjectNotFound, "no such transfer task"))?
            .transition_to(TaskStatus::Running)
            .map_err(CoreError::from)
    }

    fn finish_ok(&self, id: &TaskId) {
        if let Some(mut task) = self.tasks.get_mut(id) {
            let _ = task.transition_to(TaskStatus::Completed);
        }
        self.retain_terminal(id, true);
    }

    fn finish_cancelled(&self, id: &TaskId) {
        if let Some(mut task) = self.tasks.get_mut(id) {
            let _ = task.transition_to(TaskStatus::Cancelled);
        }
    }

    fn finish_paused(&self, _id: &TaskId) {
        // Status was already set to PAUSED by `pause()`; nothing further
        // to record here, the worker simply stops.
    }

    fn finish_err(&self, id: &TaskId, err: &CoreError) {
        if let Some(mut task) = self.tasks.get_mut(id) {
            let _ = task.fail(err);
        }
        warn!(task_id = %id, error = %err, "transfer task failed");
        self.retain_terminal(id, false);
    }

    /// Applies the FIFO retention policy for terminal tasks: the task
    /// table keeps at most `retain_completed`/`retain_failed` entries per
    /// terminal bucket, evicting the oldest once the bound is exceeded.
    fn retain_terminal(&self, id: &TaskId, completed: bool) {
        let id = *id;
        let tasks = &self.tasks;
        let (order, limit) = if completed {
            (&self.completed_order, self.config.retain_completed)
        } else {
            (&self.failed_order, self.config.retain_failed)
        };

        // `retain_terminal` runs from within a spawned task's synchronous
        // tail; a `try_lock` is sufficient since contention here is rare
        // (one writer at a time per terminal bucket in practice) and a
        // missed eviction self-heals on the next terminal task.
        if let Ok(mut order) = order.try_lock() {
            order.push_back(id);
            while order.len() > limit.max(1) {
                if let Some(evicted) = order.pop_front() {
                    tasks.remove(&evicted);
                    self.handles.remove(&evicted);
                }
            }
        }
    }

    async fn run(self: Arc<Self>, id: TaskId, task_type: TaskType, cancel: CancellationToken) {
        // The admission slot must be held *before* the task leaves QUEUED,
        // so the RUNNING set never grows past the queue's own concurrency
        // limit while tasks are still waiting for a permit.
        let task = match self.get_task(&id) {
            Some(t) => t,
            None => return,
        };

        let (_permit, _owned_permit) = match task_type {
            TaskType::Upload => match self.upload_semaphore.acquire().await {
                Ok(permit) => (Some(permit), None),
                Err(_) => return,
            },
            TaskType::Download => match self.download_semaphore.acquire().await {
                Ok(permit) => (Some(permit), None),
                Err(_) => return,
            },
            TaskType::Delete => {
                let semaphore = self.delete_semaphore_for(task.bucket());
                match semaphore.acquire_owned().await {
                    Ok(permit) => (None, Some(permit)),
                    Err(_) => return,
                }
            }
        };

        if let Err(err) = self.admit_running(&id) {
            warn!(task_id = %id, error = %err, "could not admit task to RUNNING");
            return;
        }
        info!(task_id = %id, task_type = %task_type, "transfer task started");

        let result = match task_type {
            TaskType::Upload => upload::run(&self, &task, &cancel).await,
            TaskType::Download => download::run(&self, &task, &cancel).await,
            TaskType::Delete => delete::run(&self, &task, &cancel).await,
        };

        match result {
            TaskOutcome::Completed => self.finish_ok(&id),
            TaskOutcome::Cancelled => self.finish_cancelled(&id),
            TaskOutcome::Paused => self.finish_paused(&id),
            TaskOutcome::Failed(err) => self.finish_err(&id, &err),
        }
    }
}

/// How a worker's run loop ended. `Paused` is distinguished from
/// `Cancelled` purely for logging clarity — both are driven by the same
/// `CancellationToken`, since `pause()` cancels the worker and relies on
/// having already flipped the task to PAUSED before doing so.
pub(crate) enum TaskOutcome {
    Completed,
    Cancelled,
    Paused,
    Failed(CoreError),
}

impl TransferEngine {
    /// Re-reads the task table to check whether `id` is currently PAUSED —
    /// used by workers to tell a user-requested pause apart from a plain
    /// cancel after observing the shared `CancellationToken` fire, since
    /// both are signaled the same way.
    pub(crate) fn is_task_paused(&self, id: &TaskId) -> bool {
        self.tasks
            .get(id)
            .map(|t| t.status() == TaskStatus::Paused)
            .unwrap_or(false)
    }
}

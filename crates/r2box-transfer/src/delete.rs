//! Recursive delete worker: pages through `listObjects` under a prefix and
//! deletes each page in one `deleteBatch` call, invalidating the Folder
//! Cache subtree once the pass completes.

use std::sync::Arc;

use r2box_core::domain::errors::{CoreError, ErrorCode};
use r2box_core::domain::newtypes::{ContinuationToken, ObjectKey};
use r2box_core::domain::transfer::{TaskTarget, TransferTask};
use tokio_util::sync::CancellationToken;

use crate::{TaskOutcome, TransferEngine};

/// Keys requested per `listObjects` page and per `deleteBatch` call;
/// matches the provider's own 1000-key ceiling so every page maps to
/// exactly one delete call.
const DELETE_PAGE_SIZE: u32 = 1000;

pub(crate) async fn run(
    engine: &Arc<TransferEngine>,
    task: &TransferTask,
    cancel: &CancellationToken,
) -> TaskOutcome {
    let id = *task.id();
    let bucket = task.bucket().clone();
    let prefix = match task.target() {
        TaskTarget::Prefix(p) => p.clone(),
        TaskTarget::Key(_) => {
            return TaskOutcome::Failed(CoreError::internal("delete task target must be a prefix"))
        }
    };
    let total = task.total();

    let mut deleted: u64 = 0;
    let mut continuation: Option<ContinuationToken> = None;
    let mut any_failure = false;

    loop {
        if cancel.is_cancelled() {
            return if engine.is_task_paused(&id) {
                TaskOutcome::Paused
            } else {
                TaskOutcome::Cancelled
            };
        }

        let page = match engine
            .provider
            .list_objects(&bucket, Some(&prefix), "", DELETE_PAGE_SIZE, continuation.as_ref())
            .await
        {
            Ok(p) => p,
            Err(err) => return TaskOutcome::Failed(err),
        };

        let keys: Vec<ObjectKey> = page.objects.into_iter().map(|o| o.key).collect();
        if !keys.is_empty() {
            match engine.provider.delete_batch(&bucket, &keys).await {
                Ok(outcomes) => {
                    for outcome in &outcomes {
                        if outcome.deleted {
                            deleted += 1;
                        } else {
                            any_failure = true;
                        }
                    }
                    engine.report_progress(id, deleted, total.max(deleted), 0.0);
                }
                Err(err) => return TaskOutcome::Failed(err),
            }
        }

        if !page.is_truncated {
            break;
        }
        continuation = page.continuation_token;
    }

    engine.cache.invalidate_prefix(&bucket, &prefix).await;

    if any_failure {
        TaskOutcome::Failed(CoreError::new(
            ErrorCode::R2ServiceError,
            format!("recursive delete under {prefix} in {bucket} completed with partial failures"),
        ))
    } else {
        TaskOutcome::Completed
    }
}

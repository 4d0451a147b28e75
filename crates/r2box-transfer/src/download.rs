//! Download worker: streams an object's body to `<dest>.part`, renaming it
//! over `dest` only on success (mirroring the download-then-atomic-rename
//! idiom used elsewhere in this codebase for cached file hydration).

use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use r2box_core::domain::errors::{CoreError, ErrorCode};
use r2box_core::domain::newtypes::ObjectKey;
use r2box_core::domain::transfer::{TaskTarget, TransferTask};
use r2box_core::ports::object_store::ByteRange;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::{TaskOutcome, TransferEngine};

pub(crate) async fn run(
    engine: &Arc<TransferEngine>,
    task: &TransferTask,
    cancel: &CancellationToken,
) -> TaskOutcome {
    let id = *task.id();
    let bucket = task.bucket().clone();
    let key_str = match task.target() {
        TaskTarget::Key(k) => k.clone(),
        TaskTarget::Prefix(_) => {
            return TaskOutcome::Failed(CoreError::internal("download task target must be a key"))
        }
    };
    let dest = task
        .local_path()
        .expect("download task always carries a local_path")
        .to_string();
    let total = task.total();

    let key = match ObjectKey::new(key_str) {
        Ok(k) => k,
        Err(err) => return TaskOutcome::Failed(err.into()),
    };

    let partial_path = format!("{dest}.part");

    let mut object_stream = match engine
        .provider
        .get_object(&bucket, &key, None::<ByteRange>)
        .await
    {
        Ok(s) => s,
        Err(err) => return TaskOutcome::Failed(err),
    };

    if let Some(parent) = std::path::Path::new(&partial_path).parent() {
        if let Err(err) = tokio::fs::create_dir_all(parent).await {
            return TaskOutcome::Failed(CoreError::new(
                ErrorCode::InternalServerError,
                format!("cannot create download directory {}: {err}", parent.display()),
            ));
        }
    }

    let mut file = match tokio::fs::File::create(&partial_path).await {
        Ok(f) => f,
        Err(err) => {
            return TaskOutcome::Failed(CoreError::new(
                ErrorCode::InternalServerError,
                format!("cannot create {partial_path}: {err}"),
            ))
        }
    };

    let effective_total = if total > 0 { total } else { object_stream.content_length };
    let mut transferred: u64 = 0;

    while let Some(chunk) = object_stream.body.next().await {
        if cancel.is_cancelled() {
            let _ = tokio::fs::remove_file(&partial_path).await;
            return if engine.is_task_paused(&id) {
                TaskOutcome::Paused
            } else {
                TaskOutcome::Cancelled
            };
        }

        let bytes: Bytes = match chunk {
            Ok(b) => b,
            Err(err) => {
                let _ = tokio::fs::remove_file(&partial_path).await;
                return TaskOutcome::Failed(err);
            }
        };

        if let Err(err) = file.write_all(&bytes).await {
            let _ = tokio::fs::remove_file(&partial_path).await;
            return TaskOutcome::Failed(CoreError::new(
                ErrorCode::InternalServerError,
                format!("write to {partial_path} failed: {err}"),
            ));
        }

        transferred += bytes.len() as u64;
        engine.report_progress(id, transferred, effective_total, 0.0);
    }

    if let Err(err) = file.flush().await {
        let _ = tokio::fs::remove_file(&partial_path).await;
        return TaskOutcome::Failed(CoreError::new(
            ErrorCode::InternalServerError,
            format!("flush {partial_path} failed: {err}"),
        ));
    }
    drop(file);

    if let Err(err) = tokio::fs::rename(&partial_path, &dest).await {
        let _ = tokio::fs::remove_file(&partial_path).await;
        return TaskOutcome::Failed(CoreError::new(
            ErrorCode::InternalServerError,
            format!("rename {partial_path} to {dest} failed: {err}"),
        ));
    }

    TaskOutcome::Completed
}

//! Upload worker: streams a local file into `putObject` in bounded chunks.

use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use futures_core::stream::BoxStream;
use r2box_core::domain::errors::{CoreError, ErrorCode};
use r2box_core::domain::newtypes::{ObjectKey, TaskId};
use r2box_core::domain::transfer::{TaskTarget, TransferTask};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::{TaskOutcome, TransferEngine};

const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

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
            return TaskOutcome::Failed(CoreError::internal("upload task target must be a key"))
        }
    };
    let local_path = task
        .local_path()
        .expect("upload task always carries a local_path")
        .to_string();
    let total = task.total();

    let key = match ObjectKey::new(key_str) {
        Ok(k) => k,
        Err(err) => return TaskOutcome::Failed(err.into()),
    };

    let file = match tokio::fs::File::open(&local_path).await {
        Ok(f) => f,
        Err(err) => {
            return TaskOutcome::Failed(CoreError::new(
                ErrorCode::ValidationInvalidParam,
                format!("cannot open upload source {local_path}: {err}"),
            ))
        }
    };

    let body = reader_stream(file, Arc::clone(engine), id, total, cancel.clone());

    let result = engine
        .provider
        .put_object(&bucket, &key, body, total, "application/octet-stream")
        .await;

    match result {
        Ok(_) => {
            engine
                .cache
                .invalidate_prefix(&bucket, &parent_prefix(key.as_str()))
                .await;
            TaskOutcome::Completed
        }
        Err(err) => {
            if engine.is_task_paused(&id) {
                TaskOutcome::Paused
            } else if cancel.is_cancelled() {
                TaskOutcome::Cancelled
            } else {
                TaskOutcome::Failed(err)
            }
        }
    }
}

fn parent_prefix(key: &str) -> String {
    match key.rfind('/') {
        Some(idx) => key[..=idx].to_string(),
        None => String::new(),
    }
}

/// Reads `file` in `UPLOAD_CHUNK_SIZE` chunks on a background task,
/// forwarding each chunk (and a progress sample) over a bounded channel
/// the Provider Client consumes as a plain byte stream. Observing
/// `cancel` mid-read ends the stream with an `Interrupted` error rather
/// than silently truncating the upload.
fn reader_stream(
    mut file: tokio::fs::File,
    engine: Arc<TransferEngine>,
    id: TaskId,
    total: u64,
    cancel: CancellationToken,
) -> BoxStream<'static, Result<Bytes, std::io::Error>> {
    let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(4);

    tokio::spawn(async move {
        let mut buf = vec![0u8; UPLOAD_CHUNK_SIZE];
        let mut transferred: u64 = 0;
        loop {
            if cancel.is_cancelled() {
                let _ = tx
                    .send(Err(std::io::Error::new(
                        std::io::ErrorKind::Interrupted,
                        "upload cancelled",
                    )))
                    .await;
                break;
            }
            match file.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    transferred += n as u64;
                    engine.report_progress(id, transferred, total, 0.0);
                    if tx.send(Ok(Bytes::copy_from_slice(&buf[..n]))).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    let _ = tx.send(Err(err)).await;
                    break;
                }
            }
        }
    });

    ReceiverStream::new(rx).boxed()
}

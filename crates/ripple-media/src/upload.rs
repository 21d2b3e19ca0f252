//! The upload task: policy check, optional resample, then a resumable
//! transfer with monotonic progress and cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Notify};
use tracing::{debug, warn};
use uuid::Uuid;

use ripple_backend::{ObjectStorage, StorageError, StorageEvent};
use ripple_shared::constants::EVENT_CHANNEL_CAPACITY;
use ripple_shared::{Attachment, ConversationId, FilePayload, UserId};

use crate::error::MediaError;
use crate::{policy, resample};

/// Where the stored object will live.
pub enum UploadTarget {
    Conversation(ConversationId),
    Story(UserId),
}

impl UploadTarget {
    fn prefix(&self) -> String {
        match self {
            UploadTarget::Conversation(id) => format!("attachments/{id}"),
            UploadTarget::Story(user) => format!("stories/{user}"),
        }
    }
}

/// One progress or terminal event from the pipeline.
///
/// Progress is strictly increasing; exactly one terminal event
/// (`Completed`, `Cancelled` or `Failed`) ends every task.
#[derive(Debug)]
pub enum UploadEvent {
    Progress(u8),
    Completed(Attachment),
    Cancelled,
    Failed(MediaError),
}

/// Clonable cancellation handle for an upload.
///
/// May be created ahead of the task and passed to [`start_upload_with`],
/// so a caller can expose cancellation while the upload is still queued.
#[derive(Clone, Default)]
pub struct UploadCancel {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl UploadCancel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// An in-flight upload. Discarded, not retried, after a terminal event.
pub struct UploadTask {
    pub id: Uuid,
    events: mpsc::Receiver<UploadEvent>,
    cancel: UploadCancel,
}

impl UploadTask {
    pub async fn next_event(&mut self) -> Option<UploadEvent> {
        self.events.recv().await
    }

    /// Request cancellation. Takes effect before the transfer starts or
    /// at the next chunk boundary; the task then ends with a terminal
    /// [`UploadEvent::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A clonable handle for cancelling this task from elsewhere.
    pub fn cancel_handle(&self) -> UploadCancel {
        self.cancel.clone()
    }

    /// Drain events until the terminal one.
    ///
    /// `Ok(Some(_))` on completion, `Ok(None)` on cancellation.
    pub async fn finish(mut self) -> Result<Option<Attachment>, MediaError> {
        while let Some(event) = self.next_event().await {
            match event {
                UploadEvent::Progress(_) => {}
                UploadEvent::Completed(attachment) => return Ok(Some(attachment)),
                UploadEvent::Cancelled => return Ok(None),
                UploadEvent::Failed(error) => return Err(error),
            }
        }
        Err(MediaError::Internal(
            "upload ended without a terminal event".into(),
        ))
    }
}

/// Start an upload.
///
/// Policy violations (type, size) are rejected here, synchronously,
/// before any network activity. Everything later arrives as events.
pub async fn start_upload(
    storage: Arc<dyn ObjectStorage>,
    target: UploadTarget,
    file: FilePayload,
    max_bytes: usize,
) -> Result<UploadTask, MediaError> {
    start_upload_with(storage, target, file, max_bytes, UploadCancel::new()).await
}

/// [`start_upload`] with a caller-supplied cancellation handle.
pub async fn start_upload_with(
    storage: Arc<dyn ObjectStorage>,
    target: UploadTarget,
    file: FilePayload,
    max_bytes: usize,
    cancel: UploadCancel,
) -> Result<UploadTask, MediaError> {
    policy::validate(&file, max_bytes)?;

    let id = Uuid::new_v4();
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let task_cancel = cancel.clone();

    tokio::spawn(async move {
        run(storage, target, file, id, tx, task_cancel).await;
    });

    Ok(UploadTask { id, events: rx, cancel })
}

async fn run(
    storage: Arc<dyn ObjectStorage>,
    target: UploadTarget,
    file: FilePayload,
    id: Uuid,
    tx: mpsc::Sender<UploadEvent>,
    cancel: UploadCancel,
) {
    // Step 1: resample oversized images off the async threads.
    let (bytes, mime_type) = if policy::is_resamplable_image(&file.mime_type) {
        let raw = file.bytes.clone();
        match tokio::task::spawn_blocking(move || resample::prepare(&raw)).await {
            Ok(Ok(Some(prepared))) => (prepared.bytes, prepared.mime_type),
            Ok(Ok(None)) => (file.bytes.clone(), file.mime_type.clone()),
            Ok(Err(error)) => {
                let _ = tx.send(UploadEvent::Failed(error)).await;
                return;
            }
            Err(join_error) => {
                let _ = tx
                    .send(UploadEvent::Failed(MediaError::Internal(
                        join_error.to_string(),
                    )))
                    .await;
                return;
            }
        }
    } else {
        (file.bytes.clone(), file.mime_type.clone())
    };

    if cancel.is_cancelled() {
        let _ = tx.send(UploadEvent::Cancelled).await;
        return;
    }

    // Step 2: hand off to object storage.
    let path = format!(
        "{}/{}/{}",
        target.prefix(),
        id,
        sanitize_filename(&file.file_name)
    );
    let mut upload = match storage.put(&path, bytes, &mime_type).await {
        Ok(upload) => upload,
        Err(error) => {
            warn!(path = %path, error = %error, "Upload rejected by storage");
            let _ = tx.send(UploadEvent::Failed(error.into())).await;
            return;
        }
    };

    // Step 3: forward transfer events, clamped to strictly increasing
    // progress, until the terminal one.
    let mut last_progress = 0u8;
    let mut cancel_forwarded = false;
    loop {
        tokio::select! {
            _ = cancel.notify.notified(), if !cancel_forwarded => {
                upload.control.cancel();
                cancel_forwarded = true;
            }

            event = upload.events.recv() => match event {
                Some(StorageEvent::Progress(pct)) => {
                    if pct > last_progress {
                        last_progress = pct;
                        if tx.send(UploadEvent::Progress(pct)).await.is_err() {
                            upload.control.cancel();
                            return;
                        }
                    }
                }
                Some(StorageEvent::Completed { url }) => {
                    debug!(path = %path, url = %url, "Upload complete");
                    let _ = tx
                        .send(UploadEvent::Completed(Attachment {
                            url,
                            mime_type: mime_type.clone(),
                            file_name: file.file_name.clone(),
                        }))
                        .await;
                    return;
                }
                Some(StorageEvent::Cancelled) => {
                    debug!(path = %path, "Upload cancelled");
                    let _ = tx.send(UploadEvent::Cancelled).await;
                    return;
                }
                Some(StorageEvent::Failed(error)) => {
                    warn!(path = %path, error = %error, "Upload failed");
                    let _ = tx.send(UploadEvent::Failed(error.into())).await;
                    return;
                }
                None => {
                    let _ = tx
                        .send(UploadEvent::Failed(
                            StorageError::Network("transfer interrupted".into()).into(),
                        ))
                        .await;
                    return;
                }
            }
        }

        // Cancellation requested before the select was polled.
        if cancel.is_cancelled() && !cancel_forwarded {
            upload.control.cancel();
            cancel_forwarded = true;
        }
    }
}

/// Keep stored object names free of path separators and traversal.
fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    let cleaned = cleaned.replace("..", "_");
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

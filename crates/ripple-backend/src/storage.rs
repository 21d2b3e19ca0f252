//! Contract of the hosted object storage: a resumable upload primitive
//! with progress events and mid-transfer cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors produced by object storage.
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Upload rejected: {0}")]
    Rejected(String),
}

/// One progress or terminal event from a resumable upload.
///
/// Exactly one terminal event (`Completed`, `Cancelled` or `Failed`) ends
/// every upload.
#[derive(Debug, Clone)]
pub enum StorageEvent {
    /// Percentage of bytes transferred, 0-100.
    Progress(u8),
    /// The stored object is dereferenceable at `url`.
    Completed { url: String },
    /// The transfer stopped before completion; no object is referenced.
    Cancelled,
    /// The transfer failed. The storage layer does not retry.
    Failed(StorageError),
}

/// Cancellation handle for an in-flight upload.
///
/// Cancellation takes effect at the next chunk boundary; the transfer
/// then emits a terminal [`StorageEvent::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct UploadControl {
    cancelled: Arc<AtomicBool>,
}

impl UploadControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// An in-flight resumable upload.
pub struct StorageUpload {
    pub events: mpsc::Receiver<StorageEvent>,
    pub control: UploadControl,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Begin a resumable upload of `bytes` to `path`.
    ///
    /// Errors returned here are pre-flight rejections; once a
    /// [`StorageUpload`] exists, failures arrive as events.
    async fn put(
        &self,
        path: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<StorageUpload, StorageError>;
}

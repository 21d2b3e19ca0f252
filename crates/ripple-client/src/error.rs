use thiserror::Error;

use ripple_backend::{AuthError, StoreError};
use ripple_media::MediaError;
use ripple_shared::MessageId;
use ripple_sync::SyncError;

/// Errors surfaced by the client layer.
///
/// Every variant degrades a single feature; nothing here is fatal to the
/// session.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Document store error: {0}")]
    Store(#[from] StoreError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Guest sessions cannot {0}")]
    GuestNotAllowed(&'static str),

    #[error("Cannot send an empty message")]
    EmptyMessage,

    #[error("No failed message {0} to act on")]
    UnknownMessage(MessageId),

    #[error("Client error: {0}")]
    Internal(String),
}

use thiserror::Error;

use ripple_backend::StorageError;

/// Errors produced by the upload pipeline.
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Unsupported attachment type: {0}")]
    UnsupportedType(String),

    #[error("Attachment too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Empty file")]
    Empty,

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Object storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Upload pipeline error: {0}")]
    Internal(String),
}

//! Attachment upload pipeline.
//!
//! Takes a raw file, validates it against the attachment policy before
//! any network activity, optionally resamples oversized images, then
//! drives a resumable upload with monotonic progress reporting and
//! mid-transfer cancellation.

pub mod error;
pub mod policy;
pub mod resample;
pub mod upload;

pub use error::MediaError;
pub use upload::{
    start_upload, start_upload_with, UploadCancel, UploadEvent, UploadTarget, UploadTask,
};

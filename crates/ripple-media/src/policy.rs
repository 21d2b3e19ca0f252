//! Attachment policy checks, applied synchronously before any network
//! activity.

use ripple_shared::FilePayload;

use crate::error::MediaError;

/// MIME types accepted as conversation attachments.
const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/webp",
    "image/gif",
    "application/pdf",
    "text/plain",
];

/// Validate a file against the attachment policy.
pub fn validate(file: &FilePayload, max_bytes: usize) -> Result<(), MediaError> {
    if file.is_empty() {
        return Err(MediaError::Empty);
    }
    if !ALLOWED_MIME_TYPES.contains(&file.mime_type.as_str()) {
        return Err(MediaError::UnsupportedType(file.mime_type.clone()));
    }
    if file.len() > max_bytes {
        return Err(MediaError::TooLarge {
            size: file.len(),
            max: max_bytes,
        });
    }
    Ok(())
}

/// Whether the pipeline may resample this type. Animated GIFs are left
/// untouched; everything else decodable is fair game.
pub fn is_resamplable_image(mime_type: &str) -> bool {
    matches!(mime_type, "image/jpeg" | "image/png" | "image/webp")
}

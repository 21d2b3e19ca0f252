//! Image downscaling before upload.
//!
//! Images wider than [`MAX_IMAGE_WIDTH`] are resampled down to that
//! width preserving aspect ratio and re-encoded as JPEG at a fixed
//! quality factor. Lossy on purpose: it bounds bandwidth and storage
//! cost for every oversized photo.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use tracing::debug;

use ripple_shared::constants::{JPEG_QUALITY, MAX_IMAGE_WIDTH};

use crate::error::MediaError;

/// A re-encoded image ready for upload.
pub struct PreparedImage {
    pub bytes: Bytes,
    pub mime_type: String,
}

/// Downscale `bytes` if the decoded image is wider than the maximum.
///
/// Returns `None` when the image already fits and should be uploaded
/// unchanged. Decode failures are surfaced; the caller treats them as a
/// validation failure, not a transfer failure.
pub fn prepare(bytes: &[u8]) -> Result<Option<PreparedImage>, MediaError> {
    let decoded = image::load_from_memory(bytes)?;
    if decoded.width() <= MAX_IMAGE_WIDTH {
        return Ok(None);
    }

    let resized = decoded.resize(MAX_IMAGE_WIDTH, u32::MAX, FilterType::Triangle);
    // JPEG has no alpha channel; flatten before encoding.
    let resized = DynamicImage::ImageRgb8(resized.to_rgb8());

    let mut out = Vec::new();
    let mut cursor = Cursor::new(&mut out);
    let encoder = JpegEncoder::new_with_quality(&mut cursor, JPEG_QUALITY);
    resized.write_with_encoder(encoder)?;

    debug!(
        from_width = decoded.width(),
        to_width = resized.width(),
        bytes = out.len(),
        "image resampled for upload"
    );

    Ok(Some(PreparedImage {
        bytes: out.into(),
        mime_type: "image/jpeg".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([10, 20, 30])));
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn oversized_image_is_scaled_to_the_maximum_width() {
        let prepared = prepare(&png_bytes(2 * MAX_IMAGE_WIDTH, 500))
            .unwrap()
            .expect("should resample");
        assert_eq!(prepared.mime_type, "image/jpeg");

        let decoded = image::load_from_memory(&prepared.bytes).unwrap();
        assert_eq!(decoded.width(), MAX_IMAGE_WIDTH);
        assert_eq!(decoded.height(), 250);
    }

    #[test]
    fn small_image_passes_through_untouched() {
        assert!(prepare(&png_bytes(640, 480)).unwrap().is_none());
    }

    #[test]
    fn undecodable_bytes_are_an_error() {
        assert!(matches!(
            prepare(b"definitely not an image"),
            Err(MediaError::Image(_))
        ));
    }
}

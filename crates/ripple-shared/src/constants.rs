/// Application name
pub const APP_NAME: &str = "Ripple";

/// Window for matching an optimistic send against its server-confirmed
/// copy, in seconds. Absorbs client/server clock skew on the
/// server-assigned timestamp.
pub const RECONCILE_WINDOW_SECS: i64 = 30;

/// Number of trailing messages handed to the reply-suggestion endpoint
pub const SUGGESTION_WINDOW: usize = 5;

/// Maximum number of reply suggestions surfaced at once
pub const MAX_SUGGESTIONS: usize = 3;

/// Maximum attachment size in bytes (50 MiB)
pub const MAX_ATTACHMENT_SIZE: usize = 50 * 1024 * 1024;

/// Images wider than this are resampled down before upload
pub const MAX_IMAGE_WIDTH: u32 = 1280;

/// JPEG quality factor used when re-encoding a resampled image
pub const JPEG_QUALITY: u8 = 80;

/// Stories expire after this many hours
pub const STORY_TTL_HOURS: i64 = 24;

/// Capacity of sync / upload event channels
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

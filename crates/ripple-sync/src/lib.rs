//! Real-time conversation synchronization.
//!
//! Maintains a consistent, ordered, deduplicated view of a conversation
//! under concurrent local and remote mutation: a confirmed layer mirrors
//! the server feed, a pending layer overlays optimistic sends, and every
//! emission to the subscriber is the full reconciled list. Also hosts the
//! presence tracker.

pub mod feed;
pub mod merge;
pub mod presence;

pub use feed::{subscribe, SyncCommands, SyncError, SyncUpdate, SyncUpdates};
pub use merge::MergeState;
pub use presence::PresenceTracker;

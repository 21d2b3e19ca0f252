//! Shared domain types and constants for the Ripple chat client core.

pub mod constants;
pub mod types;

pub use types::{
    Attachment, Conversation, ConversationId, DeliveryState, FilePayload, Message, MessageId,
    NotificationSettings, PresenceStatus, Story, UserId, UserProfile,
};

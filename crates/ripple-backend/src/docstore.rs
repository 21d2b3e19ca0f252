//! Contract of the hosted document store.
//!
//! The store owns every persisted entity (conversations, messages,
//! profiles, settings, stories). Message feeds are delivered as an
//! initial ordered snapshot plus a live event stream, the same shape a
//! snapshot-listener SDK exposes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;

use ripple_shared::{
    Conversation, ConversationId, Message, MessageId, NotificationSettings, Story, UserId,
    UserProfile,
};

/// Errors produced by the document store.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Document store unavailable: {0}")]
    Unavailable(String),

    #[error("Document not found")]
    NotFound,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),
}

/// One change pushed by a live message feed.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// A new message document was appended.
    Added(Message),
    /// An existing message document changed (delivery receipt advances).
    Modified(Message),
    /// The feed failed. No further events follow; the subscriber must
    /// resubscribe if it wants the feed back.
    Lost(StoreError),
}

/// A live subscription to one conversation's message feed.
///
/// `initial` is a bulk read of all messages ordered by timestamp
/// ascending; `events` carries subsequent changes. Dropping the
/// subscription detaches it and is a hard barrier: no events are
/// delivered afterwards.
pub struct FeedSubscription {
    pub initial: Vec<Message>,
    pub events: mpsc::Receiver<FeedEvent>,
}

impl FeedSubscription {
    /// Detach the live stream. Equivalent to dropping the subscription.
    pub fn detach(self) {}
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    // -- Conversations --

    /// Create the conversation document if it does not exist yet.
    async fn ensure_conversation(&self, doc: Conversation) -> Result<(), StoreError>;

    async fn conversations_for(&self, user: &UserId) -> Result<Vec<Conversation>, StoreError>;

    // -- Messages --

    /// Persist a message. The store assigns the final message id and the
    /// authoritative server timestamp; both are reflected in the feed.
    async fn append_message(&self, message: Message) -> Result<MessageId, StoreError>;

    /// All messages of a conversation, ordered by timestamp ascending.
    async fn load_messages(
        &self,
        conversation: &ConversationId,
    ) -> Result<Vec<Message>, StoreError>;

    /// Attach a live feed to a conversation.
    async fn watch_messages(
        &self,
        conversation: &ConversationId,
    ) -> Result<FeedSubscription, StoreError>;

    // -- Profiles --

    async fn upsert_profile(&self, profile: &UserProfile) -> Result<(), StoreError>;

    async fn load_profile(&self, user: &UserId) -> Result<Option<UserProfile>, StoreError>;

    // -- Notification settings --

    async fn save_settings(
        &self,
        user: &UserId,
        settings: &NotificationSettings,
    ) -> Result<(), StoreError>;

    async fn load_settings(
        &self,
        user: &UserId,
    ) -> Result<Option<NotificationSettings>, StoreError>;

    // -- Stories --

    async fn append_story(&self, story: Story) -> Result<(), StoreError>;

    /// Stories posted at or after `cutoff`, newest first.
    async fn stories_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<Story>, StoreError>;
}

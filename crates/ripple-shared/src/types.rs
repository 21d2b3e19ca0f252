//! Domain model structs shared across the workspace.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be stored
//! as a document in the hosted document store or handed to an embedding
//! UI layer unchanged.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Opaque user identifier issued by the auth provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A user identity as issued by the auth provider.
///
/// Immutable once issued; cached locally for the session lifetime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub id: UserId,
    pub display_name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// Opaque conversation identifier.
///
/// Deterministic for 1:1 conversations (derived from the two participant
/// ids), server-assigned or well-known for groups.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ConversationId(pub String);

impl ConversationId {
    /// Derive the deterministic id for a 1:1 conversation.
    ///
    /// Both participants derive the same id regardless of argument order.
    pub fn direct(a: &UserId, b: &UserId) -> Self {
        let (lo, hi) = if a.0 <= b.0 { (a, b) } else { (b, a) };
        Self(format!("{}_{}", lo.0, hi.0))
    }

    /// Wrap a server-assigned or well-known group id.
    pub fn group(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A conversation document (DM or group).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    /// Unique conversation identifier.
    pub id: ConversationId,
    /// Display name; `None` for 1:1 conversations (the UI shows the peer).
    pub name: Option<String>,
    /// Participant ids.
    pub members: Vec<UserId>,
    /// Whether this is a group conversation.
    pub group: bool,
}

impl Conversation {
    /// Build the document for a 1:1 conversation between two users.
    pub fn direct(a: &UserId, b: &UserId) -> Self {
        Self {
            id: ConversationId::direct(a, b),
            name: None,
            members: vec![a.clone(), b.clone()],
            group: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Message identifier.
///
/// Server-assigned once persisted; before confirmation an optimistic copy
/// carries a client-minted `tmp-` id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MessageId(pub String);

impl MessageId {
    /// Mint a client-side temporary id for an optimistic send.
    pub fn temp() -> Self {
        Self(format!("tmp-{}", Uuid::new_v4()))
    }

    /// Whether this id is a client-side temporary id.
    pub fn is_temp(&self) -> bool {
        self.0.starts_with("tmp-")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client-tracked delivery state of a message. Not guaranteed durable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryState {
    Pending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl DeliveryState {
    /// Position in the monotonic delivery ladder.
    ///
    /// `Failed` sits outside the ladder; it is set explicitly by the send
    /// orchestrator and never reached by advancing.
    fn rank(self) -> Option<u8> {
        match self {
            DeliveryState::Pending => Some(0),
            DeliveryState::Sent => Some(1),
            DeliveryState::Delivered => Some(2),
            DeliveryState::Read => Some(3),
            DeliveryState::Failed => None,
        }
    }

    /// Advance along the ladder; never moves backwards.
    #[must_use]
    pub fn advance(self, to: DeliveryState) -> DeliveryState {
        match (self.rank(), to.rank()) {
            (Some(from), Some(target)) if target > from => to,
            _ => self,
        }
    }
}

/// Reference to a stored attachment object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    /// Permanently-dereferenceable URL of the stored object.
    pub url: String,
    /// MIME type of the stored object.
    pub mime_type: String,
    /// Original file name, kept for display.
    pub file_name: String,
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    /// Sender display name, denormalized at send time.
    pub sender_name: Option<String>,
    pub text: Option<String>,
    pub attachment: Option<Attachment>,
    /// Logical send time; reconciled to server time once persisted.
    pub timestamp: DateTime<Utc>,
    pub delivery_state: DeliveryState,
}

impl Message {
    /// Synthesize the optimistic local copy of an outgoing message:
    /// temporary id, current local timestamp, `Pending` delivery state.
    pub fn optimistic(
        conversation_id: ConversationId,
        sender: &UserProfile,
        text: Option<String>,
        attachment: Option<Attachment>,
    ) -> Self {
        Self {
            id: MessageId::temp(),
            conversation_id,
            sender_id: sender.id.clone(),
            sender_name: Some(sender.display_name.clone()),
            text,
            attachment,
            timestamp: Utc::now(),
            delivery_state: DeliveryState::Pending,
        }
    }
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

/// Live online/offline status, propagated via connect/disconnect signals.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
    Away,
    Dnd,
}

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

/// A raw file handed to the upload pipeline.
#[derive(Debug, Clone)]
pub struct FilePayload {
    pub bytes: Bytes,
    pub file_name: String,
    pub mime_type: String,
}

impl FilePayload {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Story
// ---------------------------------------------------------------------------

/// A story post: a media object that expires after a fixed TTL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Story {
    pub id: String,
    pub user_id: UserId,
    pub user_name: String,
    pub user_avatar: Option<String>,
    pub media_url: String,
    pub media_type: String,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Per-user notification preferences, persisted as a document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationSettings {
    pub mute_all: bool,
    pub muted_conversations: Vec<ConversationId>,
}

impl NotificationSettings {
    /// Whether notifications for `conversation` are suppressed.
    pub fn is_muted(&self, conversation: &ConversationId) -> bool {
        self.mute_all || self.muted_conversations.contains(conversation)
    }
}

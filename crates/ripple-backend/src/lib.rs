//! Trait seams for the hosted collaborator services.
//!
//! The chat core is a thin client over five hosted services: an auth
//! provider, a document store, object storage, a realtime presence
//! channel, and a reply-suggestion model endpoint. Each is reached
//! through an object-safe async trait so the rest of the workspace never
//! touches a vendor SDK directly, and so tests can substitute the
//! deterministic in-memory backend in [`memory`].

pub mod auth;
pub mod docstore;
pub mod memory;
pub mod presence;
pub mod storage;
pub mod suggest;

use std::sync::Arc;

pub use auth::{AuthError, AuthProvider};
pub use docstore::{DocumentStore, FeedEvent, FeedSubscription, StoreError};
pub use presence::{PresenceChannel, PresenceError};
pub use storage::{ObjectStorage, StorageError, StorageEvent, StorageUpload, UploadControl};
pub use suggest::{
    HttpSuggestClient, SuggestClient, SuggestError, SuggestMessage, SuggestRequest,
    SuggestResponse,
};

/// Handles to the hosted collaborator services, injected into every
/// component at construction. There is no ambient global state.
#[derive(Clone)]
pub struct Backend {
    pub auth: Arc<dyn AuthProvider>,
    pub documents: Arc<dyn DocumentStore>,
    pub storage: Arc<dyn ObjectStorage>,
    pub presence: Arc<dyn PresenceChannel>,
    pub suggest: Arc<dyn SuggestClient>,
}

impl Backend {
    /// A fully in-memory backend.
    ///
    /// Stands in for the hosted services when none are configured, and
    /// serves as the deterministic test double across the workspace.
    pub fn in_memory() -> Self {
        Self {
            auth: Arc::new(memory::MemoryAuth::new()),
            documents: Arc::new(memory::MemoryDocumentStore::new()),
            storage: Arc::new(memory::MemoryObjectStorage::new()),
            presence: Arc::new(memory::MemoryPresence::new()),
            suggest: Arc::new(memory::ScriptedSuggestClient::empty()),
        }
    }
}

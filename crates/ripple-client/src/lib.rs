//! Ripple client orchestration.
//!
//! Ties the collaborator seams together behind one session-scoped
//! client: auth and session context, presence, conversation handles with
//! optimistic sends, reply suggestions, notification settings and
//! stories. All UI concerns live in the embedding application; this
//! crate only owns state and orchestration.

pub mod config;
pub mod conversation;
pub mod error;
pub mod session;
mod settings;
mod stories;
pub mod suggestions;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use ripple_backend::{Backend, HttpSuggestClient};
use ripple_shared::{Conversation, ConversationId, UserId, UserProfile};
use ripple_sync::{PresenceTracker, SyncUpdate};

pub use config::ClientConfig;
pub use conversation::{
    phase_of, AttachmentSend, ConversationHandle, SendOutcome, SendPhase,
};
pub use error::ClientError;
pub use session::{SessionContext, SessionKind};
pub use suggestions::SuggestionState;

/// Install the default tracing subscriber.
///
/// Honours `RUST_LOG`; without it, client and sync internals log at
/// debug and everything else at warn.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            "ripple_client=debug,ripple_sync=debug,ripple_backend=info,ripple_media=info,warn",
        )
    });

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// A signed-in (or guest) chat client.
pub struct RippleClient {
    backend: Backend,
    config: ClientConfig,
    session: SessionContext,
    presence: PresenceTracker,
}

impl RippleClient {
    /// Sign in with an existing account.
    ///
    /// The stored profile document, if any, is merged over the auth
    /// identity so display-name and avatar edits survive re-login.
    pub async fn sign_in(
        backend: Backend,
        config: ClientConfig,
        email: &str,
        password: &str,
    ) -> Result<Self, ClientError> {
        let mut profile = backend.auth.sign_in(email, password).await?;
        if let Some(stored) = backend.documents.load_profile(&profile.id).await? {
            if !stored.display_name.is_empty() {
                profile.display_name = stored.display_name;
            }
            profile.avatar_url = stored.avatar_url.or(profile.avatar_url);
        }
        Self::start(backend, config, SessionContext::registered(profile)).await
    }

    /// Create an account, publish its profile document, and sign in.
    pub async fn sign_up(
        backend: Backend,
        config: ClientConfig,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<Self, ClientError> {
        let profile = backend.auth.sign_up(name, email, password).await?;
        backend.documents.upsert_profile(&profile).await?;
        Self::start(backend, config, SessionContext::registered(profile)).await
    }

    /// Start an anonymous guest session. Guests never trigger reply
    /// suggestions and cannot post stories.
    pub async fn guest(
        backend: Backend,
        config: ClientConfig,
        display_name: Option<&str>,
    ) -> Result<Self, ClientError> {
        let name = display_name.unwrap_or(&config.guest_display_name).to_string();
        Self::start(backend, config, SessionContext::guest(&name)).await
    }

    async fn start(
        mut backend: Backend,
        config: ClientConfig,
        session: SessionContext,
    ) -> Result<Self, ClientError> {
        // A configured endpoint overrides whatever suggestion client the
        // backend was built with.
        if let Some(url) = &config.suggest_url {
            backend.suggest = Arc::new(HttpSuggestClient::new(url.clone()));
        }
        let presence =
            PresenceTracker::announce(backend.presence.clone(), session.user_id().clone()).await;
        info!(user = %session.user_id(), guest = session.is_guest(), "Session started");
        Ok(Self {
            backend,
            config,
            session,
            presence,
        })
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub(crate) fn backend(&self) -> &Backend {
        &self.backend
    }

    pub(crate) fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Open (creating on first use) the 1:1 conversation with `peer`.
    pub async fn conversation_with(
        &self,
        peer: &UserProfile,
    ) -> Result<(ConversationHandle, mpsc::Receiver<SyncUpdate>), ClientError> {
        let meta = Conversation::direct(self.session.user_id(), &peer.id);
        self.open(meta).await
    }

    /// Open a group conversation by its well-known or server-assigned id.
    pub async fn group(
        &self,
        key: impl Into<String>,
        name: impl Into<String>,
        mut members: Vec<UserId>,
    ) -> Result<(ConversationHandle, mpsc::Receiver<SyncUpdate>), ClientError> {
        if !members.contains(self.session.user_id()) {
            members.push(self.session.user_id().clone());
        }
        let meta = Conversation {
            id: ConversationId::group(key),
            name: Some(name.into()),
            members,
            group: true,
        };
        self.open(meta).await
    }

    async fn open(
        &self,
        meta: Conversation,
    ) -> Result<(ConversationHandle, mpsc::Receiver<SyncUpdate>), ClientError> {
        ConversationHandle::open(
            self.session.clone(),
            &self.backend,
            meta,
            self.config.max_attachment_bytes,
        )
        .await
    }

    /// Conversations this session participates in.
    pub async fn conversations(&self) -> Result<Vec<Conversation>, ClientError> {
        Ok(self
            .backend
            .documents
            .conversations_for(self.session.user_id())
            .await?)
    }

    /// Subscribe to another user's presence.
    pub fn watch_presence(
        &self,
        user: &UserId,
    ) -> tokio::sync::watch::Receiver<ripple_shared::PresenceStatus> {
        self.presence.watch(user)
    }

    /// End the session: publish offline presence before detaching, then
    /// sign out of the auth provider.
    pub async fn sign_out(self) -> Result<(), ClientError> {
        self.presence.sign_out().await;
        if !self.session.is_guest() {
            self.backend.auth.sign_out().await?;
        }
        info!(user = %self.session.user_id(), "Session ended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripple_shared::PresenceStatus;

    #[tokio::test]
    async fn sign_up_publishes_a_profile_document_and_goes_online() {
        let backend = Backend::in_memory();
        let client = RippleClient::sign_up(
            backend.clone(),
            ClientConfig::default(),
            "Alice",
            "alice@example.com",
            "hunter2",
        )
        .await
        .unwrap();

        let stored = backend
            .documents
            .load_profile(client.session().user_id())
            .await
            .unwrap()
            .expect("profile document");
        assert_eq!(stored.display_name, "Alice");

        let presence = client.watch_presence(client.session().user_id());
        assert_eq!(*presence.borrow(), PresenceStatus::Online);
    }

    #[tokio::test]
    async fn sign_in_merges_the_stored_profile_document() {
        let backend = Backend::in_memory();
        let first = RippleClient::sign_up(
            backend.clone(),
            ClientConfig::default(),
            "Alice",
            "alice@example.com",
            "hunter2",
        )
        .await
        .unwrap();
        let id = first.session().user_id().clone();
        first.sign_out().await.unwrap();

        // An edited display name in the profile document wins on re-login.
        let mut edited = backend
            .documents
            .load_profile(&id)
            .await
            .unwrap()
            .unwrap();
        edited.display_name = "Alice L.".into();
        backend.documents.upsert_profile(&edited).await.unwrap();

        let again = RippleClient::sign_in(
            backend,
            ClientConfig::default(),
            "alice@example.com",
            "hunter2",
        )
        .await
        .unwrap();
        assert_eq!(again.session().profile.display_name, "Alice L.");
    }

    #[tokio::test]
    async fn sign_out_publishes_offline_before_detaching() {
        let backend = Backend::in_memory();
        let client = RippleClient::sign_up(
            backend.clone(),
            ClientConfig::default(),
            "Alice",
            "alice@example.com",
            "hunter2",
        )
        .await
        .unwrap();
        let id = client.session().user_id().clone();
        let watcher = backend.presence.watch(&id);

        client.sign_out().await.unwrap();
        assert_eq!(*watcher.borrow(), PresenceStatus::Offline);
        assert!(backend.auth.current_user().borrow().is_none());
    }

    #[tokio::test]
    async fn guest_sessions_start_without_an_account() {
        let backend = Backend::in_memory();
        let client = RippleClient::guest(backend, ClientConfig::default(), None)
            .await
            .unwrap();
        assert!(client.session().is_guest());
        assert_eq!(client.session().profile.display_name, "Guest");
    }
}

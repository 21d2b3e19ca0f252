//! In-memory implementations of every collaborator seam.
//!
//! These stand in for the hosted services when none are configured and
//! serve as the deterministic test double across the workspace. Failure
//! injection hooks (`fail_appends`, upload scripts, `drop_connection`)
//! exist so tests can drive the degraded paths without a network.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch, Notify};
use tracing::debug;
use uuid::Uuid;

use ripple_shared::constants::EVENT_CHANNEL_CAPACITY;
use ripple_shared::{
    Conversation, ConversationId, DeliveryState, Message, MessageId, NotificationSettings,
    PresenceStatus, Story, UserId, UserProfile,
};

use crate::auth::{AuthError, AuthProvider};
use crate::docstore::{DocumentStore, FeedEvent, FeedSubscription, StoreError};
use crate::presence::{PresenceChannel, PresenceError};
use crate::storage::{ObjectStorage, StorageError, StorageEvent, StorageUpload, UploadControl};
use crate::suggest::{SuggestClient, SuggestError, SuggestRequest, SuggestResponse};

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

struct Account {
    password: String,
    profile: UserProfile,
}

/// In-memory auth provider keyed by email.
pub struct MemoryAuth {
    accounts: Mutex<HashMap<String, Account>>,
    current: watch::Sender<Option<UserProfile>>,
}

impl MemoryAuth {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            accounts: Mutex::new(HashMap::new()),
            current,
        }
    }
}

impl Default for MemoryAuth {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthProvider for MemoryAuth {
    async fn sign_in(&self, email: &str, password: &str) -> Result<UserProfile, AuthError> {
        let profile = {
            let accounts = self.accounts.lock().expect("auth lock");
            match accounts.get(email) {
                Some(account) if account.password == password => account.profile.clone(),
                _ => return Err(AuthError::InvalidCredentials),
            }
        };
        self.current.send_replace(Some(profile.clone()));
        Ok(profile)
    }

    async fn sign_up(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<UserProfile, AuthError> {
        let profile = {
            let mut accounts = self.accounts.lock().expect("auth lock");
            if accounts.contains_key(email) {
                return Err(AuthError::EmailInUse(email.to_string()));
            }
            let initial = name.chars().next().unwrap_or('?');
            let profile = UserProfile {
                id: UserId(format!("u-{}", Uuid::new_v4())),
                display_name: name.to_string(),
                email: Some(email.to_string()),
                avatar_url: Some(format!("https://placehold.co/100x100.png?text={initial}")),
            };
            accounts.insert(
                email.to_string(),
                Account {
                    password: password.to_string(),
                    profile: profile.clone(),
                },
            );
            profile
        };
        self.current.send_replace(Some(profile.clone()));
        Ok(profile)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.current.send_replace(None);
        Ok(())
    }

    fn current_user(&self) -> watch::Receiver<Option<UserProfile>> {
        self.current.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Document store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Documents {
    conversations: HashMap<ConversationId, Conversation>,
    messages: HashMap<ConversationId, Vec<Message>>,
    watchers: HashMap<ConversationId, Vec<mpsc::Sender<FeedEvent>>>,
    profiles: HashMap<UserId, UserProfile>,
    settings: HashMap<UserId, NotificationSettings>,
    stories: Vec<Story>,
}

/// In-memory document store with live message feeds.
pub struct MemoryDocumentStore {
    inner: Mutex<Documents>,
    fail_appends: AtomicBool,
    fail_watch: AtomicBool,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Documents::default()),
            fail_appends: AtomicBool::new(false),
            fail_watch: AtomicBool::new(false),
        }
    }

    /// Make subsequent `append_message` calls fail (persistence outage).
    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `watch_messages` calls fail.
    pub fn fail_watch(&self, fail: bool) {
        self.fail_watch.store(fail, Ordering::SeqCst);
    }

    /// Advance a message's delivery state and notify watchers.
    ///
    /// Stands in for the receipt signals a hosted store would surface.
    pub async fn emit_receipt(
        &self,
        conversation: &ConversationId,
        message: &MessageId,
        state: DeliveryState,
    ) {
        let updated = {
            let mut inner = self.inner.lock().expect("docstore lock");
            inner
                .messages
                .get_mut(conversation)
                .and_then(|list| list.iter_mut().find(|m| &m.id == message))
                .map(|m| {
                    m.delivery_state = m.delivery_state.advance(state);
                    m.clone()
                })
        };
        if let Some(message) = updated {
            self.notify(conversation, FeedEvent::Modified(message)).await;
        }
    }

    /// Terminate every live feed of `conversation` with a `Lost` event.
    pub async fn break_feed(&self, conversation: &ConversationId) {
        self.notify(
            conversation,
            FeedEvent::Lost(StoreError::Unavailable("feed interrupted".into())),
        )
        .await;
        let mut inner = self.inner.lock().expect("docstore lock");
        inner.watchers.remove(conversation);
    }

    async fn notify(&self, conversation: &ConversationId, event: FeedEvent) {
        let senders: Vec<mpsc::Sender<FeedEvent>> = {
            let inner = self.inner.lock().expect("docstore lock");
            inner
                .watchers
                .get(conversation)
                .cloned()
                .unwrap_or_default()
        };
        for sender in senders {
            // A closed receiver means the subscriber detached; pruned below.
            let _ = sender.send(event.clone()).await;
        }
        let mut inner = self.inner.lock().expect("docstore lock");
        if let Some(watchers) = inner.watchers.get_mut(conversation) {
            watchers.retain(|tx| !tx.is_closed());
        }
    }

    fn sorted_messages(inner: &Documents, conversation: &ConversationId) -> Vec<Message> {
        let mut messages = inner
            .messages
            .get(conversation)
            .cloned()
            .unwrap_or_default();
        messages.sort_by_key(|m| m.timestamp);
        messages
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn ensure_conversation(&self, doc: Conversation) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("docstore lock");
        inner.conversations.entry(doc.id.clone()).or_insert(doc);
        Ok(())
    }

    async fn conversations_for(&self, user: &UserId) -> Result<Vec<Conversation>, StoreError> {
        let inner = self.inner.lock().expect("docstore lock");
        Ok(inner
            .conversations
            .values()
            .filter(|c| c.members.contains(user))
            .cloned()
            .collect())
    }

    async fn append_message(&self, message: Message) -> Result<MessageId, StoreError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected write failure".into()));
        }

        let stored = {
            let mut inner = self.inner.lock().expect("docstore lock");
            let mut stored = message;
            stored.id = MessageId(format!("m-{}", Uuid::new_v4()));
            stored.timestamp = Utc::now();
            stored.delivery_state = stored.delivery_state.advance(DeliveryState::Sent);
            inner
                .messages
                .entry(stored.conversation_id.clone())
                .or_default()
                .push(stored.clone());
            stored
        };

        debug!(id = %stored.id, conversation = %stored.conversation_id, "message persisted");
        let id = stored.id.clone();
        self.notify(&stored.conversation_id.clone(), FeedEvent::Added(stored))
            .await;
        Ok(id)
    }

    async fn load_messages(
        &self,
        conversation: &ConversationId,
    ) -> Result<Vec<Message>, StoreError> {
        let inner = self.inner.lock().expect("docstore lock");
        Ok(Self::sorted_messages(&inner, conversation))
    }

    async fn watch_messages(
        &self,
        conversation: &ConversationId,
    ) -> Result<FeedSubscription, StoreError> {
        if self.fail_watch.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected subscribe failure".into()));
        }

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let initial = {
            let mut inner = self.inner.lock().expect("docstore lock");
            inner
                .watchers
                .entry(conversation.clone())
                .or_default()
                .push(tx);
            Self::sorted_messages(&inner, conversation)
        };
        Ok(FeedSubscription {
            initial,
            events: rx,
        })
    }

    async fn upsert_profile(&self, profile: &UserProfile) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("docstore lock");
        inner.profiles.insert(profile.id.clone(), profile.clone());
        Ok(())
    }

    async fn load_profile(&self, user: &UserId) -> Result<Option<UserProfile>, StoreError> {
        let inner = self.inner.lock().expect("docstore lock");
        Ok(inner.profiles.get(user).cloned())
    }

    async fn save_settings(
        &self,
        user: &UserId,
        settings: &NotificationSettings,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("docstore lock");
        inner.settings.insert(user.clone(), settings.clone());
        Ok(())
    }

    async fn load_settings(
        &self,
        user: &UserId,
    ) -> Result<Option<NotificationSettings>, StoreError> {
        let inner = self.inner.lock().expect("docstore lock");
        Ok(inner.settings.get(user).cloned())
    }

    async fn append_story(&self, story: Story) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("docstore lock");
        inner.stories.push(story);
        Ok(())
    }

    async fn stories_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<Story>, StoreError> {
        let inner = self.inner.lock().expect("docstore lock");
        let mut stories: Vec<Story> = inner
            .stories
            .iter()
            .filter(|s| s.timestamp >= cutoff)
            .cloned()
            .collect();
        stories.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(stories)
    }
}

// ---------------------------------------------------------------------------
// Object storage
// ---------------------------------------------------------------------------

/// Behavior script for the next uploads (test hook).
#[derive(Debug, Clone, Copy, Default)]
pub struct UploadScript {
    /// Emit a terminal `Failed` after progress reaches this percentage.
    pub fail_at: Option<u8>,
    /// Pause after this percentage until `release_held` or cancellation.
    pub hold_at: Option<u8>,
}

/// In-memory object storage with scripted, chunked transfer progress.
pub struct MemoryObjectStorage {
    objects: Arc<Mutex<HashMap<String, (Bytes, String)>>>,
    script: Mutex<UploadScript>,
    release: Arc<Notify>,
}

impl MemoryObjectStorage {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(Mutex::new(HashMap::new())),
            script: Mutex::new(UploadScript::default()),
            release: Arc::new(Notify::new()),
        }
    }

    /// Script the behavior of subsequent uploads.
    pub fn script(&self, script: UploadScript) {
        *self.script.lock().expect("storage lock") = script;
    }

    /// Resume every upload paused by `hold_at`.
    pub fn release_held(&self) {
        self.release.notify_waiters();
    }

    /// The stored bytes behind a previously completed upload.
    pub fn object(&self, url: &str) -> Option<Bytes> {
        self.objects
            .lock()
            .expect("storage lock")
            .get(url)
            .map(|(bytes, _)| bytes.clone())
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().expect("storage lock").len()
    }
}

impl Default for MemoryObjectStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn put(
        &self,
        path: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<StorageUpload, StorageError> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let control = UploadControl::new();
        let script = *self.script.lock().expect("storage lock");
        let objects = Arc::clone(&self.objects);
        let release = Arc::clone(&self.release);
        let task_control = control.clone();
        let url = format!("memory://{path}");
        let content_type = content_type.to_string();

        tokio::spawn(async move {
            // Ten chunk boundaries; cancellation is honoured at each one.
            for step in 1..=10u8 {
                let pct = step * 10;
                if task_control.is_cancelled() {
                    let _ = tx.send(StorageEvent::Cancelled).await;
                    return;
                }
                if tx.send(StorageEvent::Progress(pct)).await.is_err() {
                    return;
                }
                if script.fail_at == Some(pct) {
                    let _ = tx
                        .send(StorageEvent::Failed(StorageError::Network(
                            "injected transfer failure".into(),
                        )))
                        .await;
                    return;
                }
                if script.hold_at == Some(pct) {
                    loop {
                        if task_control.is_cancelled() {
                            let _ = tx.send(StorageEvent::Cancelled).await;
                            return;
                        }
                        tokio::select! {
                            _ = release.notified() => break,
                            _ = tokio::time::sleep(Duration::from_millis(5)) => {}
                        }
                    }
                }
            }

            objects
                .lock()
                .expect("storage lock")
                .insert(url.clone(), (bytes, content_type));
            let _ = tx.send(StorageEvent::Completed { url }).await;
        });

        Ok(StorageUpload {
            events: rx,
            control,
        })
    }
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

/// In-memory presence channel with a last-will registry.
pub struct MemoryPresence {
    statuses: Mutex<HashMap<UserId, watch::Sender<PresenceStatus>>>,
    last_wills: Mutex<HashMap<UserId, PresenceStatus>>,
}

impl MemoryPresence {
    pub fn new() -> Self {
        Self {
            statuses: Mutex::new(HashMap::new()),
            last_wills: Mutex::new(HashMap::new()),
        }
    }

    fn sender_for(&self, user: &UserId) -> watch::Sender<PresenceStatus> {
        let mut statuses = self.statuses.lock().expect("presence lock");
        statuses
            .entry(user.clone())
            .or_insert_with(|| watch::channel(PresenceStatus::Offline).0)
            .clone()
    }

    /// Simulate the transport dropping without a clean sign-out: every
    /// registered last-will fires.
    pub fn drop_connection(&self) {
        let wills: Vec<(UserId, PresenceStatus)> = {
            let mut last_wills = self.last_wills.lock().expect("presence lock");
            last_wills.drain().collect()
        };
        for (user, status) in wills {
            self.sender_for(&user).send_replace(status);
        }
    }
}

impl Default for MemoryPresence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PresenceChannel for MemoryPresence {
    async fn publish(&self, user: &UserId, status: PresenceStatus) -> Result<(), PresenceError> {
        self.sender_for(user).send_replace(status);
        Ok(())
    }

    async fn set_last_will(
        &self,
        user: &UserId,
        status: PresenceStatus,
    ) -> Result<(), PresenceError> {
        let mut last_wills = self.last_wills.lock().expect("presence lock");
        last_wills.insert(user.clone(), status);
        Ok(())
    }

    async fn clear_last_will(&self, user: &UserId) -> Result<(), PresenceError> {
        let mut last_wills = self.last_wills.lock().expect("presence lock");
        last_wills.remove(user);
        Ok(())
    }

    fn watch(&self, user: &UserId) -> watch::Receiver<PresenceStatus> {
        self.sender_for(user).subscribe()
    }
}

// ---------------------------------------------------------------------------
// Suggestions
// ---------------------------------------------------------------------------

enum SuggestMode {
    /// Pop scripted responses; empty queue answers with no suggestions.
    Scripted(Mutex<VecDeque<Result<SuggestResponse, SuggestError>>>),
    /// Park every call until the test resolves it by arrival index.
    Manual(Mutex<Vec<Option<oneshot::Sender<SuggestResponse>>>>),
}

/// Scriptable suggestion client.
pub struct ScriptedSuggestClient {
    mode: SuggestMode,
    calls: Mutex<Vec<SuggestRequest>>,
}

impl ScriptedSuggestClient {
    /// Always answers immediately with an empty suggestion list.
    pub fn empty() -> Self {
        Self::with_responses(Vec::new())
    }

    pub fn with_responses(responses: Vec<Result<SuggestResponse, SuggestError>>) -> Self {
        Self {
            mode: SuggestMode::Scripted(Mutex::new(responses.into_iter().collect())),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Park calls until the test resolves them, allowing out-of-order
    /// completion (stale-response scenarios).
    pub fn manual() -> Self {
        Self {
            mode: SuggestMode::Manual(Mutex::new(Vec::new())),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Complete the parked call with arrival index `index`.
    pub fn resolve(&self, index: usize, response: SuggestResponse) {
        if let SuggestMode::Manual(pending) = &self.mode {
            let sender = pending
                .lock()
                .expect("suggest lock")
                .get_mut(index)
                .and_then(Option::take);
            if let Some(sender) = sender {
                let _ = sender.send(response);
            }
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("suggest lock").len()
    }

    pub fn requests(&self) -> Vec<SuggestRequest> {
        self.calls.lock().expect("suggest lock").clone()
    }
}

#[async_trait]
impl SuggestClient for ScriptedSuggestClient {
    async fn suggest(&self, request: SuggestRequest) -> Result<SuggestResponse, SuggestError> {
        self.calls.lock().expect("suggest lock").push(request);
        match &self.mode {
            SuggestMode::Scripted(responses) => responses
                .lock()
                .expect("suggest lock")
                .pop_front()
                .unwrap_or_else(|| Ok(SuggestResponse {
                    suggestions: Vec::new(),
                })),
            SuggestMode::Manual(pending) => {
                let (tx, rx) = oneshot::channel();
                pending.lock().expect("suggest lock").push(Some(tx));
                rx.await
                    .map_err(|_| SuggestError::Http("scripted call dropped".into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sign_up_then_sign_in_round_trip() {
        let auth = MemoryAuth::new();
        let created = auth
            .sign_up("Alice", "alice@example.com", "hunter2")
            .await
            .unwrap();
        assert_eq!(created.display_name, "Alice");
        assert!(created.avatar_url.is_some());

        auth.sign_out().await.unwrap();
        assert!(auth.current_user().borrow().is_none());

        let again = auth
            .sign_in("alice@example.com", "hunter2")
            .await
            .unwrap();
        assert_eq!(again.id, created.id);
        assert!(matches!(
            auth.sign_in("alice@example.com", "wrong").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn feed_delivers_initial_snapshot_then_live_appends() {
        let store = MemoryDocumentStore::new();
        let conversation = ConversationId::group("general");
        let alice = UserProfile {
            id: UserId::from("uid-alice"),
            display_name: "Alice".into(),
            email: None,
            avatar_url: None,
        };

        store
            .append_message(Message::optimistic(
                conversation.clone(),
                &alice,
                Some("first".into()),
                None,
            ))
            .await
            .unwrap();

        let mut sub = store.watch_messages(&conversation).await.unwrap();
        assert_eq!(sub.initial.len(), 1);
        assert_eq!(sub.initial[0].delivery_state, DeliveryState::Sent);
        assert!(!sub.initial[0].id.is_temp());

        store
            .append_message(Message::optimistic(
                conversation.clone(),
                &alice,
                Some("second".into()),
                None,
            ))
            .await
            .unwrap();

        match sub.events.recv().await {
            Some(FeedEvent::Added(m)) => assert_eq!(m.text.as_deref(), Some("second")),
            other => panic!("expected Added, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn detached_feed_receives_nothing_further() {
        let store = MemoryDocumentStore::new();
        let conversation = ConversationId::group("general");
        let alice = UserProfile {
            id: UserId::from("uid-alice"),
            display_name: "Alice".into(),
            email: None,
            avatar_url: None,
        };

        let sub = store.watch_messages(&conversation).await.unwrap();
        sub.detach();

        store
            .append_message(Message::optimistic(
                conversation.clone(),
                &alice,
                Some("after detach".into()),
                None,
            ))
            .await
            .unwrap();

        // The watcher list is pruned once the receiver is gone.
        let inner = store.inner.lock().unwrap();
        assert!(inner
            .watchers
            .get(&conversation)
            .map(|w| w.is_empty())
            .unwrap_or(true));
    }

    #[tokio::test]
    async fn upload_progresses_to_completion_and_stores_bytes() {
        let storage = MemoryObjectStorage::new();
        let mut upload = storage
            .put("attachments/c/1/photo.jpg", Bytes::from_static(b"jpeg"), "image/jpeg")
            .await
            .unwrap();

        let mut last = 0u8;
        let url = loop {
            match upload.events.recv().await.expect("event") {
                StorageEvent::Progress(p) => {
                    assert!(p >= last);
                    last = p;
                }
                StorageEvent::Completed { url } => break url,
                other => panic!("unexpected event {other:?}"),
            }
        };
        assert_eq!(last, 100);
        assert_eq!(storage.object(&url).unwrap(), Bytes::from_static(b"jpeg"));
    }

    #[tokio::test]
    async fn cancelled_upload_stores_nothing() {
        let storage = MemoryObjectStorage::new();
        storage.script(UploadScript {
            hold_at: Some(40),
            ..Default::default()
        });

        let mut upload = storage
            .put("attachments/c/1/doc.pdf", Bytes::from_static(b"pdf"), "application/pdf")
            .await
            .unwrap();

        while let Some(event) = upload.events.recv().await {
            match event {
                StorageEvent::Progress(40) => upload.control.cancel(),
                StorageEvent::Progress(_) => {}
                StorageEvent::Cancelled => break,
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(storage.object_count(), 0);
    }

    #[tokio::test]
    async fn connection_drop_fires_last_wills() {
        let presence = MemoryPresence::new();
        let alice = UserId::from("uid-alice");

        presence
            .set_last_will(&alice, PresenceStatus::Offline)
            .await
            .unwrap();
        presence
            .publish(&alice, PresenceStatus::Online)
            .await
            .unwrap();

        let watcher = presence.watch(&alice);
        assert_eq!(*watcher.borrow(), PresenceStatus::Online);

        presence.drop_connection();
        assert_eq!(*watcher.borrow(), PresenceStatus::Offline);
    }

    #[tokio::test]
    async fn manual_suggest_client_resolves_out_of_order() {
        let client = Arc::new(ScriptedSuggestClient::manual());
        let first = {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                client
                    .suggest(SuggestRequest { messages: vec![] })
                    .await
            })
        };
        let second = {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                client
                    .suggest(SuggestRequest { messages: vec![] })
                    .await
            })
        };

        while client.call_count() < 2 {
            tokio::task::yield_now().await;
        }

        client.resolve(
            1,
            SuggestResponse {
                suggestions: vec!["newer".into()],
            },
        );
        client.resolve(
            0,
            SuggestResponse {
                suggestions: vec!["older".into()],
            },
        );

        assert_eq!(second.await.unwrap().unwrap().suggestions, vec!["newer"]);
        assert_eq!(first.await.unwrap().unwrap().suggestions, vec!["older"]);
    }
}

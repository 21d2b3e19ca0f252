//! Live conversation sync task.
//!
//! Each subscription runs in a dedicated tokio task. External code talks
//! to it through typed command and update channels, keeping the sync
//! layer fully asynchronous and decoupled. The task is the single owner
//! of the merged view: optimistic entries enter through commands and
//! leave only through reconciliation or an explicit discard.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use ripple_backend::{DocumentStore, FeedEvent, StoreError};
use ripple_shared::constants::EVENT_CHANNEL_CAPACITY;
use ripple_shared::{ConversationId, Message, MessageId};

use crate::merge::MergeState;

/// Errors produced by the sync layer.
#[derive(Error, Debug, Clone)]
pub enum SyncError {
    #[error("Document store error: {0}")]
    Store(#[from] StoreError),

    #[error("Sync task detached")]
    Detached,
}

enum SyncCommand {
    InsertPending(Message),
    MarkFailed(MessageId),
    RestorePending(MessageId, oneshot::Sender<Option<Message>>),
    DiscardPending(MessageId),
    Detach,
}

/// One emission to the subscriber.
#[derive(Debug, Clone)]
pub enum SyncUpdate {
    /// The full reconciled message list, never a delta.
    Snapshot(Vec<Message>),
    /// The underlying feed failed; no further updates follow. Retrying
    /// (resubscribing) is the caller's decision.
    Lost(SyncError),
}

/// Command handle to a live subscription. Cheap to clone.
#[derive(Clone)]
pub struct SyncCommands {
    tx: mpsc::Sender<SyncCommand>,
}

impl SyncCommands {
    /// Overlay an optimistic send onto the merged view.
    pub async fn insert_pending(&self, message: Message) -> Result<(), SyncError> {
        self.send(SyncCommand::InsertPending(message)).await
    }

    /// Flag an optimistic send whose persistence write failed.
    pub async fn mark_failed(&self, id: MessageId) -> Result<(), SyncError> {
        self.send(SyncCommand::MarkFailed(id)).await
    }

    /// Reset a failed entry to pending, returning the message so the
    /// persistence write can be re-issued.
    pub async fn restore_pending(&self, id: MessageId) -> Result<Option<Message>, SyncError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SyncCommand::RestorePending(id, reply_tx)).await?;
        reply_rx.await.map_err(|_| SyncError::Detached)
    }

    /// Drop a failed entry from the view.
    pub async fn discard_pending(&self, id: MessageId) -> Result<(), SyncError> {
        self.send(SyncCommand::DiscardPending(id)).await
    }

    /// Stop the sync task. A hard barrier: no updates are emitted after
    /// the command is processed.
    pub async fn detach(&self) {
        let _ = self.tx.send(SyncCommand::Detach).await;
    }

    async fn send(&self, command: SyncCommand) -> Result<(), SyncError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| SyncError::Detached)
    }
}

/// Receiving half of a subscription.
pub struct SyncUpdates {
    rx: mpsc::Receiver<SyncUpdate>,
}

impl SyncUpdates {
    pub async fn recv(&mut self) -> Option<SyncUpdate> {
        self.rx.recv().await
    }
}

impl Stream for SyncUpdates {
    type Item = SyncUpdate;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Attach to a conversation's message feed.
///
/// Performs the initial bulk read, then spawns the sync task. The first
/// update is always a snapshot of the initial state.
pub async fn subscribe(
    store: Arc<dyn DocumentStore>,
    conversation: ConversationId,
) -> Result<(SyncCommands, SyncUpdates), SyncError> {
    let subscription = store.watch_messages(&conversation).await?;
    let (cmd_tx, cmd_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let (out_tx, out_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    tokio::spawn(run(conversation, subscription, cmd_rx, out_tx));

    Ok((SyncCommands { tx: cmd_tx }, SyncUpdates { rx: out_rx }))
}

async fn run(
    conversation: ConversationId,
    mut subscription: ripple_backend::FeedSubscription,
    mut commands: mpsc::Receiver<SyncCommand>,
    out: mpsc::Sender<SyncUpdate>,
) {
    let mut state = MergeState::new();
    state.seed(std::mem::take(&mut subscription.initial));
    debug!(conversation = %conversation, "sync task started");

    if emit(&out, &state).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            event = subscription.events.recv() => {
                let changed = match event {
                    Some(FeedEvent::Added(message)) => {
                        state.apply_added(message);
                        true
                    }
                    Some(FeedEvent::Modified(message)) => {
                        state.apply_modified(message);
                        true
                    }
                    Some(FeedEvent::Lost(error)) => {
                        warn!(conversation = %conversation, error = %error, "message feed lost");
                        let _ = out.send(SyncUpdate::Lost(error.into())).await;
                        break;
                    }
                    None => {
                        warn!(conversation = %conversation, "message feed closed");
                        let _ = out
                            .send(SyncUpdate::Lost(
                                StoreError::Unavailable("feed closed".into()).into(),
                            ))
                            .await;
                        break;
                    }
                };
                if changed && emit(&out, &state).await.is_err() {
                    break;
                }
            }

            command = commands.recv() => {
                match command {
                    Some(SyncCommand::InsertPending(message)) => {
                        state.insert_pending(message);
                    }
                    Some(SyncCommand::MarkFailed(id)) => {
                        if !state.mark_failed(&id) {
                            continue;
                        }
                    }
                    Some(SyncCommand::RestorePending(id, reply)) => {
                        let restored = state.restore_pending(&id);
                        let changed = restored.is_some();
                        let _ = reply.send(restored);
                        if !changed {
                            continue;
                        }
                    }
                    Some(SyncCommand::DiscardPending(id)) => {
                        if !state.discard_pending(&id) {
                            continue;
                        }
                    }
                    Some(SyncCommand::Detach) | None => {
                        debug!(conversation = %conversation, "sync task detached");
                        break;
                    }
                }
                if emit(&out, &state).await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn emit(out: &mpsc::Sender<SyncUpdate>, state: &MergeState) -> Result<(), ()> {
    out.send(SyncUpdate::Snapshot(state.snapshot()))
        .await
        .map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripple_backend::memory::MemoryDocumentStore;
    use ripple_shared::{DeliveryState, UserId, UserProfile};

    fn profile(id: &str, name: &str) -> UserProfile {
        UserProfile {
            id: UserId::from(id),
            display_name: name.into(),
            email: None,
            avatar_url: None,
        }
    }

    async fn next_snapshot(updates: &mut SyncUpdates) -> Vec<Message> {
        match updates.recv().await.expect("update") {
            SyncUpdate::Snapshot(view) => view,
            SyncUpdate::Lost(e) => panic!("unexpected feed loss: {e}"),
        }
    }

    #[tokio::test]
    async fn initial_snapshot_reflects_existing_messages() {
        let store = Arc::new(MemoryDocumentStore::new());
        let conversation = ConversationId::group("general");
        let alice = profile("uid-alice", "Alice");

        store
            .append_message(Message::optimistic(
                conversation.clone(),
                &alice,
                Some("hi".into()),
                None,
            ))
            .await
            .unwrap();

        let (_commands, mut updates) =
            subscribe(store.clone(), conversation.clone()).await.unwrap();
        let view = next_snapshot(&mut updates).await;
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].text.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn optimistic_send_appears_immediately_then_confirms() {
        let store = Arc::new(MemoryDocumentStore::new());
        let conversation = ConversationId::group("general");
        let alice = profile("uid-alice", "Alice");
        let bob = profile("uid-bob", "Bob");

        store
            .append_message(Message::optimistic(
                conversation.clone(),
                &alice,
                Some("hi".into()),
                None,
            ))
            .await
            .unwrap();

        let (commands, mut updates) =
            subscribe(store.clone(), conversation.clone()).await.unwrap();
        next_snapshot(&mut updates).await;

        let optimistic = Message::optimistic(
            conversation.clone(),
            &bob,
            Some("hello".into()),
            None,
        );
        commands.insert_pending(optimistic.clone()).await.unwrap();

        let view = next_snapshot(&mut updates).await;
        assert_eq!(view.len(), 2);
        assert_eq!(view[1].delivery_state, DeliveryState::Pending);
        assert!(view[1].id.is_temp());

        // The persistence write lands and the feed confirms it.
        store.append_message(optimistic).await.unwrap();

        let view = next_snapshot(&mut updates).await;
        assert_eq!(view.len(), 2);
        assert_eq!(view[1].delivery_state, DeliveryState::Sent);
        assert!(!view[1].id.is_temp());
    }

    #[tokio::test]
    async fn failed_send_is_marked_then_discardable() {
        let store = Arc::new(MemoryDocumentStore::new());
        let conversation = ConversationId::group("general");
        let bob = profile("uid-bob", "Bob");

        let (commands, mut updates) =
            subscribe(store.clone(), conversation.clone()).await.unwrap();
        next_snapshot(&mut updates).await;

        let optimistic =
            Message::optimistic(conversation.clone(), &bob, Some("oops".into()), None);
        let id = optimistic.id.clone();
        commands.insert_pending(optimistic).await.unwrap();
        next_snapshot(&mut updates).await;

        commands.mark_failed(id.clone()).await.unwrap();
        let view = next_snapshot(&mut updates).await;
        assert_eq!(view[0].delivery_state, DeliveryState::Failed);

        commands.discard_pending(id).await.unwrap();
        let view = next_snapshot(&mut updates).await;
        assert!(view.is_empty());
    }

    #[tokio::test]
    async fn detach_is_a_hard_barrier() {
        let store = Arc::new(MemoryDocumentStore::new());
        let conversation = ConversationId::group("general");
        let alice = profile("uid-alice", "Alice");

        let (commands, mut updates) =
            subscribe(store.clone(), conversation.clone()).await.unwrap();
        next_snapshot(&mut updates).await;

        commands.detach().await;

        // The task shuts down; the update stream ends.
        assert!(updates.recv().await.is_none());

        // Later remote activity produces no further emissions.
        store
            .append_message(Message::optimistic(
                conversation.clone(),
                &alice,
                Some("after detach".into()),
                None,
            ))
            .await
            .unwrap();
        assert!(updates.recv().await.is_none());
        assert!(matches!(
            commands.insert_pending(Message::optimistic(
                conversation,
                &alice,
                Some("too late".into()),
                None,
            ))
            .await,
            Err(SyncError::Detached)
        ));
    }

    #[tokio::test]
    async fn delivery_receipts_advance_the_rendered_state() {
        let store = Arc::new(MemoryDocumentStore::new());
        let conversation = ConversationId::group("general");
        let alice = profile("uid-alice", "Alice");

        let server_id = store
            .append_message(Message::optimistic(
                conversation.clone(),
                &alice,
                Some("hi".into()),
                None,
            ))
            .await
            .unwrap();

        let (_commands, mut updates) =
            subscribe(store.clone(), conversation.clone()).await.unwrap();
        let view = next_snapshot(&mut updates).await;
        assert_eq!(view[0].delivery_state, DeliveryState::Sent);

        store
            .emit_receipt(&conversation, &server_id, DeliveryState::Read)
            .await;
        let view = next_snapshot(&mut updates).await;
        assert_eq!(view[0].delivery_state, DeliveryState::Read);

        // A late, lower receipt never regresses the rendered state.
        store
            .emit_receipt(&conversation, &server_id, DeliveryState::Delivered)
            .await;
        let view = next_snapshot(&mut updates).await;
        assert_eq!(view[0].delivery_state, DeliveryState::Read);
    }

    #[tokio::test]
    async fn feed_loss_surfaces_an_error_and_stops() {
        let store = Arc::new(MemoryDocumentStore::new());
        let conversation = ConversationId::group("general");

        let (_commands, mut updates) =
            subscribe(store.clone(), conversation.clone()).await.unwrap();
        next_snapshot(&mut updates).await;

        store.break_feed(&conversation).await;

        match updates.recv().await {
            Some(SyncUpdate::Lost(SyncError::Store(_))) => {}
            other => panic!("expected Lost, got {other:?}"),
        }
        assert!(updates.recv().await.is_none());
    }

    #[tokio::test]
    async fn subscribe_failure_is_returned_to_the_caller() {
        let store = Arc::new(MemoryDocumentStore::new());
        store.fail_watch(true);
        let result = subscribe(store as Arc<dyn DocumentStore>, ConversationId::group("general")).await;
        assert!(matches!(result, Err(SyncError::Store(_))));
    }
}

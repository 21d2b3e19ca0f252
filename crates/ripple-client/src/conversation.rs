//! Conversation handle: send orchestration over the live sync view.
//!
//! Outgoing messages move through
//! `composing -> (awaiting-upload ->) optimistic-sent -> confirmed | failed`.
//! The optimistic copy is inserted through the sync task's command
//! channel and is only ever removed by reconciliation or an explicit
//! discard; the orchestrator never mutates the rendered list directly.

use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use ripple_backend::{Backend, DocumentStore, ObjectStorage};
use ripple_media::{start_upload_with, UploadCancel, UploadEvent, UploadTarget};
use ripple_shared::constants::EVENT_CHANNEL_CAPACITY;
use ripple_shared::{
    Conversation, ConversationId, DeliveryState, FilePayload, Message, MessageId,
};
use ripple_sync::{SyncCommands, SyncUpdate};

use crate::error::ClientError;
use crate::session::SessionContext;
use crate::suggestions::{SuggestionEngine, SuggestionState};

/// Phase of the per-message send state machine, derived from the
/// rendered entry once the message is in the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPhase {
    Composing,
    AwaitingUpload,
    OptimisticSent,
    Confirmed,
    Failed,
}

/// Map a rendered message to its send-machine phase.
pub fn phase_of(message: &Message) -> SendPhase {
    match message.delivery_state {
        DeliveryState::Pending => SendPhase::OptimisticSent,
        DeliveryState::Sent | DeliveryState::Delivered | DeliveryState::Read => {
            SendPhase::Confirmed
        }
        DeliveryState::Failed => SendPhase::Failed,
    }
}

/// How an attachment send ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent(MessageId),
    /// The upload was cancelled; no message was created and the
    /// composer is back where it started.
    UploadCancelled,
}

/// An attachment send in flight.
///
/// Cancellable until the transfer completes; afterwards cancellation is
/// a no-op and the message is already on its way.
pub struct AttachmentSend {
    cancel: UploadCancel,
    /// Latest upload progress percentage, 0-100.
    pub progress: watch::Receiver<u8>,
    /// Where the send currently is in the state machine. Cancellation
    /// lands back in `Composing`; a transfer failure in `Failed`.
    pub phase: watch::Receiver<SendPhase>,
    outcome: JoinHandle<Result<SendOutcome, ClientError>>,
}

impl AttachmentSend {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the terminal outcome.
    pub async fn outcome(self) -> Result<SendOutcome, ClientError> {
        self.outcome
            .await
            .map_err(|e| ClientError::Internal(e.to_string()))?
    }
}

/// A live, sendable view of one conversation.
pub struct ConversationHandle {
    meta: Conversation,
    session: SessionContext,
    documents: Arc<dyn DocumentStore>,
    storage: Arc<dyn ObjectStorage>,
    commands: SyncCommands,
    suggestions: Arc<SuggestionEngine>,
    /// Serialises attachment sends so attachments are delivered in the
    /// order they were sent. Plain-text sends bypass it.
    attachment_gate: Arc<Mutex<()>>,
    max_attachment_bytes: usize,
}

impl ConversationHandle {
    /// Ensure the conversation document exists, attach the sync
    /// subscription, and start relaying snapshots to the suggestion
    /// engine and the returned update stream.
    pub(crate) async fn open(
        session: SessionContext,
        backend: &Backend,
        meta: Conversation,
        max_attachment_bytes: usize,
    ) -> Result<(Self, mpsc::Receiver<SyncUpdate>), ClientError> {
        backend.documents.ensure_conversation(meta.clone()).await?;

        let (commands, mut updates) =
            ripple_sync::subscribe(backend.documents.clone(), meta.id.clone()).await?;
        let suggestions = Arc::new(SuggestionEngine::new(backend.suggest.clone(), &session));

        let (out_tx, out_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let engine = Arc::clone(&suggestions);
        tokio::spawn(async move {
            while let Some(update) = updates.recv().await {
                if let SyncUpdate::Snapshot(view) = &update {
                    engine.on_snapshot(view);
                }
                if out_tx.send(update).await.is_err() {
                    break;
                }
            }
        });

        debug!(conversation = %meta.id, "Conversation opened");
        Ok((
            Self {
                meta,
                session,
                documents: backend.documents.clone(),
                storage: backend.storage.clone(),
                commands,
                suggestions,
                attachment_gate: Arc::new(Mutex::new(())),
                max_attachment_bytes,
            },
            out_rx,
        ))
    }

    pub fn id(&self) -> &ConversationId {
        &self.meta.id
    }

    pub fn meta(&self) -> &Conversation {
        &self.meta
    }

    /// Current reply suggestions for this conversation.
    pub fn suggestions(&self) -> watch::Receiver<SuggestionState> {
        self.suggestions.subscribe()
    }

    /// Optimistic text send: the message appears in the view immediately
    /// with a temporary id, while the persistence write runs
    /// concurrently. Text sends are not serialised against each other.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<MessageId, ClientError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        let message = Message::optimistic(
            self.meta.id.clone(),
            &self.session.profile,
            Some(text),
            None,
        );
        dispatch(self.documents.clone(), self.commands.clone(), message).await
    }

    /// Send a message carrying an attachment.
    ///
    /// The send action is blocked until the upload pipeline completes;
    /// cancelling the upload returns to composing with no message
    /// created. Attachment sends for this conversation are queued behind
    /// one another.
    pub async fn send_attachment(
        &self,
        file: FilePayload,
        caption: Option<String>,
    ) -> Result<AttachmentSend, ClientError> {
        // Policy violations surface here, before anything is queued.
        ripple_media::policy::validate(&file, self.max_attachment_bytes)?;

        let cancel = UploadCancel::new();
        let (progress_tx, progress_rx) = watch::channel(0u8);
        let (phase_tx, phase_rx) = watch::channel(SendPhase::Composing);

        let gate = Arc::clone(&self.attachment_gate);
        let storage = Arc::clone(&self.storage);
        let documents = Arc::clone(&self.documents);
        let commands = self.commands.clone();
        let conversation = self.meta.id.clone();
        let profile = self.session.profile.clone();
        let max_bytes = self.max_attachment_bytes;
        let task_cancel = cancel.clone();

        let outcome = tokio::spawn(async move {
            let _gate = gate.lock().await;
            if task_cancel.is_cancelled() {
                return Ok(SendOutcome::UploadCancelled);
            }
            let _ = phase_tx.send(SendPhase::AwaitingUpload);

            let mut upload = start_upload_with(
                storage,
                UploadTarget::Conversation(conversation.clone()),
                file,
                max_bytes,
                task_cancel,
            )
            .await?;

            loop {
                match upload.next_event().await {
                    Some(UploadEvent::Progress(pct)) => {
                        let _ = progress_tx.send(pct);
                    }
                    Some(UploadEvent::Completed(attachment)) => {
                        let message = Message::optimistic(
                            conversation.clone(),
                            &profile,
                            caption.clone(),
                            Some(attachment),
                        );
                        let id = dispatch(documents, commands, message).await?;
                        let _ = phase_tx.send(SendPhase::OptimisticSent);
                        return Ok(SendOutcome::Sent(id));
                    }
                    Some(UploadEvent::Cancelled) => {
                        debug!(conversation = %conversation, "Attachment send cancelled");
                        let _ = phase_tx.send(SendPhase::Composing);
                        return Ok(SendOutcome::UploadCancelled);
                    }
                    Some(UploadEvent::Failed(error)) => {
                        warn!(conversation = %conversation, error = %error, "Attachment upload failed");
                        let _ = phase_tx.send(SendPhase::Failed);
                        return Err(error.into());
                    }
                    None => {
                        return Err(ClientError::Internal(
                            "upload ended without a terminal event".into(),
                        ));
                    }
                }
            }
        });

        Ok(AttachmentSend {
            cancel,
            progress: progress_rx,
            phase: phase_rx,
            outcome,
        })
    }

    /// Re-issue the persistence write for a failed send.
    pub async fn retry(&self, id: &MessageId) -> Result<(), ClientError> {
        match self.commands.restore_pending(id.clone()).await? {
            Some(message) => {
                spawn_write(self.documents.clone(), self.commands.clone(), message);
                Ok(())
            }
            None => Err(ClientError::UnknownMessage(id.clone())),
        }
    }

    /// Drop a failed send from the view for good.
    pub async fn discard(&self, id: &MessageId) -> Result<(), ClientError> {
        self.commands.discard_pending(id.clone()).await?;
        Ok(())
    }

    /// Stop the sync subscription. A hard barrier: the update stream
    /// ends and nothing is emitted afterwards.
    pub async fn detach(&self) {
        self.commands.detach().await;
    }
}

/// Insert the optimistic copy, then issue the persistence write
/// concurrently. A write failure flags the entry as failed; the view
/// keeps it so the user can retry or discard explicitly.
async fn dispatch(
    documents: Arc<dyn DocumentStore>,
    commands: SyncCommands,
    message: Message,
) -> Result<MessageId, ClientError> {
    let temp_id = message.id.clone();
    commands.insert_pending(message.clone()).await?;
    spawn_write(documents, commands, message);
    Ok(temp_id)
}

fn spawn_write(documents: Arc<dyn DocumentStore>, commands: SyncCommands, message: Message) {
    let temp_id = message.id.clone();
    tokio::spawn(async move {
        match documents.append_message(message).await {
            Ok(server_id) => {
                debug!(temp = %temp_id, id = %server_id, "Message persisted");
            }
            Err(error) => {
                warn!(temp = %temp_id, error = %error, "Persistence write failed");
                let _ = commands.mark_failed(temp_id).await;
            }
        }
    });
}

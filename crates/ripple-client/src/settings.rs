//! Notification settings, persisted per user in the document store.

use ripple_shared::{ConversationId, NotificationSettings};

use crate::error::ClientError;
use crate::RippleClient;

impl RippleClient {
    /// The session's notification settings; defaults when none are saved.
    pub async fn notification_settings(&self) -> Result<NotificationSettings, ClientError> {
        Ok(self
            .backend()
            .documents
            .load_settings(self.session().user_id())
            .await?
            .unwrap_or_default())
    }

    /// Load, mutate and persist the notification settings in one step.
    pub async fn update_notification_settings<F>(
        &self,
        update: F,
    ) -> Result<NotificationSettings, ClientError>
    where
        F: FnOnce(&mut NotificationSettings),
    {
        let mut settings = self.notification_settings().await?;
        update(&mut settings);
        self.backend()
            .documents
            .save_settings(self.session().user_id(), &settings)
            .await?;
        Ok(settings)
    }

    /// Mute or unmute a single conversation.
    pub async fn set_conversation_muted(
        &self,
        conversation: &ConversationId,
        muted: bool,
    ) -> Result<NotificationSettings, ClientError> {
        self.update_notification_settings(|settings| {
            if muted {
                if !settings.muted_conversations.contains(conversation) {
                    settings.muted_conversations.push(conversation.clone());
                }
            } else {
                settings.muted_conversations.retain(|c| c != conversation);
            }
        })
        .await
    }
}

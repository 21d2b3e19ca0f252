//! Stories: media posts that expire after a fixed TTL.
//!
//! Posting reuses the attachment upload pipeline under a per-user
//! `stories/` prefix, then records the story document.

use chrono::{Duration, Utc};
use tracing::info;
use uuid::Uuid;

use ripple_media::{start_upload, UploadTarget};
use ripple_shared::constants::STORY_TTL_HOURS;
use ripple_shared::{FilePayload, Story};

use crate::error::ClientError;
use crate::RippleClient;

impl RippleClient {
    /// Post a story. Guests are rejected before any remote call.
    pub async fn post_story(&self, file: FilePayload) -> Result<Story, ClientError> {
        if self.session().is_guest() {
            return Err(ClientError::GuestNotAllowed("post stories"));
        }

        let task = start_upload(
            self.backend().storage.clone(),
            UploadTarget::Story(self.session().user_id().clone()),
            file,
            self.config().max_attachment_bytes,
        )
        .await?;

        // Nothing holds the cancel handle here, so the only terminal
        // states are completion and failure.
        let attachment = task.finish().await?.ok_or_else(|| {
            ClientError::Internal("story upload ended without completing".into())
        })?;

        let profile = &self.session().profile;
        let story = Story {
            id: format!("s-{}", Uuid::new_v4()),
            user_id: profile.id.clone(),
            user_name: profile.display_name.clone(),
            user_avatar: profile.avatar_url.clone(),
            media_url: attachment.url,
            media_type: attachment.mime_type,
            timestamp: Utc::now(),
        };
        self.backend().documents.append_story(story.clone()).await?;

        info!(story = %story.id, user = %story.user_id, "Story posted");
        Ok(story)
    }

    /// Stories still inside the TTL window, newest first.
    pub async fn recent_stories(&self) -> Result<Vec<Story>, ClientError> {
        let cutoff = Utc::now() - Duration::hours(STORY_TTL_HOURS);
        Ok(self.backend().documents.stories_since(cutoff).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClientConfig;
    use bytes::Bytes;
    use ripple_backend::Backend;
    use ripple_shared::constants::MAX_IMAGE_WIDTH;

    fn oversized_png() -> FilePayload {
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            2 * MAX_IMAGE_WIDTH,
            400,
            image::Rgb([7, 8, 9]),
        ));
        let mut out = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        FilePayload {
            bytes: out.into(),
            file_name: "sunset.png".into(),
            mime_type: "image/png".into(),
        }
    }

    #[tokio::test]
    async fn posted_story_shows_up_in_recent_stories() {
        let backend = Backend::in_memory();
        let client = RippleClient::sign_up(
            backend,
            ClientConfig::default(),
            "Alice",
            "alice@example.com",
            "hunter2",
        )
        .await
        .unwrap();

        let story = client.post_story(oversized_png()).await.unwrap();
        assert!(story.media_url.contains("stories/"));
        // Oversized story media goes through the same resample step.
        assert_eq!(story.media_type, "image/jpeg");

        let recent = client.recent_stories().await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, story.id);
        assert_eq!(recent[0].user_name, "Alice");
    }

    #[tokio::test]
    async fn guests_cannot_post_stories() {
        let backend = Backend::in_memory();
        let client = RippleClient::guest(backend.clone(), ClientConfig::default(), None)
            .await
            .unwrap();

        let result = client
            .post_story(FilePayload {
                bytes: Bytes::from_static(b"x"),
                file_name: "x.png".into(),
                mime_type: "image/png".into(),
            })
            .await;
        assert!(matches!(result, Err(ClientError::GuestNotAllowed(_))));

        // Rejected before any remote call: nothing was uploaded.
        let stories = client.recent_stories().await.unwrap();
        assert!(stories.is_empty());
    }

    #[tokio::test]
    async fn disallowed_story_media_is_rejected() {
        let backend = Backend::in_memory();
        let client = RippleClient::sign_up(
            backend,
            ClientConfig::default(),
            "Alice",
            "alice@example.com",
            "hunter2",
        )
        .await
        .unwrap();

        let result = client
            .post_story(FilePayload {
                bytes: Bytes::from_static(b"#!/bin/sh"),
                file_name: "run.sh".into(),
                mime_type: "application/x-sh".into(),
            })
            .await;
        assert!(matches!(
            result,
            Err(ClientError::Media(ripple_media::MediaError::UnsupportedType(_)))
        ));
    }
}

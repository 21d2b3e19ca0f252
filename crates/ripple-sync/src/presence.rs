//! Presence tracking over the hosted presence channel.
//!
//! Presence is strictly best-effort: channel failures are logged and
//! swallowed, and watchers keep observing the last-known value.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use ripple_backend::PresenceChannel;
use ripple_shared::{PresenceStatus, UserId};

pub struct PresenceTracker {
    channel: Arc<dyn PresenceChannel>,
    user: UserId,
}

impl PresenceTracker {
    /// Connect the session to the presence channel: register the offline
    /// last-will first, then go online. If the channel is unreachable the
    /// session continues without live presence.
    pub async fn announce(channel: Arc<dyn PresenceChannel>, user: UserId) -> Self {
        if let Err(e) = channel.set_last_will(&user, PresenceStatus::Offline).await {
            warn!(user = %user, error = %e, "Failed to register presence last-will");
        }
        if let Err(e) = channel.publish(&user, PresenceStatus::Online).await {
            warn!(user = %user, error = %e, "Failed to publish online status");
        }
        debug!(user = %user, "Presence announced");
        Self { channel, user }
    }

    /// Publish a manual status change (away / do-not-disturb).
    pub async fn set_status(&self, status: PresenceStatus) {
        if let Err(e) = self.channel.publish(&self.user, status).await {
            warn!(user = %self.user, error = %e, "Failed to publish presence status");
        }
    }

    /// Subscribe to another identity's status: an initial value, then a
    /// live stream of changes.
    pub fn watch(&self, other: &UserId) -> watch::Receiver<PresenceStatus> {
        self.channel.watch(other)
    }

    /// Clean sign-out: publish offline before detaching, then clear the
    /// last-will so it cannot fire afterwards.
    pub async fn sign_out(self) {
        if let Err(e) = self
            .channel
            .publish(&self.user, PresenceStatus::Offline)
            .await
        {
            warn!(user = %self.user, error = %e, "Failed to publish offline status");
        }
        if let Err(e) = self.channel.clear_last_will(&self.user).await {
            warn!(user = %self.user, error = %e, "Failed to clear presence last-will");
        }
        debug!(user = %self.user, "Presence signed out");
    }
}

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;

use ripple_shared::{PresenceStatus, UserId};

/// Errors produced by the presence channel.
#[derive(Error, Debug, Clone)]
pub enum PresenceError {
    #[error("Presence channel unreachable: {0}")]
    Unreachable(String),
}

/// Contract of the hosted realtime presence channel.
///
/// Status propagation is push-driven; there is no polling. When the
/// channel degrades, watchers keep observing the last-known value with
/// no error raised.
#[async_trait]
pub trait PresenceChannel: Send + Sync {
    /// Publish `status` for `user`.
    async fn publish(&self, user: &UserId, status: PresenceStatus) -> Result<(), PresenceError>;

    /// Register a status update that fires automatically if the
    /// connection drops without a clean sign-out.
    async fn set_last_will(
        &self,
        user: &UserId,
        status: PresenceStatus,
    ) -> Result<(), PresenceError>;

    /// Clear the registered last-will (clean sign-out path).
    async fn clear_last_will(&self, user: &UserId) -> Result<(), PresenceError>;

    /// Subscribe to another identity's status: an initial value, then a
    /// live stream of changes.
    fn watch(&self, user: &UserId) -> watch::Receiver<PresenceStatus>;
}

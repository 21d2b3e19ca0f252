use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;

use ripple_shared::UserProfile;

/// Errors produced by the auth provider.
#[derive(Error, Debug, Clone)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("An account already exists for {0}")]
    EmailInUse(String),

    #[error("No user is signed in")]
    NotSignedIn,

    #[error("Auth service unavailable: {0}")]
    Unavailable(String),
}

/// Contract of the hosted auth provider.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<UserProfile, AuthError>;

    async fn sign_up(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<UserProfile, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Subscribe to the current identity: an initial value, then a live
    /// stream of changes. Emits `None` after sign-out.
    fn current_user(&self) -> watch::Receiver<Option<UserProfile>>;
}

//! Explicit session context, injected into every component at
//! construction instead of living in ambient global state.

use uuid::Uuid;

use ripple_shared::{UserId, UserProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Registered,
    Guest,
}

/// The signed-in (or guest) identity for the lifetime of a client.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub profile: UserProfile,
    pub kind: SessionKind,
}

impl SessionContext {
    pub fn registered(profile: UserProfile) -> Self {
        Self {
            profile,
            kind: SessionKind::Registered,
        }
    }

    /// A local-only guest identity. Guests can read and write
    /// conversations but never trigger reply suggestions or post stories.
    pub fn guest(display_name: &str) -> Self {
        Self {
            profile: UserProfile {
                id: UserId(format!("guest-{}", Uuid::new_v4())),
                display_name: display_name.to_string(),
                email: None,
                avatar_url: None,
            },
            kind: SessionKind::Guest,
        }
    }

    pub fn is_guest(&self) -> bool {
        self.kind == SessionKind::Guest
    }

    pub fn user_id(&self) -> &UserId {
        &self.profile.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guest_sessions_get_a_unique_local_id() {
        let one = SessionContext::guest("Visitor");
        let two = SessionContext::guest("Visitor");
        assert!(one.is_guest());
        assert_ne!(one.user_id(), two.user_id());
        assert!(one.user_id().as_str().starts_with("guest-"));
    }
}

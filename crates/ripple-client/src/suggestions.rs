//! Reply suggestion engine.
//!
//! Fires after the message list changes, only when the most recent
//! message came from someone else and the session is not a guest (a
//! privacy/cost boundary, not a technical one). Requests are never
//! cancelled; instead a monotonic token makes the latest request win and
//! stale responses are discarded. Failures are non-fatal and yield an
//! empty suggestion list.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use ripple_backend::{SuggestClient, SuggestMessage, SuggestRequest};
use ripple_shared::constants::{MAX_SUGGESTIONS, SUGGESTION_WINDOW};
use ripple_shared::{Message, UserId};

use crate::session::SessionContext;

/// What the UI renders next to the composer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuggestionState {
    pub loading: bool,
    pub suggestions: Vec<String>,
}

pub struct SuggestionEngine {
    api: Arc<dyn SuggestClient>,
    local_user: UserId,
    guest: bool,
    latest_token: Arc<AtomicU64>,
    state: Arc<watch::Sender<SuggestionState>>,
}

impl SuggestionEngine {
    pub fn new(api: Arc<dyn SuggestClient>, session: &SessionContext) -> Self {
        let (state, _) = watch::channel(SuggestionState::default());
        Self {
            api,
            local_user: session.user_id().clone(),
            guest: session.is_guest(),
            latest_token: Arc::new(AtomicU64::new(0)),
            state: Arc::new(state),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SuggestionState> {
        self.state.subscribe()
    }

    /// Feed the engine the full message list after every change.
    ///
    /// Whatever was showing is invalidated immediately; a new request is
    /// issued only when the trigger precondition holds.
    pub fn on_snapshot(&self, messages: &[Message]) {
        self.state.send_replace(SuggestionState::default());

        let last = match messages.last() {
            Some(last) => last,
            None => return,
        };
        if last.sender_id == self.local_user {
            return;
        }
        if self.guest {
            // Policy skip, not an error.
            debug!("Guest session, skipping reply suggestions");
            return;
        }

        let token = self.latest_token.fetch_add(1, Ordering::SeqCst) + 1;
        let start = messages.len().saturating_sub(SUGGESTION_WINDOW);
        let window: Vec<SuggestMessage> = messages[start..]
            .iter()
            .map(|m| SuggestMessage {
                sender: m
                    .sender_name
                    .clone()
                    .unwrap_or_else(|| "Unknown".to_string()),
                text: m.text.clone().unwrap_or_default(),
            })
            .collect();

        self.state.send_replace(SuggestionState {
            loading: true,
            suggestions: Vec::new(),
        });

        let api = Arc::clone(&self.api);
        let latest_token = Arc::clone(&self.latest_token);
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let result = api.suggest(SuggestRequest { messages: window }).await;

            // Last request wins: a response for a superseded token is
            // dropped on the floor.
            if latest_token.load(Ordering::SeqCst) != token {
                debug!(token, "Stale suggestion response discarded");
                return;
            }

            let suggestions = match result {
                Ok(response) => response
                    .suggestions
                    .into_iter()
                    .take(MAX_SUGGESTIONS)
                    .collect(),
                Err(error) => {
                    warn!(error = %error, "Reply suggestion request failed");
                    Vec::new()
                }
            };
            state.send_replace(SuggestionState {
                loading: false,
                suggestions,
            });
        });
    }
}

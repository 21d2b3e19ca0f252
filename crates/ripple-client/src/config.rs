//! Client configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the client can start with zero
//! configuration against the in-memory backend.

use ripple_shared::constants::MAX_ATTACHMENT_SIZE;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// URL of the hosted reply-suggestion endpoint.
    /// Env: `RIPPLE_SUGGEST_URL`
    /// Default: none (the backend's suggestion client decides).
    pub suggest_url: Option<String>,

    /// Maximum attachment size in bytes.
    /// Env: `RIPPLE_MAX_ATTACHMENT_BYTES`
    /// Default: 50 MiB.
    pub max_attachment_bytes: usize,

    /// Display name used for guest sessions when none is given.
    /// Env: `RIPPLE_GUEST_NAME`
    /// Default: `"Guest"`.
    pub guest_display_name: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            suggest_url: None,
            max_attachment_bytes: MAX_ATTACHMENT_SIZE,
            guest_display_name: "Guest".to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("RIPPLE_SUGGEST_URL") {
            if !url.is_empty() {
                config.suggest_url = Some(url);
            }
        }

        if let Ok(val) = std::env::var("RIPPLE_MAX_ATTACHMENT_BYTES") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_attachment_bytes = n,
                _ => {
                    tracing::warn!(
                        value = %val,
                        "Invalid RIPPLE_MAX_ATTACHMENT_BYTES, using default"
                    );
                }
            }
        }

        if let Ok(name) = std::env::var("RIPPLE_GUEST_NAME") {
            if !name.is_empty() {
                config.guest_display_name = name;
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable_without_configuration() {
        let config = ClientConfig::default();
        assert_eq!(config.max_attachment_bytes, MAX_ATTACHMENT_SIZE);
        assert_eq!(config.guest_display_name, "Guest");
        assert!(config.suggest_url.is_none());
    }
}

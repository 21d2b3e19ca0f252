//! Client for the hosted reply-suggestion model endpoint.
//!
//! The endpoint is a plain JSON request/response call: the trailing
//! window of a conversation in, a short list of candidate replies out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by the suggestion endpoint.
#[derive(Error, Debug)]
pub enum SuggestError {
    #[error("Suggestion request failed: {0}")]
    Http(String),

    #[error("Malformed suggestion response: {0}")]
    BadResponse(String),
}

/// One message of the conversation window, reduced to what the model sees.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuggestMessage {
    pub sender: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestRequest {
    /// Trailing messages, oldest first.
    pub messages: Vec<SuggestMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestResponse {
    pub suggestions: Vec<String>,
}

#[async_trait]
pub trait SuggestClient: Send + Sync {
    async fn suggest(&self, request: SuggestRequest) -> Result<SuggestResponse, SuggestError>;
}

/// HTTP implementation posting JSON to a hosted endpoint.
pub struct HttpSuggestClient {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpSuggestClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl SuggestClient for HttpSuggestClient {
    async fn suggest(&self, request: SuggestRequest) -> Result<SuggestResponse, SuggestError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| SuggestError::Http(e.to_string()))?
            .error_for_status()
            .map_err(|e| SuggestError::Http(e.to_string()))?;

        response
            .json::<SuggestResponse>()
            .await
            .map_err(|e| SuggestError::BadResponse(e.to_string()))
    }
}

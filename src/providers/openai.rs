//! OpenAI-compatible chat-completion client.
//!
//! Implements [`ChatModel`] against `POST {base_url}/v1/chat/completions`.
//! A single call, no retry: wrap it in an
//! [`UpstreamClient`](super::retry::UpstreamClient) for that.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::traits::ChatModel;
use crate::types::ChatRequest;
use crate::{MimirError, Result};

/// Default base URL for the OpenAI API
const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Chat models the client accepts.
pub const SUPPORTED_CHAT_MODELS: &[&str] = &[
    "gpt-4",
    "gpt-4-0314",
    "gpt-4-32k",
    "gpt-4-32k-0314",
    "gpt-3.5-turbo",
    "gpt-3.5-turbo-0301",
];

/// Default upstream model.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";

/// Fail at setup time when `model` is not a supported chat model.
pub fn validate_chat_model(model: &str) -> Result<()> {
    if SUPPORTED_CHAT_MODELS.contains(&model) {
        Ok(())
    } else {
        Err(MimirError::UnsupportedModel(model.to_string()))
    }
}

/// Client for the OpenAI chat-completions endpoint.
#[derive(Clone)]
pub struct OpenAiChatClient {
    api_key: String,
    http: Client,
    base_url: String,
}

impl OpenAiChatClient {
    /// Create a client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Create a client with a custom base URL (for testing with wiremock, or
    /// any OpenAI-compatible server).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(MimirError::Configuration(
                "OpenAI API key is empty".to_string(),
            ));
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| MimirError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_key,
            http,
            base_url: base_url.into(),
        })
    }

    async fn error_for_status(response: reqwest::Response, model: &str) -> MimirError {
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs);
        let message = response
            .json::<ErrorBody>()
            .await
            .map(|body| body.error.message)
            .unwrap_or_else(|_| format!("OpenAI API error: {status}"));

        match status {
            401 | 403 => MimirError::AuthenticationFailed,
            404 => MimirError::UnsupportedModel(model.to_string()),
            429 => MimirError::RateLimited { retry_after },
            _ => MimirError::Api { status, message },
        }
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

#[async_trait]
impl ChatModel for OpenAiChatClient {
    fn name(&self) -> &str {
        "openai"
    }

    fn validate_model(&self, model: &str) -> Result<()> {
        validate_chat_model(model)
    }

    async fn chat(&self, request: &ChatRequest) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_for_status(response, &request.model).await);
        }

        let body: ChatCompletionResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(MimirError::EmptyResponse)
    }
}

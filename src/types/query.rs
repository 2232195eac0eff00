//! Cache queries and the chat requests derived from them.

use serde::{Deserialize, Serialize};

use super::message::Message;
use crate::{MimirError, Result};

/// System prompt used when a query does not carry its own.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant that accomplishes user tasks.";

/// Separator between task and context in the composite embedding text.
const COMPOSITE_SEPARATOR: &str = "\n\n";

/// A single question for the semantic cache.
///
/// `query_text` is the task, `context_text` the material the task is about.
/// Both feed the composite embedding; `system_prompt` only shapes the
/// upstream request and never influences cache lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheQuery {
    pub query_text: String,
    pub context_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl CacheQuery {
    /// Create a query without a system prompt.
    pub fn new(query_text: impl Into<String>, context_text: impl Into<String>) -> Self {
        Self {
            query_text: query_text.into(),
            context_text: context_text.into(),
            system_prompt: None,
        }
    }

    /// Set the system prompt sent upstream.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Reject queries with an empty task or context.
    pub fn validate(&self) -> Result<()> {
        if self.query_text.trim().is_empty() {
            return Err(MimirError::InvalidInput("query text is empty".into()));
        }
        if self.context_text.trim().is_empty() {
            return Err(MimirError::InvalidInput("context text is empty".into()));
        }
        Ok(())
    }

    /// Text embedded as the cache lookup key surrogate.
    pub fn composite_text(&self) -> String {
        format!(
            "{}{COMPOSITE_SEPARATOR}{}",
            self.query_text.trim(),
            self.context_text.trim()
        )
    }

    /// Ordered messages for the upstream model.
    pub fn to_messages(&self) -> Vec<Message> {
        vec![
            Message::system(
                self.system_prompt
                    .as_deref()
                    .unwrap_or(DEFAULT_SYSTEM_PROMPT),
            ),
            Message::user(format!("Here is some context : {}", self.context_text)),
            Message::user(format!("Complete the following task: {}", self.query_text)),
        ]
    }
}

/// Upstream chat-completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub temperature: f32,
    pub messages: Vec<Message>,
}

impl ChatRequest {
    /// Build the request for `query` against `model`.
    pub fn for_query(query: &CacheQuery, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            model: model.into(),
            temperature,
            messages: query.to_messages(),
        }
    }
}

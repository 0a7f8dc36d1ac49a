//! LLM Provider Abstraction Layer
//!
//! This module provides a common interface for the hosted chat models Parley
//! talks to (Mistral and Google Gemini). The `LLMProvider` trait is the one
//! seam between the conversation loop, the insight analyzer and the wire
//! adapters, so the loop never knows which provider it is driving.
//!
//! Three call shapes are supported:
//! - `complete`: one request, one full reply text
//! - `stream`: one request, a lazy sequence of reply fragments
//! - `extract`: one request constrained by an explicit [`OutputSchema`],
//!   returning the provider's JSON object

use async_trait::async_trait;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;

pub mod gemini;
pub mod mistral;
pub mod sse;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Lazy, finite, non-restartable sequence of reply fragments.
///
/// Fragments may be empty; consumers treat an empty fragment as a no-op.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Response did not match schema '{schema}': {detail}")]
    SchemaMismatch { schema: String, detail: String },
}

impl LLMError {
    /// Map a transport error from reqwest onto the provider error space.
    pub(crate) fn from_transport(provider: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LLMError::Timeout
        } else if err.is_connect() {
            LLMError::ProviderUnavailable(format!("Cannot connect to {}: {}", provider, err))
        } else {
            LLMError::NetworkError(err.to_string())
        }
    }

    /// Map a non-success HTTP status onto the provider error space.
    pub(crate) fn from_status(provider: &str, status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            401 | 403 => LLMError::AuthenticationFailed(body),
            429 => LLMError::RateLimitExceeded,
            400 | 404 | 422 => LLMError::InvalidRequest(body),
            _ => LLMError::ProviderUnavailable(format!(
                "{} API error ({}): {}",
                provider, status, body
            )),
        }
    }
}

/// Message in a conversation history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Role of the message sender (system, user, assistant)
    pub role: MessageRole,

    /// Content of the message
    pub content: String,
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System message
    System,

    /// User message
    User,

    /// Assistant message
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// Explicit description of a structured output the provider must produce.
///
/// The schema is plain JSON Schema. Adapters translate it into whatever
/// their API expects, so domain types never carry provider binding logic.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    /// Short identifier sent to providers that name their schemas
    pub name: String,

    /// JSON Schema of the expected object
    pub schema: serde_json::Value,
}

impl OutputSchema {
    pub fn new(name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }

    /// Top-level property names listed as required.
    pub fn required_fields(&self) -> Vec<&str> {
        self.schema
            .get("required")
            .and_then(|r| r.as_array())
            .map(|fields| fields.iter().filter_map(|f| f.as_str()).collect())
            .unwrap_or_default()
    }

    /// Check that `value` is an object carrying every required field.
    ///
    /// This is the only validation applied on top of what the provider's
    /// structured-output mode guarantees.
    pub fn check(&self, value: &serde_json::Value) -> Result<()> {
        let object = value.as_object().ok_or_else(|| LLMError::SchemaMismatch {
            schema: self.name.clone(),
            detail: "expected a JSON object".to_string(),
        })?;

        let missing: Vec<&str> = self
            .required_fields()
            .into_iter()
            .filter(|field| !object.contains_key(*field))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(LLMError::SchemaMismatch {
                schema: self.name.clone(),
                detail: format!("missing fields: {}", missing.join(", ")),
            })
        }
    }
}

/// LLM Provider trait that all providers must implement
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Returns the name of the provider (e.g., "mistral", "gemini")
    fn name(&self) -> &str;

    /// Returns the model identifier requests are sent to
    fn model(&self) -> &str;

    /// Generate one complete reply for the conversation so far.
    async fn complete(&self, messages: &[Message]) -> Result<String>;

    /// Generate a reply delivered as incremental fragments.
    async fn stream(&self, messages: &[Message]) -> Result<TextStream>;

    /// Generate a JSON object constrained by `schema`.
    ///
    /// Fails the whole call if the provider cannot produce a conforming
    /// object. No partial result is returned.
    async fn extract(
        &self,
        messages: &[Message],
        schema: &OutputSchema,
    ) -> Result<serde_json::Value>;
}

/// Parse a structured-output reply body into a JSON value and check it.
pub(crate) fn parse_structured(text: &str, schema: &OutputSchema) -> Result<serde_json::Value> {
    let trimmed = text.trim();
    let body = extract_fenced_json(trimmed).unwrap_or(trimmed);

    let value: serde_json::Value =
        serde_json::from_str(body.trim()).map_err(|e| LLMError::SchemaMismatch {
            schema: schema.name.clone(),
            detail: format!("reply is not JSON: {}", e),
        })?;

    schema.check(&value)?;
    Ok(value)
}

/// Extract the body of the first markdown code fence in the text.
///
/// Some models wrap JSON mode replies in a fence even when asked not to.
fn extract_fenced_json(content: &str) -> Option<&str> {
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // Skip the language tag line (e.g. "json\n")
    let body_start_rel = after_opening.find('\n')? + 1;
    let body_start = fence_start + 3 + body_start_rel;

    let closing = content[body_start..].find("```")?;
    let body_end = body_start + closing;

    if body_start >= body_end {
        return None;
    }

    Some(&content[body_start..body_end])
}

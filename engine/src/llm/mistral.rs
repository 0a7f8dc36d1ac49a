//! Mistral LLM Provider
//!
//! Implements the LLMProvider trait against Mistral's chat completions API
//! (`POST {base_url}/chat/completions`). The API is OpenAI-compatible:
//! - bearer token authentication
//! - `stream: true` switches the reply to server-sent events terminated by
//!   `data: [DONE]`
//! - `response_format: {"type": "json_schema", ...}` constrains the reply to
//!   a JSON object for structured extraction

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;

use super::sse;
use super::{
    parse_structured, LLMError, LLMProvider, Message, OutputSchema, Result, TextStream,
};
use crate::config::MistralConfig;
use crate::secrets::SecretString;

pub struct MistralProvider {
    config: MistralConfig,
    api_key: SecretString,
    client: Client,
}

impl MistralProvider {
    pub fn new(config: MistralConfig, api_key: SecretString) -> Self {
        Self {
            config,
            api_key,
            client: Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn request(&self, payload: &serde_json::Value) -> RequestBuilder {
        self.client
            .post(self.endpoint())
            .bearer_auth(self.api_key.unsecure())
            .header("Content-Type", "application/json")
            .json(payload)
    }

    async fn post(&self, payload: &serde_json::Value) -> Result<reqwest::Response> {
        let response = self
            .request(payload)
            .send()
            .await
            .map_err(|e| LLMError::from_transport("mistral", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LLMError::from_status("mistral", status, text));
        }

        Ok(response)
    }

    fn payload(&self, messages: &[Message]) -> serde_json::Value {
        json!({
            "model": self.config.model,
            "messages": messages,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletion {
    fn into_text(self) -> Result<String> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LLMError::ParseError("No choices in response".to_string()))?;

        choice
            .message
            .content
            .ok_or_else(|| LLMError::ParseError("Empty content".to_string()))
    }
}

/// One `data:` payload of a streamed completion.
#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Decode a streamed payload into its text fragment.
///
/// A chunk without content (role announcements, the final `finish_reason`
/// chunk) yields an empty fragment.
fn decode_chunk(payload: &str) -> Result<String> {
    let chunk: CompletionChunk = serde_json::from_str(payload)
        .map_err(|e| LLMError::ParseError(format!("Failed to parse stream event: {}", e)))?;

    let text = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .unwrap_or_default();

    Ok(text)
}

#[async_trait]
impl LLMProvider for MistralProvider {
    fn name(&self) -> &str {
        "mistral"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, messages: &[Message]) -> Result<String> {
        tracing::debug!(
            "Mistral request: model={}, messages={}",
            self.config.model,
            messages.len()
        );

        let start = std::time::Instant::now();
        let response = self.post(&self.payload(messages)).await?;

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        tracing::info!(
            "Mistral response received in {:.1}s",
            start.elapsed().as_secs_f64()
        );

        completion.into_text()
    }

    async fn stream(&self, messages: &[Message]) -> Result<TextStream> {
        let mut payload = self.payload(messages);
        payload["stream"] = json!(true);

        tracing::debug!(
            "Mistral stream request: model={}, messages={}",
            self.config.model,
            messages.len()
        );

        let source = sse::open("mistral", self.request(&payload)).await?;
        let stream = sse::data_events("mistral", source)
            .map(|payload| payload.and_then(|data| decode_chunk(&data)));

        Ok(Box::pin(stream))
    }

    async fn extract(
        &self,
        messages: &[Message],
        schema: &OutputSchema,
    ) -> Result<serde_json::Value> {
        let mut payload = self.payload(messages);
        payload["response_format"] = json!({
            "type": "json_schema",
            "json_schema": {
                "name": schema.name,
                "schema": schema.schema,
                "strict": true,
            }
        });

        tracing::debug!(
            "Mistral extraction request: model={}, schema={}",
            self.config.model,
            schema.name
        );

        let response = self.post(&payload).await?;
        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        parse_structured(&completion.into_text()?, schema)
    }
}

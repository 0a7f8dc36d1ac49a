use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;

use super::sse;
use super::{
    parse_structured, LLMError, LLMProvider, Message, MessageRole, OutputSchema, Result,
    TextStream,
};
use crate::config::GeminiConfig;
use crate::secrets::SecretString;

/// JSON Schema keywords the Gemini `responseSchema` dialect rejects.
const UNSUPPORTED_SCHEMA_KEYS: &[&str] = &["additionalProperties", "$schema", "title"];

pub struct GeminiProvider {
    config: GeminiConfig,
    api_key: SecretString,
    client: Client,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig, api_key: SecretString) -> Self {
        Self {
            config,
            api_key,
            client: Client::new(),
        }
    }

    fn url(&self, method: &str) -> String {
        format!(
            "{}/models/{}:{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.model,
            method
        )
    }

    /// Build the request body. System messages become `systemInstruction`,
    /// assistant turns are sent with Gemini's `model` role.
    fn payload(&self, messages: &[Message]) -> serde_json::Map<String, serde_json::Value> {
        let mut contents = Vec::new();
        let mut system_parts = Vec::new();

        for msg in messages {
            if msg.role == MessageRole::System {
                system_parts.push(msg.content.as_str());
                continue;
            }

            contents.push(json!({
                "role": if msg.role == MessageRole::Assistant { "model" } else { "user" },
                "parts": [{"text": msg.content}]
            }));
        }

        let mut payload = serde_json::Map::new();
        payload.insert("contents".to_string(), json!(contents));

        if !system_parts.is_empty() {
            payload.insert(
                "systemInstruction".to_string(),
                json!({"parts": [{"text": system_parts.join("\n\n")}]}),
            );
        }

        payload
    }

    fn request(
        &self,
        url: &str,
        payload: &serde_json::Map<String, serde_json::Value>,
    ) -> RequestBuilder {
        self.client
            .post(url)
            .header("x-goog-api-key", self.api_key.unsecure())
            .header("Content-Type", "application/json")
            .json(payload)
    }

    async fn post(
        &self,
        url: &str,
        payload: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<reqwest::Response> {
        let response = self
            .request(url, payload)
            .send()
            .await
            .map_err(|e| LLMError::from_transport("gemini", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LLMError::from_status("gemini", status, text));
        }

        Ok(response)
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate, if there is one.
    fn first_candidate_text(self) -> Option<String> {
        let candidate = self.candidates.into_iter().next()?;
        let parts = candidate.content.map(|c| c.parts).unwrap_or_default();

        Some(parts.into_iter().filter_map(|p| p.text).collect())
    }

    fn into_text(self) -> Result<String> {
        self.first_candidate_text()
            .ok_or_else(|| LLMError::ParseError("No candidates in response".to_string()))
    }
}

fn decode_event(payload: &str) -> Result<String> {
    let event: GenerateContentResponse = serde_json::from_str(payload)
        .map_err(|e| LLMError::ParseError(format!("Failed to parse stream event: {}", e)))?;

    Ok(event.first_candidate_text().unwrap_or_default())
}

/// Rewrite a JSON Schema into the subset accepted by `responseSchema`.
fn to_response_schema(schema: &serde_json::Value) -> serde_json::Value {
    match schema {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .filter(|(key, _)| !UNSUPPORTED_SCHEMA_KEYS.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), to_response_schema(value)))
                .collect(),
        ),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(to_response_schema).collect())
        }
        other => other.clone(),
    }
}

#[async_trait]
impl LLMProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, messages: &[Message]) -> Result<String> {
        tracing::debug!(
            "Gemini request: model={}, messages={}",
            self.config.model,
            messages.len()
        );

        let response = self
            .post(&self.url("generateContent"), &self.payload(messages))
            .await?;

        let data: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        data.into_text()
    }

    async fn stream(&self, messages: &[Message]) -> Result<TextStream> {
        let url = format!("{}?alt=sse", self.url("streamGenerateContent"));
        let source = sse::open("gemini", self.request(&url, &self.payload(messages))).await?;
        let stream = sse::data_events("gemini", source)
            .map(|payload| payload.and_then(|data| decode_event(&data)));

        Ok(Box::pin(stream))
    }

    async fn extract(
        &self,
        messages: &[Message],
        schema: &OutputSchema,
    ) -> Result<serde_json::Value> {
        let mut payload = self.payload(messages);
        payload.insert(
            "generationConfig".to_string(),
            json!({
                "responseMimeType": "application/json",
                "responseSchema": to_response_schema(&schema.schema),
            }),
        );

        let response = self
            .post(&self.url("generateContent"), &payload)
            .await?;

        let data: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        parse_structured(&data.into_text()?, schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> GeminiProvider {
        GeminiProvider::new(GeminiConfig::default(), SecretString::new("test-key"))
    }

    #[test]
    fn test_payload_maps_roles() {
        let payload = provider().payload(&[
            Message::system("Translate the following text from English to Hindi:"),
            Message::user("hi!"),
            Message::assistant("नमस्ते!"),
        ]);

        let contents = payload["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(
            payload["systemInstruction"]["parts"][0]["text"],
            "Translate the following text from English to Hindi:"
        );
    }

    #[test]
    fn test_payload_without_system_message() {
        let payload = provider().payload(&[Message::user("describe the best thing about bhopal")]);
        assert!(!payload.contains_key("systemInstruction"));
    }

    #[test]
    fn test_response_schema_strips_unsupported_keys() {
        let schema = json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "nested": {"type": "object", "additionalProperties": false, "properties": {}}
            },
            "required": ["nested"]
        });

        let converted = to_response_schema(&schema);
        assert!(converted.get("additionalProperties").is_none());
        assert!(converted["properties"]["nested"]
            .get("additionalProperties")
            .is_none());
        assert_eq!(converted["required"], json!(["nested"]));
    }

    #[test]
    fn test_decode_event_joins_parts() {
        let payload = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Bho"},{"text":"pal"}]}}]}"#;
        assert_eq!(decode_event(payload).unwrap(), "Bhopal");
    }

    #[test]
    fn test_decode_event_without_candidates_is_empty() {
        let payload = r#"{"usageMetadata":{"promptTokenCount":4}}"#;
        assert_eq!(decode_event(payload).unwrap(), "");
    }

    #[test]
    fn test_url_layout() {
        assert_eq!(
            provider().url("generateContent"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }
}

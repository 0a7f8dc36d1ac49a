//! Insight extraction
//!
//! Asks a provider to read a piece of text and fill a fixed-shape record:
//! sentiment, aggressiveness and a handful of named entities. The record's
//! JSON Schema is declared here once as an [`OutputSchema`]; the provider
//! adapters decide how to bind it to their API, and [`Insight::from_structured`]
//! maps the provider's JSON back onto the domain type.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

use crate::llm::{LLMError, LLMProvider, OutputSchema};
use crate::prompt::extraction_messages;

/// Name the schema is registered under with providers.
pub const INSIGHT_SCHEMA_NAME: &str = "Insight";

/// Overall mood of the analyzed text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Happy,
    Sad,
    Neutral,
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mood::Happy => write!(f, "happy"),
            Mood::Sad => write!(f, "sad"),
            Mood::Neutral => write!(f, "neutral"),
        }
    }
}

/// What the provider extracted from one input text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Insight {
    pub sentiment: Mood,
    /// 1 (calm) to 10 (hostile)
    pub aggressiveness: u8,
    pub language: String,
    pub person: String,
    pub date: String,
    pub location: String,
    pub organization: String,
}

/// The provider's JSON reply before it is checked.
#[derive(Debug, Deserialize)]
struct InsightReply {
    sentiment: Mood,
    aggressiveness: f64,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    person: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    organization: Option<String>,
}

/// JSON Schema of the record the provider must return.
pub fn insight_schema() -> OutputSchema {
    let text = |description: &str| json!({"type": "string", "description": description});

    OutputSchema::new(
        INSIGHT_SCHEMA_NAME,
        json!({
            "type": "object",
            "properties": {
                "sentiment": {
                    "type": "string",
                    "enum": ["happy", "sad", "neutral"],
                    "description": "Mood of the text"
                },
                "aggressiveness": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 10,
                    "description": "Aggressiveness level (1-10)"
                },
                "language": text("Language the text is written in"),
                "person": text("Person mentioned in the text"),
                "date": text("Date mentioned in the text"),
                "location": text("Location mentioned in the text"),
                "organization": text("Organization mentioned in the text")
            },
            "required": [
                "sentiment",
                "aggressiveness",
                "language",
                "person",
                "date",
                "location",
                "organization"
            ],
            "additionalProperties": false
        }),
    )
}

impl Insight {
    /// Map the provider's JSON object onto an `Insight`.
    ///
    /// Null entity fields become empty strings. The sentiment must be one of
    /// the three moods and aggressiveness a whole number in 1..=10.
    pub fn from_structured(value: serde_json::Value) -> Result<Self, LLMError> {
        let mismatch = |detail: String| LLMError::SchemaMismatch {
            schema: INSIGHT_SCHEMA_NAME.to_string(),
            detail,
        };

        let reply: InsightReply =
            serde_json::from_value(value).map_err(|e| mismatch(e.to_string()))?;

        let level = reply.aggressiveness;
        if level.fract() != 0.0 || !(1.0..=10.0).contains(&level) {
            return Err(mismatch(format!(
                "aggressiveness must be a whole number from 1 to 10, got {}",
                level
            )));
        }

        Ok(Self {
            sentiment: reply.sentiment,
            aggressiveness: level as u8,
            language: reply.language.unwrap_or_default(),
            person: reply.person.unwrap_or_default(),
            date: reply.date.unwrap_or_default(),
            location: reply.location.unwrap_or_default(),
            organization: reply.organization.unwrap_or_default(),
        })
    }

    /// Field labels and values in display order.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Sentiment", self.sentiment.to_string()),
            ("Aggressiveness", self.aggressiveness.to_string()),
            ("Language", self.language.clone()),
            ("Person", self.person.clone()),
            ("Date", self.date.clone()),
            ("Location", self.location.clone()),
            ("Organization", self.organization.clone()),
        ]
    }

    /// `Label: value` lines, one per field.
    pub fn render(&self) -> String {
        self.fields()
            .into_iter()
            .map(|(label, value)| format!("{}: {}", label, value))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Runs insight extraction against one provider.
pub struct Analyzer<'a> {
    provider: &'a dyn LLMProvider,
    schema: OutputSchema,
}

impl<'a> Analyzer<'a> {
    pub fn new(provider: &'a dyn LLMProvider) -> Self {
        Self {
            provider,
            schema: insight_schema(),
        }
    }

    /// Extract an insight from `text`.
    ///
    /// # Errors
    /// Any provider failure or non-conforming reply fails the whole call.
    pub async fn analyze(&self, text: &str) -> Result<Insight, LLMError> {
        tracing::debug!(
            "Extracting insight with {} ({} chars)",
            self.provider.name(),
            text.len()
        );

        let value = self
            .provider
            .extract(&extraction_messages(text), &self.schema)
            .await?;

        Insight::from_structured(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply() -> serde_json::Value {
        json!({
            "sentiment": "sad",
            "aggressiveness": 8,
            "language": "English",
            "person": "",
            "date": "",
            "location": "",
            "organization": ""
        })
    }

    #[test]
    fn test_schema_requires_every_field() {
        let schema = insight_schema();
        assert_eq!(schema.name, "Insight");
        assert_eq!(schema.required_fields().len(), 7);
        assert!(schema.check(&reply()).is_ok());
    }

    #[test]
    fn test_from_structured() {
        let insight = Insight::from_structured(reply()).unwrap();
        assert_eq!(insight.sentiment, Mood::Sad);
        assert_eq!(insight.aggressiveness, 8);
        assert_eq!(insight.language, "English");
    }

    #[test]
    fn test_from_structured_accepts_whole_float_and_nulls() {
        let mut value = reply();
        value["aggressiveness"] = json!(3.0);
        value["person"] = serde_json::Value::Null;

        let insight = Insight::from_structured(value).unwrap();
        assert_eq!(insight.aggressiveness, 3);
        assert_eq!(insight.person, "");
    }

    #[test]
    fn test_from_structured_rejects_out_of_range() {
        for bad in [json!(0), json!(11), json!(4.5), json!(-2)] {
            let mut value = reply();
            value["aggressiveness"] = bad;
            assert!(matches!(
                Insight::from_structured(value),
                Err(LLMError::SchemaMismatch { .. })
            ));
        }
    }

    #[test]
    fn test_from_structured_rejects_unknown_mood() {
        let mut value = reply();
        value["sentiment"] = json!("furious");
        assert!(Insight::from_structured(value).is_err());
    }

    #[test]
    fn test_render_in_field_order() {
        let insight = Insight {
            sentiment: Mood::Happy,
            aggressiveness: 1,
            language: "English".to_string(),
            person: "Ada".to_string(),
            date: "1843".to_string(),
            location: "London".to_string(),
            organization: "Royal Society".to_string(),
        };

        assert_eq!(
            insight.render(),
            "Sentiment: happy\nAggressiveness: 1\nLanguage: English\nPerson: Ada\nDate: 1843\nLocation: London\nOrganization: Royal Society"
        );
    }
}

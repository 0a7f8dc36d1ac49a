//! Profile context loading
//!
//! Reads a fixed projection of every profile document in one collection and
//! renders it into the text block that grounds the conversation. Loading
//! fails soft: an empty collection or any read error yields a fixed
//! placeholder sentence instead of an error, so the caller always gets
//! something to put in the system message.

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::FindOptions;
use mongodb::Client;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};

use crate::config::StoreConfig;

/// Returned when the collection holds no profiles.
pub const NO_PROFILES_FOUND: &str = "No profile data was found.";

/// Returned when the profiles could not be read.
pub const PROFILE_LOAD_FAILED: &str = "There was an issue retrieving profile data.";

/// Heading placed above the rendered profile lines.
pub const CONTEXT_HEADER: &str = "Below are user profiles with key attributes:";

const MISSING_FIELD: &str = "N/A";
const MISSING_CITY: &str = "Unknown";

/// Location part of a profile document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

/// The projected fields of one profile document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub area_of_expertise: Option<String>,
    pub current_location: Option<Location>,
}

impl ProfileRecord {
    /// Build a record from a raw document.
    ///
    /// Field values that are not strings are rendered with their BSON text
    /// form; nulls count as missing. A `currentLocation` that is not an
    /// embedded document is treated as absent.
    pub fn from_document(document: &Document) -> Self {
        let current_location = match document.get("currentLocation") {
            Some(Bson::Document(location)) => Some(Location {
                city: field_text(location, "city"),
                state: field_text(location, "state"),
                country: field_text(location, "country"),
            }),
            _ => None,
        };

        Self {
            first_name: field_text(document, "firstName"),
            last_name: field_text(document, "lastName"),
            area_of_expertise: field_text(document, "areaOfExpertise"),
            current_location,
        }
    }

    /// One summary line, without numbering or trailing newline.
    pub fn summary(&self) -> String {
        let location = self.current_location.as_ref();
        let city = location
            .and_then(|l| l.city.as_deref())
            .unwrap_or(MISSING_CITY);
        let state = location.and_then(|l| l.state.as_deref()).unwrap_or("");
        let country = location.and_then(|l| l.country.as_deref()).unwrap_or("");

        format!(
            "Name: {} {}, Expertise: {}, Location: {}, {}, {}",
            self.first_name.as_deref().unwrap_or(MISSING_FIELD),
            self.last_name.as_deref().unwrap_or(MISSING_FIELD),
            self.area_of_expertise.as_deref().unwrap_or(MISSING_FIELD),
            city,
            state,
            country
        )
    }
}

fn field_text(document: &Document, key: &str) -> Option<String> {
    match document.get(key)? {
        Bson::Null | Bson::Undefined => None,
        Bson::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Render one numbered line per record, in input order, trimmed of
/// trailing whitespace.
pub fn render_profiles(profiles: &[ProfileRecord]) -> String {
    let mut rendered = String::new();
    for (idx, profile) in profiles.iter().enumerate() {
        rendered.push_str(&format!("{}. {}\n", idx + 1, profile.summary()));
    }
    rendered.trim_end().to_string()
}

/// Context text plus the number of profiles it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileContext {
    pub text: String,
    pub profile_count: usize,
}

impl ProfileContext {
    fn placeholder(text: &str) -> Self {
        Self {
            text: text.to_string(),
            profile_count: 0,
        }
    }

    /// True when the text is one of the fallback sentences.
    pub fn is_placeholder(&self) -> bool {
        self.text == NO_PROFILES_FOUND || self.text == PROFILE_LOAD_FAILED
    }
}

/// Somewhere profiles can be read from.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// Human-readable location used in log lines (never includes credentials)
    fn describe(&self) -> String;

    /// Read every profile, in the order the store returns them.
    async fn fetch_profiles(&self) -> Result<Vec<ProfileRecord>, EngineError>;
}

/// Load and render the profile context.
///
/// Never fails: an empty source yields [`NO_PROFILES_FOUND`], a failing one
/// [`PROFILE_LOAD_FAILED`].
pub async fn load_profile_context(source: &dyn ProfileSource) -> ProfileContext {
    match source.fetch_profiles().await {
        Ok(profiles) if profiles.is_empty() => {
            tracing::info!("No profiles found in {}", source.describe());
            ProfileContext::placeholder(NO_PROFILES_FOUND)
        }
        Ok(profiles) => {
            tracing::info!(
                "Loaded {} profiles from {}",
                profiles.len(),
                source.describe()
            );
            ProfileContext {
                text: format!("{}\n\n{}", CONTEXT_HEADER, render_profiles(&profiles)),
                profile_count: profiles.len(),
            }
        }
        Err(e) => {
            tracing::error!(
                "Error loading profile context from {}: {}",
                source.describe(),
                crate::secrets::scrub(&e.to_string())
            );
            ProfileContext::placeholder(PROFILE_LOAD_FAILED)
        }
    }
}

/// Profiles stored in a MongoDB collection.
///
/// A client is opened for each read and dropped when the read finishes.
pub struct MongoProfileSource {
    uri: String,
    database: String,
    collection: String,
}

impl MongoProfileSource {
    pub fn new(
        uri: impl Into<String>,
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            database: database.into(),
            collection: collection.into(),
        }
    }

    /// Build a source from the `[store]` section.
    ///
    /// # Errors
    /// Returns `EngineError::MissingCredential` when no URI is configured.
    pub fn from_config(store: &StoreConfig) -> Result<Self, EngineError> {
        let uri = store
            .uri
            .clone()
            .ok_or_else(|| EngineError::MissingCredential(crate::config::ENV_MONGO_URI.to_string()))?;

        Ok(Self::new(uri, store.database.clone(), store.collection.clone()))
    }

    fn projection() -> Document {
        doc! {
            "firstName": 1,
            "lastName": 1,
            "areaOfExpertise": 1,
            "currentLocation": 1,
            "_id": 0,
        }
    }
}

#[async_trait]
impl ProfileSource for MongoProfileSource {
    fn describe(&self) -> String {
        format!("{}.{}", self.database, self.collection)
    }

    async fn fetch_profiles(&self) -> Result<Vec<ProfileRecord>, EngineError> {
        let client = Client::with_uri_str(&self.uri)
            .await
            .map_err(|e| EngineError::Database(format!("Failed to connect: {}", e)))?;

        let collection = client
            .database(&self.database)
            .collection::<Document>(&self.collection);

        let options = FindOptions::builder()
            .projection(Self::projection())
            .build();

        let cursor = collection
            .find(doc! {}, options)
            .await
            .map_err(|e| EngineError::Database(format!("Query failed: {}", e)))?;

        let documents: Vec<Document> = cursor
            .try_collect()
            .await
            .map_err(|e| EngineError::Database(format!("Failed to read results: {}", e)))?;

        Ok(documents.iter().map(ProfileRecord::from_document).collect())
    }
}

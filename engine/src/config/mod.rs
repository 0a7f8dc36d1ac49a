//! Configuration management
//!
//! This module handles loading, validation, and environment overrides of the
//! Parley configuration. An optional TOML file is read from
//! ~/.parley/config.toml (or a path given with `--config`); a missing file
//! means built-in defaults.
//!
//! # Configuration Sections
//!
//! - **core**: log level, streaming preference, greeting name
//! - **llm**: default provider and per-provider endpoint/model
//! - **store**: document store URI, database and collection
//!
//! # Environment Overrides
//!
//! After the file is parsed, `MONGO_URI`, `DATABASE` and `COLLECTION` replace
//! the corresponding `[store]` values when set. API keys are never read from
//! or written to the config file; see [`crate::secrets`].
//!
//! # Examples
//!
//! ```no_run
//! use parley_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_default()?;
//! println!("Default provider: {}", config.llm.default_provider);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable holding the document store connection string
pub const ENV_MONGO_URI: &str = "MONGO_URI";

/// Environment variable holding the database name
pub const ENV_DATABASE: &str = "DATABASE";

/// Environment variable holding the collection name
pub const ENV_COLLECTION: &str = "COLLECTION";

/// Providers a session can be pointed at
pub const VALID_PROVIDERS: [&str; 2] = ["mistral", "gemini"];

const VALID_LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    #[serde(default)]
    pub core: CoreConfig,

    /// LLM provider configuration
    #[serde(default)]
    pub llm: LLMConfig,

    /// Document store configuration
    #[serde(default)]
    pub store: StoreConfig,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Stream chat replies fragment by fragment
    #[serde(default = "default_true")]
    pub stream: bool,

    /// Name used in the chat greeting
    #[serde(default)]
    pub user_name: Option<String>,
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Default LLM provider (mistral, gemini)
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Mistral provider settings
    #[serde(default)]
    pub mistral: MistralConfig,

    /// Gemini provider settings
    #[serde(default)]
    pub gemini: GeminiConfig,
}

/// Mistral provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MistralConfig {
    /// Base URL for the Mistral API
    #[serde(default = "default_mistral_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_mistral_model")]
    pub model: String,
    // Note: API key comes from the environment, not from config
}

/// Gemini provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Base URL for the Gemini API
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_gemini_model")]
    pub model: String,
    // Note: API key comes from the environment, not from config
}

/// Document store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Connection string (usually supplied through MONGO_URI)
    #[serde(default)]
    pub uri: Option<String>,

    /// Database name
    #[serde(default = "default_database")]
    pub database: String,

    /// Collection holding profile documents
    #[serde(default = "default_collection")]
    pub collection: String,
}

// Default value functions
fn default_log_level() -> String {
    "warn".to_string()
}

fn default_true() -> bool {
    true
}

fn default_provider() -> String {
    "mistral".to_string()
}

fn default_mistral_base_url() -> String {
    "https://api.mistral.ai/v1".to_string()
}

fn default_mistral_model() -> String {
    "mistral-large-latest".to_string()
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_database() -> String {
    "app-dev".to_string()
}

fn default_collection() -> String {
    "profiles".to_string()
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            stream: true,
            user_name: None,
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            mistral: MistralConfig::default(),
            gemini: GeminiConfig::default(),
        }
    }
}

impl Default for MistralConfig {
    fn default() -> Self {
        Self {
            base_url: default_mistral_base_url(),
            model: default_mistral_model(),
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: default_gemini_base_url(),
            model: default_gemini_model(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: None,
            database: default_database(),
            collection: default_collection(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.parley/config.toml)
    ///
    /// Falls back to defaults when the file does not exist. Environment
    /// overrides are applied and the result is validated.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails (unknown provider or log level, empty names)
    pub fn load_or_default() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path();
        Self::load_optional(config_path.as_deref(), |key| std::env::var(key).ok())
    }

    /// Load from `path` when it names an existing file, otherwise start from
    /// defaults. Overrides come from `lookup` in both cases.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed, or if
    /// validation fails.
    pub fn load_optional<F>(path: Option<&Path>, lookup: F) -> Result<Self, EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) if path.exists() => Self::from_toml(&Self::read_file(path)?)?,
            Some(_) => Self::default(),
            None => {
                tracing::debug!("No home directory, using the default configuration");
                Self::default()
            }
        };

        config.apply_env_overrides(lookup);
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let mut config = Self::from_toml(&Self::read_file(path)?)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from a TOML string without touching the environment
    pub fn from_toml(contents: &str) -> Result<Self, EngineError> {
        toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Replace `[store]` values with environment variables that are set.
    ///
    /// Empty values are ignored so a blank `DATABASE=` line in a `.env`
    /// file does not erase the default.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(uri) = get(ENV_MONGO_URI) {
            self.store.uri = Some(uri);
        }
        if let Some(database) = get(ENV_DATABASE) {
            self.store.database = database;
        }
        if let Some(collection) = get(ENV_COLLECTION) {
            self.store.collection = collection;
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Config` naming the first invalid field.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !VALID_LOG_LEVELS.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        if !VALID_PROVIDERS.contains(&self.llm.default_provider.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid default provider '{}'. Must be one of: {}",
                self.llm.default_provider,
                VALID_PROVIDERS.join(", ")
            )));
        }

        if self.llm.mistral.model.trim().is_empty() || self.llm.gemini.model.trim().is_empty() {
            return Err(EngineError::Config("Model names must not be empty".to_string()));
        }

        if self.store.database.trim().is_empty() || self.store.collection.trim().is_empty() {
            return Err(EngineError::Config(
                "store.database and store.collection must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    fn read_file(path: &Path) -> Result<String, EngineError> {
        fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))
    }

    /// Get the default configuration file path (~/.parley/config.toml)
    fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".parley").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config_creation() {
        let config = Config::default();

        assert_eq!(config.core.log_level, "warn");
        assert!(config.core.stream);
        assert_eq!(config.llm.default_provider, "mistral");
        assert_eq!(config.llm.mistral.model, "mistral-large-latest");
        assert_eq!(config.store.database, "app-dev");
        assert_eq!(config.store.collection, "profiles");
        assert!(config.store.uri.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.llm.gemini.model, "gemini-2.0-flash");
        assert_eq!(config.llm.mistral.base_url, "https://api.mistral.ai/v1");
    }

    #[test]
    fn test_env_overrides_store() {
        let mut config = Config::default();
        config.apply_env_overrides(env(&[
            ("MONGO_URI", "mongodb://localhost:27017"),
            ("DATABASE", "crm"),
            ("COLLECTION", "people"),
        ]));

        assert_eq!(config.store.uri.as_deref(), Some("mongodb://localhost:27017"));
        assert_eq!(config.store.database, "crm");
        assert_eq!(config.store.collection, "people");
    }

    #[test]
    fn test_blank_env_values_are_ignored() {
        let mut config = Config::default();
        config.apply_env_overrides(env(&[("DATABASE", "  "), ("MONGO_URI", "")]));

        assert_eq!(config.store.database, "app-dev");
        assert!(config.store.uri.is_none());
    }

    #[test]
    fn test_no_home_directory_uses_defaults_with_overrides() {
        let config = Config::load_optional(None, env(&[("DATABASE", "crm")])).unwrap();

        assert_eq!(config.llm.default_provider, "mistral");
        assert_eq!(config.store.database, "crm");
        assert_eq!(config.store.collection, "profiles");
    }

    #[test]
    fn test_missing_default_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::load_optional(Some(&path), env(&[])).unwrap();
        assert_eq!(config.store.database, "app-dev");
        assert!(config.store.uri.is_none());
    }

    #[test]
    fn test_existing_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[llm]\ndefault_provider = \"gemini\"\n").unwrap();

        let config = Config::load_optional(Some(&path), env(&[])).unwrap();
        assert_eq!(config.llm.default_provider, "gemini");
    }

    #[test]
    fn test_invalid_provider_rejected() {
        let mut config = Config::default();
        config.llm.default_provider = "openai".to_string();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid default provider"));
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let mut config = Config::default();
        config.core.log_level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_string = toml::to_string(&config).unwrap();

        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(config.core.log_level, deserialized.core.log_level);
        assert_eq!(
            config.llm.default_provider,
            deserialized.llm.default_provider
        );
    }
}

//! Error types and handling
//!
//! This module provides the error types shared by the Parley engine and its
//! binary. All errors implement the `ErrorExt` trait which provides
//! user-friendly hints and indicates whether errors are recoverable.
//!
//! # Security
//!
//! Error messages never carry raw credentials. Callers that surface provider
//! or database messages to the terminal pass them through the engine's
//! scrubber first.

use thiserror::Error;

/// Trait for Parley error extensions
///
/// Adds a user-facing hint and a recoverability flag to every engine error.
pub trait ErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors end the current operation only. A non-recoverable
    /// error ends the process.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: invalid config file, unknown provider or log level
/// - **Credentials**: a required API key or connection string is absent
/// - **Database**: document store connection or query failures
/// - **LLM Provider**: API failures surfaced outside the conversation loop
/// - **Extraction**: the provider did not return a conforming record
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, ErrorExt};
///
/// let error = EngineError::MissingCredential("MISTRAL_API_KEY".to_string());
/// assert!(!error.is_recoverable());
///
/// let db_error = EngineError::Database("server selection timeout".to_string());
/// assert!(db_error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required credential: {0}")]
    MissingCredential(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(String),

    // LLM provider errors
    #[error("LLM provider error: {0}")]
    LLMProvider(String),

    #[error("Extraction failed: {0}")]
    Extraction(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::MissingCredential(_) => "Set the variable in your environment or a .env file",
            Self::Database(_) => "Check MONGO_URI and that the database is reachable",
            Self::LLMProvider(_) => "LLM provider unavailable. Check your API key and network",
            Self::Extraction(_) => "The model did not return a complete record. Try again",
            Self::Io(_) => "Terminal input or output failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Config(_) | Self::MissingCredential(_))
    }
}

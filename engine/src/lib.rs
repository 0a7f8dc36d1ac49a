//! Parley Engine Library
//!
//! This library provides the core functionality of Parley: profile context
//! loading, prompt building, the provider adapters, the conversation loop and
//! insight extraction. It is used by both the `parley` binary and the
//! integration tests.

/// Configuration management module
pub mod config;

/// Credential resolution and redaction
pub mod secrets;

/// LLM provider abstraction layer
pub mod llm;

/// Profile context loading
pub mod context;

/// Prompt templates
pub mod prompt;

/// Conversation loop
pub mod chat;

/// Structured insight extraction
pub mod insight;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers
pub mod handlers;

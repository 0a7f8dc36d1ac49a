//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - chat: interactive conversation with profile context
//! - extract: structured insight from one piece of text
//! - ask: one question, one answer

use anyhow::{Context, Result};
use serde_json::json;
use std::io::{self, BufRead, Write};

use crate::chat::{run_repl, ChatSession, Conversation};
use crate::config::Config;
use crate::context::{load_profile_context, MongoProfileSource};
use crate::insight::Analyzer;
use crate::llm::gemini::GeminiProvider;
use crate::llm::mistral::MistralProvider;
use crate::llm::LLMProvider;
use crate::prompt::{ask_messages, context_system_message, greeting};
use crate::secrets::{
    scrub, Credential, SecretManager, SecretString, GEMINI_API_KEY, MISTRAL_API_KEY,
};
use sdk::errors::EngineError;

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Options for the chat command
#[derive(Debug, Clone, Copy)]
pub struct ChatOptions {
    pub stream: bool,
    pub load_context: bool,
}

/// Build the provider named by `--provider`, or the configured default.
///
/// # Errors
/// `EngineError::MissingCredential` when the provider's API key cannot be
/// resolved, `EngineError::Config` for an unknown provider name.
pub fn build_provider(
    config: &Config,
    requested: Option<&str>,
    secrets: &SecretManager,
) -> Result<Box<dyn LLMProvider>, EngineError> {
    build_provider_with(config, requested, |credential| secrets.get_secret(credential))
}

/// Build a provider, resolving its API key through `resolve`.
pub fn build_provider_with<F>(
    config: &Config,
    requested: Option<&str>,
    resolve: F,
) -> Result<Box<dyn LLMProvider>, EngineError>
where
    F: Fn(&Credential) -> Result<SecretString, EngineError>,
{
    let name = requested.unwrap_or(config.llm.default_provider.as_str());

    let provider: Box<dyn LLMProvider> = match name {
        "mistral" => {
            let api_key = resolve(&MISTRAL_API_KEY)?;
            Box::new(MistralProvider::new(config.llm.mistral.clone(), api_key))
        }
        "gemini" => {
            let api_key = resolve(&GEMINI_API_KEY)?;
            Box::new(GeminiProvider::new(config.llm.gemini.clone(), api_key))
        }
        other => {
            return Err(EngineError::Config(format!(
                "Unknown provider '{}'. Must be one of: mistral, gemini",
                other
            )))
        }
    };

    tracing::info!("Using {} ({})", provider.name(), provider.model());
    Ok(provider)
}

/// Run an interactive chat on stdin/stdout.
///
/// Profiles are loaded once before the first prompt. A store that cannot be
/// read yields a placeholder context, never an error.
pub async fn handle_chat(
    config: &Config,
    provider: Box<dyn LLMProvider>,
    options: ChatOptions,
) -> Result<()> {
    let history = if options.load_context {
        let source = MongoProfileSource::from_config(&config.store)?;
        let context = load_profile_context(&source).await;
        println!("Loaded {} profiles", context.profile_count);
        Conversation::with_system(context_system_message(&context))
    } else {
        tracing::info!("Chat started without profile context");
        Conversation::new()
    };

    println!("{}", greeting(config.core.user_name.as_deref()));

    let mut session = ChatSession::new(provider, history, options.stream);
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    run_repl(&mut session, stdin.lock(), &mut stdout)
        .await
        .context("Terminal I/O failed")?;

    Ok(())
}

/// Extract an insight from `text`, or from stdin when no text was given.
pub async fn handle_extract(
    provider: &dyn LLMProvider,
    text: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let text = match text {
        Some(text) => text,
        None => read_input("Enter the text to analyze: ")?,
    };

    if text.trim().is_empty() {
        anyhow::bail!("Nothing to analyze: input text is empty");
    }

    let insight = Analyzer::new(provider)
        .analyze(&text)
        .await
        .map_err(|e| EngineError::Extraction(scrub(&e.to_string())))?;

    match format {
        OutputFormat::Text => println!("{}", insight.render()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&insight)?),
    }

    Ok(())
}

/// Send one prompt with an optional system instruction and print the reply.
pub async fn handle_ask(
    provider: &dyn LLMProvider,
    prompt: &str,
    system: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let messages = ask_messages(system, prompt);

    let reply = provider
        .complete(&messages)
        .await
        .map_err(|e| EngineError::LLMProvider(scrub(&e.to_string())))?;

    match format {
        OutputFormat::Text => println!("{}", reply),
        OutputFormat::Json => {
            let output = json!({
                "provider": provider.name(),
                "model": provider.model(),
                "prompt": prompt,
                "reply": reply,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Print a prompt and read one line from stdin.
fn read_input(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read input")?;

    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

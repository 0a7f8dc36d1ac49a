// Parley
// Main entry point for the parley binary

use clap::Parser;
use parley_engine::cli::{Cli, Command};
use parley_engine::config::Config;
use parley_engine::handlers::{
    build_provider, handle_ask, handle_chat, handle_extract, ChatOptions, OutputFormat,
};
use parley_engine::secrets::SecretManager;
use parley_engine::telemetry::init_telemetry_with_level;
use sdk::errors::{EngineError, ErrorExt};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Variables from .env become visible to the config and secrets layers
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load_or_default(),
    }
    .unwrap_or_else(|e| exit_with(&e));

    init_telemetry_with_level(cli.log.as_deref().unwrap_or(config.core.log_level.as_str()));

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::info!("Parley v{} ({} - {})", version, commit, timestamp);

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let secrets = SecretManager::from_terminal();
    let provider = build_provider(&config, cli.provider.as_deref(), &secrets)
        .unwrap_or_else(|e| exit_with(&e));

    let result = match cli.selected_command() {
        Command::Chat {
            no_stream,
            no_context,
        } => {
            let options = ChatOptions {
                stream: config.core.stream && !no_stream,
                load_context: !no_context,
            };
            handle_chat(&config, provider, options).await
        }

        Command::Extract { text } => handle_extract(provider.as_ref(), text, format).await,

        Command::Ask { prompt, system } => {
            handle_ask(provider.as_ref(), &prompt, system.as_deref(), format).await
        }
    };

    if let Err(e) = &result {
        if let Some(engine_error) = e.downcast_ref::<EngineError>() {
            if !engine_error.is_recoverable() {
                exit_with(engine_error);
            }
        }
    }

    result
}

/// Report a fatal configuration problem once and exit with status 1.
fn exit_with(error: &EngineError) -> ! {
    tracing::error!("{}", error);
    eprintln!("Error: {}", error);
    eprintln!("Hint: {}", error.user_hint());
    std::process::exit(1);
}

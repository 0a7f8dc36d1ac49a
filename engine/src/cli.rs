//! CLI interface for Parley
//!
//! This module provides the command-line interface using clap's derive API.
//! Running `parley` with no command starts an interactive chat.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parley: chat with a hosted model about the people in your profile store
///
/// Loads profile records from a document store, hands them to Mistral or
/// Gemini as context, and chats in the terminal. Can also extract a
/// structured insight from a piece of text.
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Provider to use instead of llm.default_provider
    #[arg(long, global = true, value_name = "NAME", value_parser = ["mistral", "gemini"])]
    pub provider: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// The command to run; chat when none was given.
    pub fn selected_command(&self) -> Command {
        self.command.clone().unwrap_or_default()
    }
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Chat interactively with profile context (default)
    Chat {
        /// Print each reply only once it is complete
        #[arg(long)]
        no_stream: bool,

        /// Skip loading profiles from the document store
        #[arg(long)]
        no_context: bool,
    },

    /// Extract sentiment, aggressiveness and entities from text
    Extract {
        /// Text to analyze (read from stdin when omitted)
        text: Option<String>,
    },

    /// Ask a single question and print the answer
    Ask {
        /// The question or text to send
        prompt: String,

        /// Instruction sent as a system message
        #[arg(short, long)]
        system: Option<String>,
    },
}

impl Default for Command {
    fn default() -> Self {
        Command::Chat {
            no_stream: false,
            no_context: false,
        }
    }
}

//! Conversation loop
//!
//! A [`ChatSession`] owns one provider and the ordered message history of a
//! single interactive session. Each turn appends the user message, asks the
//! provider for a reply (streamed or whole), and appends the reply only when
//! it completed. A failed turn leaves the user message in place and nothing
//! else, so history always reflects completed exchanges plus unanswered
//! questions.

use futures::StreamExt;
use std::io::{self, BufRead, Write};

use crate::llm::{LLMError, LLMProvider, Message};
use crate::secrets::scrub;

/// Label printed in front of the user's input.
pub const USER_PROMPT: &str = "You: ";

/// Label printed in front of each reply.
pub const ASSISTANT_LABEL: &str = "buddy: ";

/// Returns true when `input` ends the session.
///
/// Surrounding whitespace is ignored and the match is case-insensitive.
pub fn is_exit_command(input: &str) -> bool {
    let input = input.trim();
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

/// Result of one conversational turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The provider answered; the reply is now the last history entry.
    Completed(String),
    /// The provider failed; the message is safe to show the user.
    Failed(String),
}

impl TurnOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TurnOutcome::Completed(_))
    }
}

/// Append-only message history.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// A history that opens with the given system message.
    pub fn with_system(system: Message) -> Self {
        Self {
            messages: vec![system],
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// One interactive session against one provider.
pub struct ChatSession {
    provider: Box<dyn LLMProvider>,
    history: Conversation,
    stream: bool,
}

impl ChatSession {
    pub fn new(provider: Box<dyn LLMProvider>, history: Conversation, stream: bool) -> Self {
        Self {
            provider,
            history,
            stream,
        }
    }

    pub fn history(&self) -> &Conversation {
        &self.history
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Run a single turn, writing the reply to `out` as it arrives.
    ///
    /// In streaming mode fragments are written and flushed one by one; the
    /// caller is responsible for the leading label. Failures are returned as
    /// [`TurnOutcome::Failed`] and never abort the session.
    pub async fn run_turn<W: Write>(&mut self, input: &str, out: &mut W) -> TurnOutcome {
        self.history.push(Message::user(input));

        let reply = if self.stream {
            self.stream_reply(out).await
        } else {
            self.complete_reply(out).await
        };

        match reply {
            Ok(text) if text.trim().is_empty() => {
                tracing::warn!("{} returned an empty reply", self.provider.name());
                TurnOutcome::Failed(format!("{} returned an empty reply", self.provider.name()))
            }
            Ok(text) => {
                self.history.push(Message::assistant(text.clone()));
                TurnOutcome::Completed(text)
            }
            Err(e) => {
                let message = scrub(&e.to_string());
                tracing::error!("Turn failed: {}", message);
                TurnOutcome::Failed(message)
            }
        }
    }

    async fn complete_reply<W: Write>(&self, out: &mut W) -> Result<String, LLMError> {
        let text = self.provider.complete(self.history.messages()).await?;
        write_fragment(out, &text)?;
        Ok(text)
    }

    async fn stream_reply<W: Write>(&self, out: &mut W) -> Result<String, LLMError> {
        let mut fragments = self.provider.stream(self.history.messages()).await?;
        let mut reply = String::new();

        while let Some(fragment) = fragments.next().await {
            let fragment = fragment?;
            if fragment.is_empty() {
                continue;
            }
            write_fragment(out, &fragment)?;
            reply.push_str(&fragment);
        }

        Ok(reply)
    }
}

fn write_fragment<W: Write>(out: &mut W, fragment: &str) -> Result<(), LLMError> {
    out.write_all(fragment.as_bytes())
        .and_then(|_| out.flush())
        .map_err(|e| LLMError::NetworkError(format!("Failed to write reply: {}", e)))
}

/// Drive the read-send-print loop until an exit command or end of input.
///
/// Returns the number of turns that completed.
pub async fn run_repl<R, W>(session: &mut ChatSession, input: R, out: &mut W) -> io::Result<usize>
where
    R: BufRead,
    W: Write,
{
    let mut lines = input.lines();
    let mut completed = 0;

    loop {
        write!(out, "\n{}", USER_PROMPT)?;
        out.flush()?;

        let line = match lines.next() {
            Some(line) => line?,
            None => {
                writeln!(out)?;
                break;
            }
        };

        if is_exit_command(&line) {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        write!(out, "\n{}", ASSISTANT_LABEL)?;
        out.flush()?;

        match session.run_turn(&line, out).await {
            TurnOutcome::Completed(_) => {
                writeln!(out)?;
                completed += 1;
            }
            TurnOutcome::Failed(message) => {
                writeln!(out)?;
                writeln!(out, "Error: {}", message)?;
            }
        }
    }

    tracing::info!(
        "Chat session ended after {} completed turns ({} messages)",
        completed,
        session.history().len()
    );
    Ok(completed)
}

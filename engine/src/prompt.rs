//! Prompt templates
//!
//! Turns loaded context and user input into the message lists sent to a
//! provider.

use crate::context::ProfileContext;
use crate::llm::Message;

/// Appended to a real profile list in the system message.
pub const PROFILE_INSTRUCTION: &str = "You can answer questions using this profile list.";

const EXTRACTION_TEMPLATE: &str = "Extract the following from the input:
- sentiment (happy/sad/neutral)
- aggressiveness (1-10)
- language, person, date, location, organization
Respond using the fields in 'Insight'.

Input:
{input}";

/// The system message that opens a chat session.
///
/// Placeholder contexts are passed through unchanged so the model knows no
/// profile data is available.
pub fn context_system_message(context: &ProfileContext) -> Message {
    if context.is_placeholder() {
        Message::system(context.text.clone())
    } else {
        Message::system(format!("{}\n\n{}", context.text, PROFILE_INSTRUCTION))
    }
}

/// The single-message prompt for insight extraction.
pub fn extraction_messages(input: &str) -> Vec<Message> {
    vec![Message::user(EXTRACTION_TEMPLATE.replace("{input}", input))]
}

/// Messages for a one-shot question with an optional instruction.
pub fn ask_messages(system: Option<&str>, prompt: &str) -> Vec<Message> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = system.filter(|s| !s.trim().is_empty()) {
        messages.push(Message::system(system));
    }
    messages.push(Message::user(prompt));
    messages
}

/// Greeting printed before the first chat prompt.
pub fn greeting(user_name: Option<&str>) -> String {
    match user_name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => format!("Hey {}! Ask me anything buddy", name),
        None => "Hey! Ask me anything buddy".to_string(),
    }
}

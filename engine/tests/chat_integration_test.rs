//! Integration tests for the conversation loop
//!
//! Covers the whole chat path: profile context, system message, turns
//! against a recording mock provider and against a wiremock Mistral server.

use async_trait::async_trait;
use parley_engine::chat::{run_repl, ChatSession, Conversation, TurnOutcome};
use parley_engine::config::MistralConfig;
use parley_engine::context::{load_profile_context, Location, ProfileRecord, ProfileSource};
use parley_engine::llm::mistral::MistralProvider;
use parley_engine::llm::{
    LLMError, LLMProvider, Message, MessageRole, OutputSchema, TextStream,
};
use parley_engine::prompt::context_system_message;
use parley_engine::secrets::SecretString;
use proptest::prelude::*;
use sdk::errors::EngineError;
use serde_json::json;
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Records every history it is sent and answers from a script.
/// `false` entries in the script fail the turn.
struct MockLLMProvider {
    script: Mutex<Vec<bool>>,
    seen: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl MockLLMProvider {
    fn new(script: Vec<bool>) -> (Self, Arc<Mutex<Vec<Vec<Message>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let provider = Self {
            script: Mutex::new(script),
            seen: seen.clone(),
        };
        (provider, seen)
    }

    fn answer(&self, messages: &[Message]) -> parley_engine::llm::Result<String> {
        self.seen.lock().unwrap().push(messages.to_vec());

        let mut script = self.script.lock().unwrap();
        let ok = if script.is_empty() { true } else { script.remove(0) };
        if ok {
            Ok(format!("reply #{}", messages.len()))
        } else {
            Err(LLMError::ProviderUnavailable("mock outage".to_string()))
        }
    }
}

#[async_trait]
impl LLMProvider for MockLLMProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-1"
    }

    async fn complete(&self, messages: &[Message]) -> parley_engine::llm::Result<String> {
        self.answer(messages)
    }

    async fn stream(&self, messages: &[Message]) -> parley_engine::llm::Result<TextStream> {
        let text = self.answer(messages)?;
        let (head, tail) = text.split_at(text.len() / 2);
        let fragments = vec![Ok(head.to_string()), Ok(String::new()), Ok(tail.to_string())];
        Ok(Box::pin(futures::stream::iter(fragments)))
    }

    async fn extract(
        &self,
        _messages: &[Message],
        _schema: &OutputSchema,
    ) -> parley_engine::llm::Result<serde_json::Value> {
        Err(LLMError::InvalidRequest("not supported by mock".to_string()))
    }
}

struct StaticSource(Vec<ProfileRecord>);

#[async_trait]
impl ProfileSource for StaticSource {
    fn describe(&self) -> String {
        "static".to_string()
    }

    async fn fetch_profiles(&self) -> Result<Vec<ProfileRecord>, EngineError> {
        Ok(self.0.clone())
    }
}

fn profile(first: &str, expertise: &str, city: &str) -> ProfileRecord {
    ProfileRecord {
        first_name: Some(first.to_string()),
        last_name: Some("Khan".to_string()),
        area_of_expertise: Some(expertise.to_string()),
        current_location: Some(Location {
            city: Some(city.to_string()),
            state: None,
            country: Some("India".to_string()),
        }),
    }
}

#[tokio::test]
async fn test_context_becomes_first_system_message() {
    let source = StaticSource(vec![
        profile("Shadab", "Rust", "Bhopal"),
        profile("Aisha", "Databases", "Pune"),
    ]);
    let context = load_profile_context(&source).await;
    assert_eq!(context.profile_count, 2);

    let (provider, seen) = MockLLMProvider::new(vec![true]);
    let mut session = ChatSession::new(
        Box::new(provider),
        Conversation::with_system(context_system_message(&context)),
        true,
    );

    let mut out: Vec<u8> = Vec::new();
    let outcome = session.run_turn("Who knows Rust?", &mut out).await;
    assert!(outcome.is_completed());

    let seen = seen.lock().unwrap();
    let first_request = &seen[0];
    assert_eq!(first_request.len(), 2);
    assert_eq!(first_request[0].role, MessageRole::System);
    assert!(first_request[0]
        .content
        .contains("1. Name: Shadab Khan, Expertise: Rust, Location: Bhopal, , India"));
    assert_eq!(first_request[1].content, "Who knows Rust?");
}

#[tokio::test]
async fn test_failed_turn_is_sent_again_with_next_question() {
    let (provider, seen) = MockLLMProvider::new(vec![false, true]);
    let mut session = ChatSession::new(Box::new(provider), Conversation::new(), false);
    let mut out: Vec<u8> = Vec::new();

    let first = session.run_turn("one", &mut out).await;
    assert!(matches!(first, TurnOutcome::Failed(ref m) if m.contains("mock outage")));

    let second = session.run_turn("two", &mut out).await;
    assert_eq!(second, TurnOutcome::Completed("reply #2".to_string()));

    // The unanswered question stays in history and is resent.
    let seen = seen.lock().unwrap();
    let contents: Vec<&str> = seen[1].iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["one", "two"]);
}

#[tokio::test]
async fn test_repl_over_mistral_stream() {
    let server = MockServer::start().await;

    let body = concat!(
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Namaste\"}}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\", Shadab!\"}}]}\n\n",
        "data: [DONE]\n\n"
    );

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(body, "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let provider = MistralProvider::new(
        MistralConfig {
            base_url: server.uri(),
            model: "mistral-large-latest".to_string(),
        },
        SecretString::new("test-key"),
    );

    let mut session = ChatSession::new(
        Box::new(provider),
        Conversation::with_system(Message::system("No profile data was found.")),
        true,
    );

    let input = std::io::Cursor::new("hello\nexit\n");
    let mut out: Vec<u8> = Vec::new();
    let completed = run_repl(&mut session, input, &mut out).await.unwrap();

    assert_eq!(completed, 1);
    assert_eq!(session.history().len(), 3);
    assert_eq!(
        session.history().messages()[2],
        Message::assistant("Namaste, Shadab!")
    );

    let printed = String::from_utf8(out).unwrap();
    assert!(printed.contains("buddy: Namaste, Shadab!"));
}

#[tokio::test]
async fn test_stream_failing_mid_reply_records_no_assistant_message() {
    let server = MockServer::start().await;

    let body = concat!(
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Bhopal is\"}}]}\n\n",
        "data: {truncated\n\n"
    );

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let provider = MistralProvider::new(
        MistralConfig {
            base_url: server.uri(),
            model: "mistral-large-latest".to_string(),
        },
        SecretString::new("test-key"),
    );
    let mut session = ChatSession::new(
        Box::new(provider),
        Conversation::with_system(Message::system("No profile data was found.")),
        true,
    );

    let mut out: Vec<u8> = Vec::new();
    let outcome = session.run_turn("describe Bhopal", &mut out).await;

    assert!(matches!(outcome, TurnOutcome::Failed(_)));
    assert_eq!(String::from_utf8(out).unwrap(), "Bhopal is");
    assert_eq!(session.history().len(), 2);
    let last = &session.history().messages()[1];
    assert_eq!(last.role, MessageRole::User);
    assert_eq!(last.content, "describe Bhopal");
}

#[tokio::test]
async fn test_provider_error_mid_session_keeps_loop_alive() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({"message": "slow down"})))
        .mount(&server)
        .await;

    let provider = MistralProvider::new(
        MistralConfig {
            base_url: server.uri(),
            model: "mistral-large-latest".to_string(),
        },
        SecretString::new("test-key"),
    );
    let mut session = ChatSession::new(Box::new(provider), Conversation::new(), true);

    let input = std::io::Cursor::new("a\nb\nquit\n");
    let mut out: Vec<u8> = Vec::new();
    let completed = run_repl(&mut session, input, &mut out).await.unwrap();

    assert_eq!(completed, 0);
    assert_eq!(session.history().len(), 2);
    let printed = String::from_utf8(out).unwrap();
    assert_eq!(printed.matches("Error: Rate limit exceeded").count(), 2);
}

proptest! {
    #[test]
    fn prop_history_grows_by_two_or_one(
        script in proptest::collection::vec(any::<bool>(), 0..12),
        stream in any::<bool>(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();

        let (provider, _) = MockLLMProvider::new(script.clone());
        let mut session = ChatSession::new(
            Box::new(provider),
            Conversation::with_system(Message::system("ctx")),
            stream,
        );

        for (turn, ok) in script.iter().enumerate() {
            let before = session.history().len();
            let outcome = runtime.block_on(session.run_turn(&format!("q{}", turn), &mut Vec::<u8>::new()));
            let grew = session.history().len() - before;

            prop_assert_eq!(outcome.is_completed(), *ok);
            prop_assert_eq!(grew, if *ok { 2 } else { 1 });
        }

        let history = session.history().messages();
        prop_assert_eq!(history[0].role, MessageRole::System);
        // Every assistant message directly follows a user message.
        for pair in history.windows(2) {
            if pair[1].role == MessageRole::Assistant {
                prop_assert_eq!(pair[0].role, MessageRole::User);
            }
        }
    }
}

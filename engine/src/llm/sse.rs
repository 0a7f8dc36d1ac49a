//! Server-sent event streams
//!
//! Both providers stream replies as `text/event-stream`. The connection is
//! driven by `reqwest-eventsource`; this module opens it, turns transport and
//! status failures into [`LLMError`]s, and surfaces each event's `data`
//! payload until the server ends the stream or sends `[DONE]`.

use futures::{Stream, StreamExt};
use reqwest::RequestBuilder;
use reqwest_eventsource::retry::Never;
use reqwest_eventsource::{Error as EventSourceError, Event, EventSource};

use super::{LLMError, Result};

/// Payload marking the end of an OpenAI-style stream.
pub const DONE_MARKER: &str = "[DONE]";

/// Open an event source and wait until the server has accepted it.
///
/// Failures before the first event (refused connection, non-success status,
/// wrong content type) are returned here rather than inside the stream.
pub(crate) async fn open(provider: &str, request: RequestBuilder) -> Result<EventSource> {
    let mut source = EventSource::new(request)
        .map_err(|e| LLMError::InvalidRequest(format!("Cannot stream request: {}", e)))?;
    // Replies are not resumable; a dropped stream fails the turn.
    source.set_retry_policy(Box::new(Never));

    match source.next().await {
        Some(Ok(Event::Open)) => Ok(source),
        Some(Ok(Event::Message(_))) => {
            source.close();
            Err(LLMError::ParseError(format!(
                "{} sent an event before the stream opened",
                provider
            )))
        }
        Some(Err(e)) => {
            source.close();
            Err(map_error(provider, e).await)
        }
        None => Err(LLMError::ProviderUnavailable(format!(
            "{} closed the stream before it opened",
            provider
        ))),
    }
}

/// Data payloads of an opened event source.
///
/// The stream ends at `[DONE]` or when the server closes the connection.
/// Any other failure is yielded once and ends the stream.
pub(crate) fn data_events(
    provider: &'static str,
    mut source: EventSource,
) -> impl Stream<Item = Result<String>> + Send {
    async_stream::stream! {
        while let Some(event) = source.next().await {
            match event {
                Ok(Event::Open) => continue,
                Ok(Event::Message(message)) => {
                    if message.data.trim() == DONE_MARKER {
                        break;
                    }
                    yield Ok(message.data);
                }
                Err(EventSourceError::StreamEnded) => break,
                Err(e) => {
                    yield Err(map_error(provider, e).await);
                    break;
                }
            }
        }

        source.close();
    }
}

async fn map_error(provider: &str, err: EventSourceError) -> LLMError {
    match err {
        EventSourceError::Transport(e) => LLMError::from_transport(provider, e),
        EventSourceError::InvalidStatusCode(status, response) => {
            let body = response.text().await.unwrap_or_default();
            LLMError::from_status(provider, status, body)
        }
        EventSourceError::InvalidContentType(content_type, _) => LLMError::ParseError(format!(
            "{} answered with {:?} instead of an event stream",
            provider, content_type
        )),
        EventSourceError::StreamEnded => {
            LLMError::NetworkError(format!("{} ended the stream", provider))
        }
        other => LLMError::NetworkError(format!("{} stream error: {}", provider, other)),
    }
}

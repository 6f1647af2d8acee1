//! Server-sent event decoding for OpenAI-compatible chat completion streams.

use std::fmt;

use eventsource_stream::Eventsource;
use serde::Deserialize;
use tokio_stream::{Stream, StreamExt};

use crate::error::LlmError;
use crate::provider::ChatStream;

const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, PartialEq)]
enum CompletionEvent {
    Delta(String),
    /// Keep-alive, role-only or usage-only event.
    Empty,
    Done,
}

/// Decode a completion body into text fragments.
///
/// The stream ends at the `[DONE]` sentinel or when the body closes. An upstream error
/// payload or an undecodable event is yielded as an error.
pub(crate) fn completion_stream<S, B, E>(body: S) -> ChatStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let fragments = body
        .eventsource()
        .map(|event| match event {
            Ok(event) => parse_completion_event(&event.data),
            Err(e) => Err(LlmError::SseParse(e.to_string())),
        })
        .take_while(|event| !matches!(event, Ok(CompletionEvent::Done)))
        .filter_map(|event| match event {
            Ok(CompletionEvent::Delta(text)) => Some(Ok(text)),
            Ok(CompletionEvent::Empty | CompletionEvent::Done) => None,
            Err(e) => Some(Err(e)),
        });
    Box::pin(fragments)
}

fn parse_completion_event(data: &str) -> Result<CompletionEvent, LlmError> {
    let data = data.trim();
    if data == DONE_SENTINEL {
        return Ok(CompletionEvent::Done);
    }
    if data.is_empty() {
        return Ok(CompletionEvent::Empty);
    }

    let chunk: CompletionChunk = serde_json::from_str(data)
        .map_err(|e| LlmError::SseParse(format!("failed to parse SSE data: {e}")))?;
    if let Some(err) = chunk.error {
        return Err(LlmError::SseParse(format!("stream error: {}", err.message)));
    }

    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(CompletionEvent::Empty);
    };
    if let Some(reason) = choice.finish_reason.as_deref()
        && reason != "stop"
    {
        tracing::debug!(reason, "completion finished early");
    }
    match choice.delta.content {
        Some(text) if !text.is_empty() => Ok(CompletionEvent::Delta(text)),
        _ => Ok(CompletionEvent::Empty),
    }
}

#[derive(Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    error: Option<UpstreamError>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    delta: CompletionDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Default, Deserialize)]
struct CompletionDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct UpstreamError {
    message: String,
}

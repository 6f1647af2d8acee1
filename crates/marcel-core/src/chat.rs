//! Chat response encoding: turns a pipeline run into the newline-delimited JSON chunks
//! a chat client consumes.

use std::collections::VecDeque;

use futures::{Stream, StreamExt};
use marcel_evidence::RetrievalResult;
use serde::{Deserialize, Serialize};

use crate::pipeline::{AnswerStrategy, AnswerStream, ConversationTurn, RunResult};

/// Detail sent to the client whenever generation fails. Raw errors stay in the log.
pub const GENERATION_FAILED_DETAIL: &str = "Could not generate response. Please retry.";

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("No messages provided.")]
    NoMessages,

    #[error("failed to encode chunk: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ChatError {
    /// HTTP-style status code a caller reports for this error.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::NoMessages => 422,
            Self::Encode(_) => 500,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorContent {
    pub detail: String,
}

/// Evidence entry as reported to the client and stored alongside the answer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub url: String,
    pub title: String,
    pub favicon: String,
    pub score: f64,
    pub fingerprint: String,
}

impl From<&RetrievalResult> for SourceRef {
    fn from(result: &RetrievalResult) -> Self {
        let doc = &result.document;
        Self {
            url: doc.url.clone(),
            title: doc.title.clone(),
            favicon: doc.favicon.clone(),
            score: result.relevance_score,
            fingerprint: doc.fingerprint.to_string(),
        }
    }
}

/// One line of the response. Unset fields are omitted from the encoding.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponseChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub non_answer: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_strategy: Option<AnswerStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SourceRef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_content: Option<ErrorContent>,
}

impl ChatResponseChunk {
    #[must_use]
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error_status_code.is_some()
    }
}

/// Terminal error chunk.
#[must_use]
pub fn reply_error(status: u16, detail: impl Into<String>) -> ChatResponseChunk {
    ChatResponseChunk {
        error_status_code: Some(status),
        error_content: Some(ErrorContent {
            detail: detail.into(),
        }),
        ..ChatResponseChunk::default()
    }
}

/// Serialize `chunk` as one JSON line, trailing newline included.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_chunk(chunk: &ChatResponseChunk) -> Result<String, ChatError> {
    let mut line = serde_json::to_string(chunk)?;
    line.push('\n');
    Ok(line)
}

/// Split a conversation into the current query (last message) and its history.
///
/// # Errors
///
/// Returns [`ChatError::NoMessages`] if `messages` is empty.
pub fn split_request(
    mut messages: Vec<ConversationTurn>,
) -> Result<(String, Vec<ConversationTurn>), ChatError> {
    let last = messages.pop().ok_or(ChatError::NoMessages)?;
    Ok((last.content, messages))
}

struct Draining {
    answer: AnswerStream,
    strategy: AnswerStrategy,
    sources: Vec<SourceRef>,
}

enum Phase {
    Streaming(Draining),
    Trailing(VecDeque<ChatResponseChunk>),
}

/// Drain a run into response chunks: one content chunk per fragment, then the link
/// block (if any) and a metadata chunk. A generation failure ends the stream with a
/// single error chunk instead.
pub fn respond(run: RunResult) -> impl Stream<Item = ChatResponseChunk> + Send {
    let draining = Draining {
        sources: run.evidence.iter().map(SourceRef::from).collect(),
        answer: run.generated_answer,
        strategy: run.answer_strategy,
    };

    futures::stream::unfold(Some(Phase::Streaming(draining)), |phase| async move {
        match phase? {
            Phase::Streaming(mut d) => match d.answer.next().await {
                Some(Ok(fragment)) => {
                    Some((ChatResponseChunk::content(fragment), Some(Phase::Streaming(d))))
                }
                Some(Err(e)) => {
                    tracing::error!("could not generate response: {e:#}");
                    Some((reply_error(500, GENERATION_FAILED_DETAIL), None))
                }
                None => {
                    let mut trailing = finish(d);
                    let first = trailing.pop_front()?;
                    Some((first, Some(Phase::Trailing(trailing))))
                }
            },
            Phase::Trailing(mut queue) => {
                let next = queue.pop_front()?;
                Some((next, Some(Phase::Trailing(queue))))
            }
        }
    })
}

fn finish(d: Draining) -> VecDeque<ChatResponseChunk> {
    let mut out = VecDeque::with_capacity(2);
    match d.answer.finish() {
        Ok(done) => {
            if !done.links_block.is_empty() {
                out.push_back(ChatResponseChunk::content(format!(
                    "\n\n{}",
                    done.links_block
                )));
            }
            out.push_back(ChatResponseChunk {
                non_answer: Some(done.non_answer),
                answer_strategy: Some(d.strategy),
                sources: Some(d.sources),
                ..ChatResponseChunk::default()
            });
        }
        Err(e) => {
            tracing::error!("could not finalize response: {e:#}");
            out.push_back(reply_error(500, GENERATION_FAILED_DETAIL));
        }
    }
    out
}

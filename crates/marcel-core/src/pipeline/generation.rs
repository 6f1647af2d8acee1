//! Lazily opened, single-pass answer stream.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use marcel_llm::{ChatStream, LlmError, LlmProvider, Message};
use serde::Serialize;

use super::RunStage;
use super::links::{detect_non_answer, format_known_links};

type OpenFuture = Pin<Box<dyn Future<Output = Result<ChatStream, LlmError>> + Send>>;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("failed to open generation stream: {0}")]
    Open(#[source] LlmError),

    #[error("generation stream interrupted after {delivered} fragments: {source}")]
    Interrupted {
        delivered: usize,
        #[source]
        source: LlmError,
    },

    #[error("answer stream was not drained to completion")]
    Incomplete,
}

/// Post-processed answer, available once the stream has ended without error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CompletedAnswer {
    /// Concatenation of every fragment, as streamed.
    pub text: String,
    /// `text` with the reference block of cited evidence links appended.
    pub formatted: String,
    /// The appended reference block alone; empty when no known link was cited.
    pub links_block: String,
    pub non_answer: bool,
}

enum State {
    Opening(OpenFuture),
    Streaming(ChatStream),
    Completed,
    Failed,
}

/// Generated answer as a stream of text fragments.
///
/// The generation request is only sent on the first poll. Every non-empty fragment is
/// yielded once, in order. A failure to open or a failure mid-stream yields exactly one
/// `Err` and ends the stream. Dropping the stream closes the underlying connection.
pub struct AnswerStream {
    state: State,
    text: String,
    delivered: usize,
    links: BTreeMap<u32, String>,
    non_answer_max_words: usize,
}

impl AnswerStream {
    pub fn new<P>(
        provider: Arc<P>,
        messages: Vec<Message>,
        links: BTreeMap<u32, String>,
        non_answer_max_words: usize,
    ) -> Self
    where
        P: LlmProvider + 'static,
    {
        let open: OpenFuture = Box::pin(async move { provider.chat_stream(&messages).await });
        Self {
            state: State::Opening(open),
            text: String::new(),
            delivered: 0,
            links,
            non_answer_max_words,
        }
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self.state, State::Completed)
    }

    /// Resolve citations and classify the answer.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::Incomplete`] unless the stream ended without error.
    pub fn finish(mut self) -> Result<CompletedAnswer, GenerationError> {
        if !self.is_completed() {
            return Err(GenerationError::Incomplete);
        }
        let text = std::mem::take(&mut self.text);
        let (formatted, links_block) = format_known_links(&text, &self.links);
        let non_answer = detect_non_answer(&formatted, self.non_answer_max_words);
        tracing::debug!(
            chars = text.len(),
            cited = !links_block.is_empty(),
            non_answer,
            "answer post-processed"
        );
        Ok(CompletedAnswer {
            text,
            formatted,
            links_block,
            non_answer,
        })
    }

    fn fail(&mut self, error: GenerationError) -> Poll<Option<Result<String, GenerationError>>> {
        tracing::warn!(stage = %RunStage::Failed, fragments = self.delivered, "generation failed: {error:#}");
        self.state = State::Failed;
        Poll::Ready(Some(Err(error)))
    }
}

impl Stream for AnswerStream {
    type Item = Result<String, GenerationError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match &mut this.state {
                State::Opening(open) => match open.as_mut().poll(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Ok(stream)) => {
                        tracing::debug!(stage = %RunStage::Streaming, "generation stream opened");
                        this.state = State::Streaming(stream);
                    }
                    Poll::Ready(Err(e)) => return this.fail(GenerationError::Open(e)),
                },
                State::Streaming(stream) => match stream.as_mut().poll_next(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Some(Ok(fragment))) => {
                        if fragment.is_empty() {
                            continue;
                        }
                        this.text.push_str(&fragment);
                        this.delivered += 1;
                        return Poll::Ready(Some(Ok(fragment)));
                    }
                    Poll::Ready(Some(Err(source))) => {
                        let delivered = this.delivered;
                        return this.fail(GenerationError::Interrupted { delivered, source });
                    }
                    Poll::Ready(None) => {
                        tracing::info!(
                            stage = %RunStage::Completed,
                            fragments = this.delivered,
                            "generation completed"
                        );
                        this.state = State::Completed;
                        return Poll::Ready(None);
                    }
                },
                State::Completed | State::Failed => return Poll::Ready(None),
            }
        }
    }
}

impl Drop for AnswerStream {
    fn drop(&mut self) {
        if matches!(self.state, State::Opening(_) | State::Streaming(_)) {
            tracing::debug!(fragments = self.delivered, "answer stream dropped before completion");
        }
    }
}

impl std::fmt::Debug for AnswerStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            State::Opening(_) => "opening",
            State::Streaming(_) => "streaming",
            State::Completed => "completed",
            State::Failed => "failed",
        };
        f.debug_struct("AnswerStream")
            .field("state", &state)
            .field("delivered", &self.delivered)
            .field("links", &self.links.len())
            .finish_non_exhaustive()
    }
}

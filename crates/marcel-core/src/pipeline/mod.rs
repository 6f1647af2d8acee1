//! Hybrid retrieval and answer pipeline.
//!
//! A run walks a fixed sequence of stages: decide the answer strategy, retrieve and fuse
//! evidence when the strategy asks for it, assemble the prompt, then hand back a lazy
//! [`AnswerStream`]. Only the stream can fail, and it reports failure in-band.

pub mod fusion;
pub mod generation;
pub mod links;
pub mod prompt;
pub mod strategy;

use std::fmt;
use std::sync::Arc;

use marcel_evidence::links::merged_links;
use marcel_evidence::{EvidenceSource, RetrievalResult};
use marcel_llm::{LlmProvider, Message, Role};
use serde::{Deserialize, Serialize};

use crate::config::{AnswerConfig, AssistantConfig, ClassifierConfig, Config, RetrievalConfig};

pub use fusion::Retrieval;
pub use generation::{AnswerStream, CompletedAnswer, GenerationError};
pub use strategy::Verdict;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStrategy {
    Retrieve,
    GenerateWithHistory,
}

impl AnswerStrategy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Retrieve => "retrieve",
            Self::GenerateWithHistory => "generate_with_history",
        }
    }
}

impl fmt::Display for AnswerStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ConversationTurn {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn to_message(&self) -> Message {
        Message {
            role: match self.role {
                ChatRole::User => Role::User,
                ChatRole::Assistant => Role::Assistant,
            },
            content: self.content.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStage {
    Init,
    StrategyDecided,
    Retrieving,
    PromptBuilt,
    Streaming,
    Completed,
    Failed,
}

impl RunStage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::StrategyDecided => "strategy_decided",
            Self::Retrieving => "retrieving",
            Self::PromptBuilt => "prompt_built",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Intermediate results of a run, returned when debugging is requested.
#[derive(Debug, Default)]
pub struct DebugSnapshot {
    /// `None` when the classifier is disabled.
    pub verdict: Option<Verdict>,
    pub lexical: Vec<RetrievalResult>,
    pub faq: Vec<RetrievalResult>,
    pub branch_errors: Vec<String>,
    pub evidence: Vec<RetrievalResult>,
    pub prompt: Vec<Message>,
}

/// Outcome of [`HybridPipeline::run`]. `evidence` is empty unless the strategy is
/// [`AnswerStrategy::Retrieve`].
#[derive(Debug)]
pub struct RunResult {
    pub generated_answer: AnswerStream,
    pub evidence: Vec<RetrievalResult>,
    pub answer_strategy: AnswerStrategy,
    pub raw: Option<DebugSnapshot>,
}

/// Settings the pipeline reads on every run.
#[derive(Clone, Debug, Default)]
pub struct PipelineConfig {
    pub classifier: ClassifierConfig,
    pub retrieval: RetrievalConfig,
    pub answer: AnswerConfig,
    pub assistant: AssistantConfig,
}

impl From<&Config> for PipelineConfig {
    fn from(config: &Config) -> Self {
        Self {
            classifier: config.classifier.clone(),
            retrieval: config.retrieval.clone(),
            answer: config.answer.clone(),
            assistant: config.assistant.clone(),
        }
    }
}

/// Built once per process and shared behind an `Arc`; runs are independent.
pub struct HybridPipeline<P, S> {
    provider: Arc<P>,
    source: Arc<S>,
    config: PipelineConfig,
}

impl<P, S> HybridPipeline<P, S>
where
    P: LlmProvider + 'static,
    S: EvidenceSource,
{
    pub fn new(provider: Arc<P>, source: Arc<S>, config: PipelineConfig) -> Self {
        Self {
            provider,
            source,
            config,
        }
    }

    /// Run the classifier alone.
    pub async fn classify(&self, query: &str) -> Verdict {
        strategy::classify(&*self.provider, query, &self.config.classifier).await
    }

    /// Run retrieval and fusion alone.
    pub async fn retrieve(&self, query: &str) -> Retrieval {
        fusion::retrieve(&*self.source, query, &self.config.retrieval).await
    }

    /// Decide the strategy, gather evidence and prepare the answer stream.
    ///
    /// Never fails. Classifier problems fall back to retrieval, failed retrieval
    /// branches count as empty, and generation errors surface inside the stream.
    pub async fn run(&self, query: &str, history: &[ConversationTurn], debug: bool) -> RunResult {
        tracing::debug!(stage = %RunStage::Init, history = history.len(), "pipeline run started");

        let verdict = if self.config.classifier.enabled {
            Some(self.classify(query).await)
        } else {
            None
        };
        let answer_strategy = match verdict {
            Some(Verdict::NoRetrieval) => AnswerStrategy::GenerateWithHistory,
            Some(Verdict::RequiresRetrieval) | None => AnswerStrategy::Retrieve,
            Some(Verdict::Indeterminate) => {
                tracing::info!("could not determine if query needs retrieval, retrieving");
                AnswerStrategy::Retrieve
            }
        };
        tracing::info!(
            stage = %RunStage::StrategyDecided,
            strategy = %answer_strategy,
            "answer strategy decided"
        );

        let retrieval = match answer_strategy {
            AnswerStrategy::Retrieve => {
                tracing::debug!(stage = %RunStage::Retrieving, "retrieving evidence");
                self.retrieve(query).await
            }
            AnswerStrategy::GenerateWithHistory => Retrieval::default(),
        };

        let messages = prompt::build_messages(
            answer_strategy,
            query,
            history,
            &retrieval.evidence,
            &self.config.assistant,
        );
        tracing::debug!(
            stage = %RunStage::PromptBuilt,
            messages = messages.len(),
            evidence = retrieval.evidence.len(),
            "prompt built"
        );

        let (messages, prompt_snapshot) = if debug {
            (messages.clone(), messages)
        } else {
            (messages, Vec::new())
        };
        let generated_answer = AnswerStream::new(
            Arc::clone(&self.provider),
            messages,
            merged_links(&retrieval.evidence),
            self.config.answer.non_answer_max_words,
        );

        let Retrieval {
            lexical,
            faq,
            errors,
            evidence,
        } = retrieval;
        let raw = debug.then(|| DebugSnapshot {
            verdict,
            lexical,
            faq,
            branch_errors: errors,
            evidence: evidence.clone(),
            prompt: prompt_snapshot,
        });

        RunResult {
            generated_answer,
            evidence,
            answer_strategy,
            raw,
        }
    }
}

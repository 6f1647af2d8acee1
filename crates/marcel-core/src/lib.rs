//! Marcel core: configuration, the hybrid retrieval and answer pipeline, and chat
//! response encoding.

pub mod chat;
pub mod config;
pub mod pipeline;

pub use config::Config;
pub use pipeline::{
    AnswerStrategy, AnswerStream, ChatRole, CompletedAnswer, ConversationTurn, DebugSnapshot,
    GenerationError, HybridPipeline, PipelineConfig, RunResult, RunStage, Verdict,
};

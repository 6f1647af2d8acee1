//! LLM provider abstraction and the OpenAI-compatible streaming backend.

pub mod error;
pub mod http;
#[cfg(feature = "mock")]
pub mod mock;
pub mod openai;
pub mod provider;
mod retry;
mod sse;
#[cfg(test)]
mod test_utils;

pub use error::LlmError;
pub use provider::{ChatOptions, ChatStream, LlmProvider, Message, Role};

//! Multi-endpoint LLM client

mod client;
mod mock;
mod types;

pub use client::{LlmClient, LlmOptions};
pub use mock::mock_completion;
pub use types::{ChatMessage, ChatRequest, ChatResponse, Completion};

use async_trait::async_trait;
use peg_analyzer_types::Result;

/// Anything that can turn a prompt into completion text
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<Completion>;
}

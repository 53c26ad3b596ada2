//! External collaborators of the analysis pipeline
//!
//! Three integrations live here: the multi-endpoint LLM client, the prompt
//! template store, and the backend client that delivers finished payloads.
//! The `CompletionBackend` trait is the seam the assembler depends on.

pub mod backend;
pub mod json;
pub mod llm;
pub mod prompt;

pub use backend::{BackendClient, BackendPostResult};
pub use json::extract_first_json_object;
pub use llm::{Completion, CompletionBackend, LlmClient, LlmOptions};
pub use prompt::{PromptTemplateStore, FALLBACK_PROMPT};

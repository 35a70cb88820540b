//! LLM integration
//!
//! Features:
//! - Local backend (Ollama `/api/generate`, `/api/embeddings`)
//! - Hosted backend (OpenAI-compatible chat completions with SSE streaming)
//! - Exponential backoff retries with non-retryable 400/404
//! - Completion caching keyed by (prompt, model, options) digest
//! - Streaming token generation over mpsc channels

pub mod backend;
pub mod cache;
pub mod factory;
pub mod openai;

pub use backend::{CompletionOptions, LlmBackend, OllamaBackend, OllamaConfig};
pub use cache::CachedLlm;
pub use factory::{build_backend, LlmProvider};
pub use openai::{OpenAiBackend, OpenAiConfig};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Generation error: {0}")]
    Generation(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl LlmError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Network(_) | LlmError::Timeout)
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for task_agent_core::Error {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Timeout => task_agent_core::Error::Timeout("llm call".to_string()),
            LlmError::ModelNotFound(model) => task_agent_core::Error::not_found("model", model),
            LlmError::Configuration(msg) => task_agent_core::Error::Internal(msg),
            other => task_agent_core::Error::Upstream(other.to_string()),
        }
    }
}

//! Backend selection
//!
//! Builds the configured backend from settings and wraps it in the
//! completion cache.

use std::sync::Arc;
use std::time::Duration;

use task_agent_config::constants::llm;
use task_agent_config::LlmSettings;

use crate::backend::{LlmBackend, OllamaBackend, OllamaConfig};
use crate::cache::CachedLlm;
use crate::openai::{OpenAiBackend, OpenAiConfig};
use crate::LlmError;

/// Which backend serves completions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Ollama,
    OpenAi,
}

impl LlmProvider {
    pub fn from_settings(settings: &LlmSettings) -> Self {
        if settings.use_openai {
            LlmProvider::OpenAi
        } else {
            LlmProvider::Ollama
        }
    }
}

/// Build the configured backend, wrapped in the completion cache.
pub fn build_backend(settings: &LlmSettings) -> Result<Arc<dyn LlmBackend>, LlmError> {
    let provider = LlmProvider::from_settings(settings);
    tracing::info!(?provider, "building LLM backend");

    let inner: Arc<dyn LlmBackend> = match provider {
        LlmProvider::Ollama => Arc::new(OllamaBackend::new(OllamaConfig {
            endpoint: settings.ollama_url.clone(),
            llm_model: settings.llm_model.clone(),
            fast_model: settings.fast_llm_model.clone(),
            embedding_model: settings.embedding_model.clone(),
            ..OllamaConfig::default()
        })?),
        LlmProvider::OpenAi => Arc::new(OpenAiBackend::new(OpenAiConfig {
            api_key: settings.openai_api_key.clone().ok_or_else(|| {
                LlmError::Configuration("USE_OPENAI set without OPENAI_API_KEY".to_string())
            })?,
            api_base: settings.openai_api_base.clone(),
            ..OpenAiConfig::default()
        })?),
    };

    Ok(Arc::new(CachedLlm::new(
        inner,
        Duration::from_secs(llm::CACHE_TTL_SECS),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_selection() {
        let mut settings = LlmSettings::default();
        settings.use_openai = false;
        assert_eq!(LlmProvider::from_settings(&settings), LlmProvider::Ollama);

        settings.use_openai = true;
        assert_eq!(LlmProvider::from_settings(&settings), LlmProvider::OpenAi);
    }

    #[test]
    fn test_build_ollama_backend() {
        let mut settings = LlmSettings::default();
        settings.use_openai = false;
        let backend = build_backend(&settings).unwrap();
        assert_eq!(backend.default_model(), settings.llm_model);
    }
}

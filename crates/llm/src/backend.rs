//! LLM backend trait and the Ollama implementation
//!
//! The local backend talks to Ollama's generate and embeddings endpoints.
//! Streaming uses NDJSON chunks; non-streaming calls retry transient
//! failures with exponential backoff. 400 and 404 responses are never
//! retried.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use task_agent_config::constants::llm;

use crate::LlmError;

/// Per-call completion options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionOptions {
    /// Model override; the backend's default model when absent
    pub model: Option<String>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Generation token cap
    pub max_tokens: Option<usize>,
    /// System message
    pub system: Option<String>,
}

impl CompletionOptions {
    /// Stable rendering used for cache keys
    pub fn fingerprint(&self) -> String {
        format!(
            "model={};temp={};max={};system={}",
            self.model.as_deref().unwrap_or("-"),
            self.temperature.map(|t| t.to_string()).unwrap_or_default(),
            self.max_tokens.map(|t| t.to_string()).unwrap_or_default(),
            self.system.as_deref().unwrap_or("")
        )
    }
}

/// LLM backend
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Generate a completion
    async fn complete(&self, prompt: &str, opts: &CompletionOptions) -> Result<String, LlmError>;

    /// Generate with streaming; returns the concatenated text
    async fn complete_stream(
        &self,
        prompt: &str,
        opts: &CompletionOptions,
        tx: mpsc::Sender<String>,
    ) -> Result<String, LlmError>;

    /// Embed a text
    async fn embed(&self, text: &str, model: Option<&str>) -> Result<Vec<f32>, LlmError>;

    /// Default generation model
    fn default_model(&self) -> &str;

    /// Cheaper model for classification and extraction calls
    fn fast_model(&self) -> &str;
}

/// Ollama backend configuration
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// API endpoint
    pub endpoint: String,
    /// Default generation model
    pub llm_model: String,
    /// Fast model
    pub fast_model: String,
    /// Embedding model
    pub embedding_model: String,
    /// Completion request timeout
    pub completion_timeout: Duration,
    /// Embedding request timeout
    pub embedding_timeout: Duration,
    /// Retry budget for completions
    pub completion_retries: u32,
    /// Retry budget for embeddings
    pub embedding_retries: u32,
    /// Initial backoff, doubles each retry
    pub initial_backoff: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            llm_model: "llama3.1:8b".to_string(),
            fast_model: "llama3.2:3b".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            completion_timeout: Duration::from_secs(llm::COMPLETION_TIMEOUT_SECS),
            embedding_timeout: Duration::from_secs(llm::EMBEDDING_TIMEOUT_SECS),
            completion_retries: llm::COMPLETION_RETRIES,
            embedding_retries: llm::EMBEDDING_RETRIES,
            initial_backoff: Duration::from_millis(llm::INITIAL_BACKOFF_MS),
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Ollama backend
pub struct OllamaBackend {
    client: Client,
    config: OllamaConfig,
}

impl OllamaBackend {
    pub fn new(config: OllamaConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .build()
            .map_err(|e| LlmError::Configuration(format!("http client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api{}", self.config.endpoint, path)
    }

    /// Classify a non-success status. 404 means the model is absent;
    /// other 4xx are bad requests; 5xx count as transient.
    fn status_error(status: StatusCode, body: String, model: &str) -> LlmError {
        if status == StatusCode::NOT_FOUND {
            LlmError::ModelNotFound(model.to_string())
        } else if status.is_server_error() {
            LlmError::Network(format!("server error {}: {}", status, body))
        } else {
            LlmError::Api(format!("{}: {}", status, body))
        }
    }

    async fn execute_generate(
        &self,
        request: &GenerateRequest<'_>,
    ) -> Result<GenerateResponse, LlmError> {
        let response = self
            .client
            .post(self.api_url("/generate"))
            .timeout(self.config.completion_timeout)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::status_error(status, body, request.model));
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    async fn complete(&self, prompt: &str, opts: &CompletionOptions) -> Result<String, LlmError> {
        let model = opts.model.as_deref().unwrap_or(&self.config.llm_model);
        let request = GenerateRequest {
            model,
            prompt,
            stream: false,
            system: opts.system.as_deref(),
            options: GenerateOptions {
                temperature: opts.temperature,
                num_predict: opts.max_tokens.map(|t| t as i64),
            },
        };

        let mut backoff = self.config.initial_backoff;
        let mut last_error = None;

        for attempt in 0..=self.config.completion_retries {
            if attempt > 0 {
                tracing::warn!(
                    attempt,
                    retries = self.config.completion_retries,
                    "completion failed, retrying in {:?}",
                    backoff
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            match self.execute_generate(&request).await {
                Ok(result) => return Ok(result.response),
                Err(e) if e.is_retryable() => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::Network("retries exhausted".to_string())))
    }

    async fn complete_stream(
        &self,
        prompt: &str,
        opts: &CompletionOptions,
        tx: mpsc::Sender<String>,
    ) -> Result<String, LlmError> {
        let model = opts.model.as_deref().unwrap_or(&self.config.llm_model);
        let request = GenerateRequest {
            model,
            prompt,
            stream: true,
            system: opts.system.as_deref(),
            options: GenerateOptions {
                temperature: opts.temperature,
                num_predict: opts.max_tokens.map(|t| t as i64),
            },
        };

        let response = self
            .client
            .post(self.api_url("/generate"))
            .timeout(self.config.completion_timeout)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::status_error(status, body, model));
        }

        let mut full = String::new();
        let mut stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            // NDJSON: consume complete lines, keep the remainder buffered.
            while let Some(pos) = buffer.find('\n') {
                let line = buffer[..pos].trim().to_string();
                buffer.drain(..=pos);
                if line.is_empty() {
                    continue;
                }
                let parsed: GenerateChunk = serde_json::from_str(&line)
                    .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

                if !parsed.response.is_empty() {
                    full.push_str(&parsed.response);
                    if tx.send(parsed.response).await.is_err() {
                        // Receiver dropped; stop generating.
                        return Ok(full);
                    }
                }
                if parsed.done {
                    return Ok(full);
                }
            }
        }

        Ok(full)
    }

    async fn embed(&self, text: &str, model: Option<&str>) -> Result<Vec<f32>, LlmError> {
        let model = model.unwrap_or(&self.config.embedding_model);
        let request = EmbeddingRequest {
            model,
            prompt: text,
        };

        let mut backoff = self.config.initial_backoff;
        let mut last_error = None;

        for attempt in 0..=self.config.embedding_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            let result: Result<EmbeddingResponse, LlmError> = async {
                let response = self
                    .client
                    .post(self.api_url("/embeddings"))
                    .timeout(self.config.embedding_timeout)
                    .json(&request)
                    .send()
                    .await?;

                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(Self::status_error(status, body, model));
                }

                response
                    .json()
                    .await
                    .map_err(|e| LlmError::InvalidResponse(e.to_string()))
            }
            .await;

            match result {
                Ok(parsed) => return Ok(parsed.embedding),
                Err(e) if e.is_retryable() => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::Network("retries exhausted".to_string())))
    }

    fn default_model(&self) -> &str {
        &self.config.llm_model
    }

    fn fast_model(&self) -> &str {
        &self.config.fast_model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_fingerprint_is_stable() {
        let opts = CompletionOptions {
            model: Some("llama3.1:8b".into()),
            temperature: Some(0.7),
            max_tokens: Some(500),
            system: None,
        };
        assert_eq!(opts.fingerprint(), opts.clone().fingerprint());
        let other = CompletionOptions {
            temperature: Some(0.3),
            ..opts.clone()
        };
        assert_ne!(opts.fingerprint(), other.fingerprint());
    }

    #[test]
    fn test_status_classification() {
        let err = OllamaBackend::status_error(StatusCode::NOT_FOUND, String::new(), "m");
        assert!(matches!(err, LlmError::ModelNotFound(_)));
        assert!(!err.is_retryable());

        let err = OllamaBackend::status_error(StatusCode::BAD_REQUEST, "bad".into(), "m");
        assert!(matches!(err, LlmError::Api(_)));
        assert!(!err.is_retryable());

        let err =
            OllamaBackend::status_error(StatusCode::INTERNAL_SERVER_ERROR, "boom".into(), "m");
        assert!(err.is_retryable());
    }
}

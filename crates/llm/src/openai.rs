//! Hosted OpenAI-compatible backend
//!
//! Chat-formatted messages with bearer authentication. Streaming is
//! server-sent events terminated by the `data: [DONE]` sentinel.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use task_agent_config::constants::llm;

use crate::backend::{CompletionOptions, LlmBackend};
use crate::LlmError;

/// Hosted backend configuration
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Bearer token
    pub api_key: String,
    /// API base, e.g. `https://api.openai.com/v1`
    pub api_base: String,
    /// Default generation model
    pub model: String,
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

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            fast_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            completion_timeout: Duration::from_secs(llm::COMPLETION_TIMEOUT_SECS),
            embedding_timeout: Duration::from_secs(llm::EMBEDDING_TIMEOUT_SECS),
            completion_retries: llm::COMPLETION_RETRIES,
            embedding_retries: llm::EMBEDDING_RETRIES,
            initial_backoff: Duration::from_millis(llm::INITIAL_BACKOFF_MS),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingsDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsDatum {
    embedding: Vec<f32>,
}

/// OpenAI-compatible hosted backend
pub struct OpenAiBackend {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiBackend {
    pub fn new(config: OpenAiConfig) -> Result<Self, LlmError> {
        if config.api_key.is_empty() {
            return Err(LlmError::Configuration(
                "hosted backend requires an API key".to_string(),
            ));
        }
        let client = Client::builder()
            .build()
            .map_err(|e| LlmError::Configuration(format!("http client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn status_error(status: StatusCode, body: String, model: &str) -> LlmError {
        if status == StatusCode::NOT_FOUND {
            LlmError::ModelNotFound(model.to_string())
        } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            LlmError::Network(format!("server error {}: {}", status, body))
        } else {
            LlmError::Api(format!("{}: {}", status, body))
        }
    }

    fn messages<'a>(prompt: &'a str, opts: &'a CompletionOptions) -> Vec<ChatMessage<'a>> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = opts.system.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });
        messages
    }

    async fn execute_chat(&self, request: &ChatRequest<'_>) -> Result<String, LlmError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.api_base))
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.completion_timeout)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::status_error(status, body, request.model));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("no choices returned".to_string()))
    }

    /// Extract the token delta from one SSE event line. Returns `None`
    /// once the `[DONE]` sentinel arrives; non-data lines and empty
    /// deltas yield `Some(None)`.
    fn parse_sse_line(line: &str) -> Option<Option<String>> {
        let data = match line.strip_prefix("data:") {
            Some(data) => data.trim(),
            None => return Some(None),
        };
        if data == "[DONE]" {
            return None;
        }
        let delta = serde_json::from_str::<StreamChunk>(data)
            .ok()
            .and_then(|chunk| chunk.choices.into_iter().next())
            .and_then(|c| c.delta.content);
        Some(delta)
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn complete(&self, prompt: &str, opts: &CompletionOptions) -> Result<String, LlmError> {
        let model = opts.model.as_deref().unwrap_or(&self.config.model);
        let request = ChatRequest {
            model,
            messages: Self::messages(prompt, opts),
            temperature: opts.temperature,
            max_tokens: opts.max_tokens,
            stream: false,
        };

        let mut backoff = self.config.initial_backoff;
        let mut last_error = None;

        for attempt in 0..=self.config.completion_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            match self.execute_chat(&request).await {
                Ok(text) => return Ok(text),
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
        let model = opts.model.as_deref().unwrap_or(&self.config.model);
        let request = ChatRequest {
            model,
            messages: Self::messages(prompt, opts),
            temperature: opts.temperature,
            max_tokens: opts.max_tokens,
            stream: true,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.api_base))
            .bearer_auth(&self.config.api_key)
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

        'outer: while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = buffer.find('\n') {
                let line = buffer[..pos].trim().to_string();
                buffer.drain(..=pos);
                if line.is_empty() {
                    continue;
                }
                match Self::parse_sse_line(&line) {
                    Some(Some(token)) => {
                        full.push_str(&token);
                        if tx.send(token).await.is_err() {
                            break 'outer;
                        }
                    }
                    Some(None) => {}
                    None => break 'outer,
                }
            }
        }

        Ok(full)
    }

    async fn embed(&self, text: &str, model: Option<&str>) -> Result<Vec<f32>, LlmError> {
        let model = model.unwrap_or(&self.config.embedding_model);
        let request = EmbeddingsRequest { model, input: text };

        let mut backoff = self.config.initial_backoff;
        let mut last_error = None;

        for attempt in 0..=self.config.embedding_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            let result: Result<Vec<f32>, LlmError> = async {
                let response = self
                    .client
                    .post(format!("{}/embeddings", self.config.api_base))
                    .bearer_auth(&self.config.api_key)
                    .timeout(self.config.embedding_timeout)
                    .json(&request)
                    .send()
                    .await?;

                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(Self::status_error(status, body, model));
                }

                let parsed: EmbeddingsResponse = response
                    .json()
                    .await
                    .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

                parsed
                    .data
                    .into_iter()
                    .next()
                    .map(|d| d.embedding)
                    .ok_or_else(|| LlmError::InvalidResponse("no embedding returned".to_string()))
            }
            .await;

            match result {
                Ok(vector) => return Ok(vector),
                Err(e) if e.is_retryable() => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::Network("retries exhausted".to_string())))
    }

    fn default_model(&self) -> &str {
        &self.config.model
    }

    fn fast_model(&self) -> &str {
        &self.config.fast_model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sse_line() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#;
        assert_eq!(OpenAiBackend::parse_sse_line(line), Some(Some("Hel".into())));

        assert_eq!(OpenAiBackend::parse_sse_line("data: [DONE]"), None);
        assert_eq!(OpenAiBackend::parse_sse_line(": keepalive"), Some(None));

        let empty_delta = r#"data: {"choices":[{"delta":{}}]}"#;
        assert_eq!(OpenAiBackend::parse_sse_line(empty_delta), Some(None));
    }

    #[test]
    fn test_requires_api_key() {
        let result = OpenAiBackend::new(OpenAiConfig::default());
        assert!(matches!(result, Err(LlmError::Configuration(_))));
    }
}

//! Embedding client
//!
//! Thin layer over the LLM backend's embedding endpoint: normalises input
//! text, validates the returned vector, and caches by content digest.
//! Single-item failures propagate; the batch path degrades per item to a
//! zero vector so one bad document cannot sink a full reindex.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

use task_agent_config::constants::embedding;
use task_agent_core::TtlCache;
use task_agent_llm::LlmBackend;

use crate::RagError;

/// Embedding client configuration
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Model passed to the backend
    pub model: String,
    /// Expected vector dimension
    pub dim: usize,
    /// Input truncation limit (characters)
    pub max_chars: usize,
    /// Cache TTL
    pub cache_ttl: Duration,
    /// Batch chunk size
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "nomic-embed-text".to_string(),
            dim: embedding::DIM,
            max_chars: embedding::MAX_CHARS,
            cache_ttl: Duration::from_secs(embedding::CACHE_TTL_SECS),
            batch_size: embedding::BATCH_SIZE,
        }
    }
}

/// Normalise text before embedding.
///
/// Trims, collapses whitespace runs, applies NFC composition, strips
/// control characters other than newline and tab, and truncates to the
/// given limit. Empty input stays empty.
pub fn preprocess_text(text: &str, max_chars: usize) -> String {
    let collapsed = text.trim().split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .nfc()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .take(max_chars)
        .collect()
}

/// Check an embedding is usable: right dimension, finite, not all zero.
fn validate_vector(vector: &[f32], dim: usize) -> Result<(), RagError> {
    if vector.len() != dim {
        return Err(RagError::EmbeddingInvalid(format!(
            "expected dimension {}, got {}",
            dim,
            vector.len()
        )));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(RagError::EmbeddingInvalid(
            "vector contains non-finite values".to_string(),
        ));
    }
    if vector.iter().all(|v| *v == 0.0) {
        return Err(RagError::EmbeddingInvalid("vector is all zeros".to_string()));
    }
    Ok(())
}

/// Embedding client with preprocessing, validation and caching
pub struct EmbeddingClient {
    backend: Arc<dyn LlmBackend>,
    config: EmbeddingConfig,
    cache: Arc<TtlCache<String, Vec<f32>>>,
}

impl EmbeddingClient {
    pub fn new(backend: Arc<dyn LlmBackend>, config: EmbeddingConfig) -> Self {
        let cache = Arc::new(TtlCache::new(config.cache_ttl));
        Self {
            backend,
            config,
            cache,
        }
    }

    /// Vector dimension this client produces
    pub fn dim(&self) -> usize {
        self.config.dim
    }

    /// Embed a single text. Empty input (after preprocessing) is invalid.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let processed = preprocess_text(text, self.config.max_chars);
        if processed.is_empty() {
            return Err(RagError::EmbeddingInvalid("empty input".to_string()));
        }

        let key = digest(&processed);
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached);
        }

        let vector = self
            .backend
            .embed(&processed, Some(&self.config.model))
            .await
            .map_err(|e| RagError::Embedding(e.to_string()))?;

        validate_vector(&vector, self.config.dim)?;

        self.cache.insert(key.clone(), vector.clone());
        self.schedule_eviction(key);
        Ok(vector)
    }

    /// Embed many texts in bounded batches.
    ///
    /// A failed item becomes a zero vector and a warning rather than an
    /// error; the single-item path is the strict one.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut vectors = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(self.config.batch_size.max(1)) {
            let results =
                futures::future::join_all(chunk.iter().map(|text| self.embed(text))).await;

            for (text, result) in chunk.iter().zip(results) {
                match result {
                    Ok(vector) => vectors.push(vector),
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            preview = %text.chars().take(60).collect::<String>(),
                            "embedding failed in batch, substituting zero vector"
                        );
                        vectors.push(vec![0.0; self.config.dim]);
                    }
                }
            }
        }

        Ok(vectors)
    }

    /// Evict the entry once its TTL elapses, instead of waiting for a
    /// lazy-expiry read.
    fn schedule_eviction(&self, key: String) {
        let cache = Arc::clone(&self.cache);
        let ttl = self.config.cache_ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            cache.remove(&key);
        });
    }
}

fn digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use task_agent_llm::{CompletionOptions, LlmError};
    use tokio::sync::mpsc;

    #[test]
    fn test_preprocess_collapses_whitespace() {
        assert_eq!(preprocess_text("  hello   world \n", 100), "hello world");
        assert_eq!(preprocess_text("", 100), "");
        assert_eq!(preprocess_text("abcdef", 3), "abc");
    }

    #[test]
    fn test_validate_vector() {
        assert!(validate_vector(&[0.1, 0.2], 2).is_ok());
        assert!(validate_vector(&[0.1], 2).is_err());
        assert!(validate_vector(&[f32::NAN, 0.2], 2).is_err());
        assert!(validate_vector(&[0.0, 0.0], 2).is_err());
    }

    struct FixedBackend {
        vector: Vec<f32>,
    }

    #[async_trait]
    impl LlmBackend for FixedBackend {
        async fn complete(
            &self,
            _prompt: &str,
            _opts: &CompletionOptions,
        ) -> Result<String, LlmError> {
            Ok(String::new())
        }

        async fn complete_stream(
            &self,
            _prompt: &str,
            _opts: &CompletionOptions,
            _tx: mpsc::Sender<String>,
        ) -> Result<String, LlmError> {
            Ok(String::new())
        }

        async fn embed(&self, _text: &str, _model: Option<&str>) -> Result<Vec<f32>, LlmError> {
            Ok(self.vector.clone())
        }

        fn default_model(&self) -> &str {
            "test"
        }

        fn fast_model(&self) -> &str {
            "test"
        }
    }

    fn client(vector: Vec<f32>, dim: usize) -> EmbeddingClient {
        EmbeddingClient::new(
            Arc::new(FixedBackend { vector }),
            EmbeddingConfig {
                dim,
                ..EmbeddingConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn test_empty_input_fails() {
        let client = client(vec![0.5, 0.5], 2);
        let err = client.embed("   ").await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingInvalid(_)));
    }

    #[tokio::test]
    async fn test_batch_substitutes_zero_vector() {
        // Backend returns a wrong-dimension vector, so every item fails
        // validation; the batch path degrades instead of erroring.
        let client = client(vec![0.5], 2);
        let vectors = client
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors.len(), 2);
        assert!(vectors.iter().all(|v| v == &vec![0.0, 0.0]));
    }

    #[tokio::test]
    async fn test_single_path_is_strict() {
        let client = client(vec![0.5], 2);
        assert!(client.embed("hello").await.is_err());
    }
}

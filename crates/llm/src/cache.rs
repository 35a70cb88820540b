//! Completion caching
//!
//! Wraps any backend and caches non-streaming completions by a digest of
//! (model, prompt, options). Streaming and embedding calls pass through
//! untouched; the embedding client keeps its own cache.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;

use task_agent_core::TtlCache;

use crate::backend::{CompletionOptions, LlmBackend};
use crate::LlmError;

/// Caching wrapper around an [`LlmBackend`]
pub struct CachedLlm {
    inner: Arc<dyn LlmBackend>,
    cache: TtlCache<String, String>,
}

impl CachedLlm {
    pub fn new(inner: Arc<dyn LlmBackend>, ttl: Duration) -> Self {
        Self {
            inner,
            cache: TtlCache::new(ttl),
        }
    }

    /// Hit/miss counters for diagnostics
    pub fn stats(&self) -> &task_agent_core::CacheStats {
        self.cache.stats()
    }

    fn cache_key(&self, prompt: &str, opts: &CompletionOptions) -> String {
        let model = opts
            .model
            .as_deref()
            .unwrap_or_else(|| self.inner.default_model());
        let mut hasher = Sha256::new();
        hasher.update(model.as_bytes());
        hasher.update([0]);
        hasher.update(opts.fingerprint().as_bytes());
        hasher.update([0]);
        hasher.update(prompt.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[async_trait]
impl LlmBackend for CachedLlm {
    async fn complete(&self, prompt: &str, opts: &CompletionOptions) -> Result<String, LlmError> {
        let key = self.cache_key(prompt, opts);
        if let Some(cached) = self.cache.get(&key) {
            tracing::debug!(key = %&key[..12], "completion cache hit");
            return Ok(cached);
        }

        let text = self.inner.complete(prompt, opts).await?;
        self.cache.insert(key, text.clone());
        Ok(text)
    }

    async fn complete_stream(
        &self,
        prompt: &str,
        opts: &CompletionOptions,
        tx: mpsc::Sender<String>,
    ) -> Result<String, LlmError> {
        // Streams are never cached.
        self.inner.complete_stream(prompt, opts, tx).await
    }

    async fn embed(&self, text: &str, model: Option<&str>) -> Result<Vec<f32>, LlmError> {
        self.inner.embed(text, model).await
    }

    fn default_model(&self) -> &str {
        self.inner.default_model()
    }

    fn fast_model(&self) -> &str {
        self.inner.fast_model()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmBackend for CountingBackend {
        async fn complete(
            &self,
            prompt: &str,
            _opts: &CompletionOptions,
        ) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("echo: {}", prompt))
        }

        async fn complete_stream(
            &self,
            prompt: &str,
            opts: &CompletionOptions,
            _tx: mpsc::Sender<String>,
        ) -> Result<String, LlmError> {
            self.complete(prompt, opts).await
        }

        async fn embed(&self, _text: &str, _model: Option<&str>) -> Result<Vec<f32>, LlmError> {
            Ok(vec![0.1, 0.2])
        }

        fn default_model(&self) -> &str {
            "test-model"
        }

        fn fast_model(&self) -> &str {
            "test-model"
        }
    }

    #[tokio::test]
    async fn test_complete_is_cached() {
        let inner = Arc::new(CountingBackend {
            calls: AtomicUsize::new(0),
        });
        let cached = CachedLlm::new(inner.clone(), Duration::from_secs(60));
        let opts = CompletionOptions::default();

        let a = cached.complete("hello", &opts).await.unwrap();
        let b = cached.complete("hello", &opts).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

        // Different options miss the cache.
        let opts2 = CompletionOptions {
            temperature: Some(0.1),
            ..CompletionOptions::default()
        };
        cached.complete("hello", &opts2).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }
}

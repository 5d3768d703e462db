//! HTTP client to the external embedding host, with a model-version guard
//! backed by `_meta.embedding_model`.

use super::cache::EmbeddingCache;
use crate::storage::{Record, Storage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("embedding host request failed: {0}")]
    RequestFailed(String),
    #[error("embedding host returned no vector")]
    EmptyResponse,
}

pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// Generates embeddings via an external HTTP host (e.g. a local Ollama-style
/// server), caching results and degrading callers gracefully rather than
/// raising when the host is unreachable.
pub struct Embedder {
    host: String,
    model: String,
    cache: EmbeddingCache,
    model_mismatch: AtomicBool,
    model_checked: AtomicBool,
    #[cfg(feature = "embeddings")]
    client: reqwest::Client,
}

impl Embedder {
    pub fn new(host: String, model: String, cache_size: usize) -> Self {
        Self {
            host,
            model,
            cache: EmbeddingCache::new(cache_size),
            model_mismatch: AtomicBool::new(false),
            model_checked: AtomicBool::new(false),
            #[cfg(feature = "embeddings")]
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("embedding http client"),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn cache_stats(&self) -> super::cache::CacheStats {
        self.cache.stats()
    }

    pub fn model_mismatch(&self) -> bool {
        self.model_mismatch.load(Ordering::Relaxed)
    }

    /// Compares `self.model` against `_meta.embedding_model`. On first use,
    /// stores the model without warning. On mismatch, flips `model_mismatch`
    /// and logs a warning once -- existing vectors are never deleted here.
    pub fn check_model_consistency(&self, storage: &Storage) -> Result<()> {
        if self.model_checked.swap(true, Ordering::Relaxed) {
            return Ok(());
        }

        let stored = storage
            .get_one("_meta", "key = ?1", &[rusqlite::types::Value::Text("embedding_model".to_string())])
            .map_err(|e| EmbeddingError::RequestFailed(e.to_string()))?
            .and_then(|record| record.get("value").and_then(|v| v.as_str()).map(|s| s.to_string()));

        match stored {
            None => {
                let mut values = Record::new();
                values.insert("key".to_string(), serde_json::json!("embedding_model"));
                values.insert("value".to_string(), serde_json::json!(self.model));
                storage
                    .insert("_meta", &values)
                    .map_err(|e| EmbeddingError::RequestFailed(e.to_string()))?;
            }
            Some(existing) if existing != self.model => {
                self.model_mismatch.store(true, Ordering::Relaxed);
                tracing::warn!(previous = %existing, current = %self.model, "Embedding model changed since last run");
            }
            Some(_) => {}
        }
        Ok(())
    }

    /// Embeds `text`, using and populating the cache. Never panics on a host
    /// failure; callers decide whether to fall back to keyword-only search.
    #[cfg(feature = "embeddings")]
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("text cannot be empty".to_string()));
        }
        if let Some(cached) = self.cache.get(text) {
            return Ok(cached);
        }

        let body = serde_json::json!({ "model": self.model, "prompt": text });
        let response = self
            .client
            .post(format!("{}/api/embeddings", self.host))
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbeddingError::RequestFailed(e.to_string()))?;

        let payload: serde_json::Value = response.json().await.map_err(|e| EmbeddingError::RequestFailed(e.to_string()))?;
        let vector: Vec<f32> = payload
            .get("embedding")
            .and_then(|v| v.as_array())
            .ok_or(EmbeddingError::EmptyResponse)?
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();

        if vector.is_empty() {
            return Err(EmbeddingError::EmptyResponse);
        }

        self.cache.put(text.to_string(), vector.clone());
        Ok(vector)
    }

    #[cfg(not(feature = "embeddings"))]
    pub async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(EmbeddingError::RequestFailed("embeddings feature disabled".to_string()))
    }

    /// Synchronous wrapper around [`Self::embed`] for callers that have no
    /// async runtime of their own (e.g. the write path). Spins up a short-lived
    /// runtime per call rather than requiring one at the top of the process.
    pub fn embed_sync(&self, text: &str) -> Result<Vec<f32>> {
        let runtime = tokio::runtime::Runtime::new().map_err(|e| EmbeddingError::RequestFailed(e.to_string()))?;
        runtime.block_on(self.embed(text))
    }
}

pub fn shared(host: String, model: String, cache_size: usize) -> Arc<Embedder> {
    Arc::new(Embedder::new(host, model, cache_size))
}

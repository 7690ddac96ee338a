//! Skeleton embeddings via an OpenAI-compatible API
//!
//! Embeds masked question skeletons for the semantic funnel stage.
//! Recently embedded texts are served from an in-process LRU cache.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

use crate::config::Config;

/// Embedding model configuration
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Model name
    pub model_name: String,
    /// API base URL
    pub base_url: String,
    /// API key
    pub api_key: String,
    /// Maximum input length in tokens (input is truncated near this budget)
    pub max_length: usize,
}

impl EmbeddingConfig {
    pub fn new(model_name: String, base_url: String, api_key: String) -> Self {
        Self {
            model_name,
            base_url,
            api_key,
            max_length: 8000,
        }
    }
}

/// Embedding model wrapper with an LRU result cache
pub struct EmbeddingModel {
    config: EmbeddingConfig,
    client: Client,
    /// Cache for recently computed embeddings
    cache: Arc<RwLock<lru::LruCache<String, Vec<f32>>>>,
}

impl EmbeddingModel {
    /// Create a new embedding model with the given configuration
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        let cache = Arc::new(RwLock::new(lru::LruCache::new(
            std::num::NonZeroUsize::new(1000)
                .context("Embedding cache capacity must be non-zero")?,
        )));

        Ok(Self {
            config,
            client,
            cache,
        })
    }

    /// Create from configuration; the API key comes from the environment
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.llm.resolve_api_key()?;
        Self::new(EmbeddingConfig::new(
            config.llm.embedding_model.clone(),
            config.llm.base_url.clone(),
            api_key,
        ))
    }

    /// Generate an embedding for the given text
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let cache_key = cache_key(text);
        {
            let mut cache = self.cache.write().await;
            if let Some(cached) = cache.get(&cache_key) {
                return Ok(cached.clone());
            }
        }

        let embedding = self.embed_via_api(text).await?;

        {
            let mut cache = self.cache.write().await;
            cache.put(cache_key, embedding.clone());
        }

        Ok(embedding)
    }

    async fn embed_via_api(&self, text: &str) -> Result<Vec<f32>> {
        let text = self.truncate_text(text);

        let request = EmbeddingRequest {
            model: self.config.model_name.clone(),
            input: vec![text.to_string()],
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request)
            .send()
            .await
            .context("Failed to send embedding request")?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!("Embedding API error: {}", error_text);
            return Err(anyhow::anyhow!("Embedding API error: {}", error_text));
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .context("Failed to parse embedding response")?;

        let embedding = result
            .data
            .first()
            .map(|d| d.embedding.clone())
            .ok_or_else(|| anyhow::anyhow!("No embedding in response"))?;

        Ok(embedding)
    }

    /// Truncate text to the model's input budget, on a char boundary.
    /// Rough estimate: 4 chars per token.
    fn truncate_text<'a>(&self, text: &'a str) -> &'a str {
        let max_chars = self.config.max_length * 4;
        if text.len() <= max_chars {
            return text;
        }
        let mut end = max_chars;
        while end > 0 && !text.is_char_boundary(end) {
            end -= 1;
        }
        &text[..end]
    }

    /// Get the model name
    pub fn model_name(&self) -> &str {
        &self.config.model_name
    }
}

/// Cache key for an embedding input
fn cache_key(text: &str) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    format!("{:x}", hasher.finish())
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[allow(dead_code)]
    #[serde(default)]
    index: i32,
}

/// Calculate cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        let c = vec![0.0, 1.0, 0.0];

        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);
        assert!((cosine_similarity(&a, &c) - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_cosine_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_cache_key_deterministic() {
        assert_eq!(cache_key("what is __"), cache_key("what is __"));
        assert_ne!(cache_key("what is __"), cache_key("where is __"));
    }

    #[test]
    fn test_truncate_text() {
        let config = EmbeddingConfig {
            model_name: "m".to_string(),
            base_url: "http://localhost".to_string(),
            api_key: "k".to_string(),
            max_length: 1,
        };
        let model = EmbeddingModel::new(config).unwrap();
        let long = "abcdefghij";
        assert_eq!(model.truncate_text(long), "abcd");
        assert_eq!(model.truncate_text("ab"), "ab");
    }
}

//! Embedding provider implementations.
//!
//! Concrete backends for [`ragchat_core::embedding::EmbeddingProvider`]:
//! - **[`OllamaEmbedder`]**: `POST {url}/api/embed` on a local Ollama instance.
//! - **[`OpenAIEmbedder`]**: `POST {url}/v1/embeddings`, key from `OPENAI_API_KEY`.
//! - **[`HashedEmbedder`]**: deterministic feature-hashed term vectors; no network.
//! - **[`DisabledEmbedder`]**: always fails; used when embeddings are off.
//!
//! Network providers split input into `batch_size` requests and retry
//! transient failures (see [`crate::http`]).
//!
//! # Provider Selection
//!
//! ```rust
//! # use ragchat::config::EmbeddingConfig;
//! # use ragchat::embedding::create_provider;
//! # use ragchat_core::embedding::EmbeddingProvider;
//! let config = EmbeddingConfig {
//!     provider: "hashed".to_string(),
//!     dims: 64,
//!     ..EmbeddingConfig::default()
//! };
//! let provider = create_provider(&config).unwrap();
//! assert_eq!(provider.dims(), 64);
//! ```

use anyhow::{bail, Result};
use async_trait::async_trait;
use ragchat_core::embedding::EmbeddingProvider;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::EmbeddingConfig;
use crate::http::JsonClient;

const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";
const OPENAI_DEFAULT_URL: &str = "https://api.openai.com";

/// Create the embedding provider named by `config.provider`.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        "hashed" => Ok(Arc::new(HashedEmbedder::new(config.dims))),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Disabled ============

pub struct DisabledEmbedder;

#[async_trait]
impl EmbeddingProvider for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.")
    }
}

// ============ Ollama ============

/// Embeds through a local Ollama instance.
///
/// Requires the model to be pulled first (e.g. `ollama pull mxbai-embed-large`).
pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    url: String,
    batch_size: usize,
    client: JsonClient,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            dims: config.dims,
            url: base_url(config.url.as_deref(), OLLAMA_DEFAULT_URL),
            batch_size: config.batch_size.max(1),
            client: JsonClient::new("Ollama", config.timeout_secs, config.max_retries)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let endpoint = format!("{}/api/embed", self.url);
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let body = serde_json::json!({
                "model": self.model,
                "input": batch,
            });
            let json = self.client.post(&endpoint, None, &body).await?;
            out.extend(parse_ollama_response(&json)?);
        }
        Ok(out)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|embedding| {
            embedding
                .as_array()
                .map(|values| to_f32_vec(values))
                .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: embedding is not an array"))
        })
        .collect()
}

// ============ OpenAI ============

/// Embeds through an OpenAI-compatible `/v1/embeddings` endpoint.
pub struct OpenAIEmbedder {
    model: String,
    dims: usize,
    url: String,
    api_key: String,
    batch_size: usize,
    client: JsonClient,
}

impl OpenAIEmbedder {
    /// # Errors
    ///
    /// Fails if `OPENAI_API_KEY` is not set.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            model: config.model.clone(),
            dims: config.dims,
            url: base_url(config.url.as_deref(), OPENAI_DEFAULT_URL),
            api_key,
            batch_size: config.batch_size.max(1),
            client: JsonClient::new("OpenAI", config.timeout_secs, config.max_retries)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let endpoint = format!("{}/v1/embeddings", self.url);
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let body = serde_json::json!({
                "model": self.model,
                "input": batch,
            });
            let json = self
                .client
                .post(&endpoint, Some(&self.api_key), &body)
                .await?;
            out.extend(parse_openai_response(&json)?);
        }
        Ok(out)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        indexed.push((index, to_f32_vec(embedding)));
    }
    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Hashed ============

/// Deterministic bag-of-words embedder.
///
/// Terms are lowercased alphanumeric runs of two or more characters, hashed
/// with FNV-1a into `dims` buckets, weighted by term frequency, and the
/// vector is L2-normalised. Texts sharing vocabulary score high; there is
/// no notion of synonyms.
pub struct HashedEmbedder {
    dims: usize,
    name: String,
}

impl HashedEmbedder {
    pub fn new(dims: usize) -> Self {
        let dims = dims.max(1);
        Self {
            dims,
            name: format!("hashed-{}", dims),
        }
    }

    fn bucket(&self, term: &str) -> usize {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in term.as_bytes() {
            h ^= *b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        (h % self.dims as u64) as usize
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let mut counts: HashMap<String, f32> = HashMap::new();
        for term in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.chars().count() >= 2)
        {
            *counts.entry(term.to_lowercase()).or_default() += 1.0;
        }

        let mut vec = vec![0.0f32; self.dims];
        for (term, count) in &counts {
            vec[self.bucket(term)] += count;
        }

        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vec {
                *v /= norm;
            }
        }
        vec
    }
}

#[async_trait]
impl EmbeddingProvider for HashedEmbedder {
    fn model_name(&self) -> &str {
        &self.name
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}

// ============ Helpers ============

pub(crate) fn base_url(configured: Option<&str>, default: &str) -> String {
    configured.unwrap_or(default).trim_end_matches('/').to_string()
}

fn to_f32_vec(values: &[serde_json::Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragchat_core::embedding::cosine_similarity;

    #[test]
    fn test_parse_ollama_response() {
        let json = serde_json::json!({ "embeddings": [[0.1, 0.2], [0.3, 0.4]] });
        let vecs = parse_ollama_response(&json).unwrap();
        assert_eq!(vecs.len(), 2);
        assert!((vecs[1][0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_parse_ollama_missing_field() {
        let json = serde_json::json!({ "embedding": [0.1] });
        assert!(parse_ollama_response(&json).is_err());
    }

    #[test]
    fn test_parse_openai_orders_by_index() {
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [2.0] },
                { "index": 0, "embedding": [1.0] }
            ]
        });
        let vecs = parse_openai_response(&json).unwrap();
        assert_eq!(vecs, vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn test_base_url_trims_slash() {
        assert_eq!(base_url(Some("http://host:1/"), OLLAMA_DEFAULT_URL), "http://host:1");
        assert_eq!(base_url(None, OLLAMA_DEFAULT_URL), OLLAMA_DEFAULT_URL);
    }

    #[tokio::test]
    async fn test_hashed_is_deterministic_and_normalised() {
        let e = HashedEmbedder::new(128);
        let texts = vec!["Refund policy for annual plans".to_string()];
        let a = e.embed(&texts).await.unwrap();
        let b = e.embed(&texts).await.unwrap();
        assert_eq!(a, b);
        let norm: f32 = a[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_hashed_shared_terms_score_higher() {
        let e = HashedEmbedder::new(256);
        let vecs = e
            .embed(&[
                "refund policy".to_string(),
                "what is the refund policy".to_string(),
                "kubernetes cluster setup".to_string(),
            ])
            .await
            .unwrap();
        let related = cosine_similarity(&vecs[0], &vecs[1]);
        let unrelated = cosine_similarity(&vecs[0], &vecs[2]);
        assert!(related > unrelated);
    }

    #[tokio::test]
    async fn test_hashed_empty_text_is_zero_vector() {
        let e = HashedEmbedder::new(16);
        let v = e.embed(&["".to_string()]).await.unwrap();
        assert!(v[0].iter().all(|&x| x == 0.0));
    }

    #[tokio::test]
    async fn test_disabled_fails() {
        assert!(DisabledEmbedder.embed(&["x".to_string()]).await.is_err());
    }

    #[test]
    fn test_create_provider_by_name() {
        let config = EmbeddingConfig {
            provider: "hashed".to_string(),
            dims: 32,
            ..EmbeddingConfig::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "hashed-32");

        let config = EmbeddingConfig {
            provider: "nope".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(create_provider(&config).is_err());
    }
}

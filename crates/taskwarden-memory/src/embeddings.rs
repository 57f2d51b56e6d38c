use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use taskwarden_core::config::EmbeddingConfig;
use taskwarden_core::error::{Result, TaskwardenError};

/// Trait for embedding providers (OpenAI-compatible APIs).
pub trait EmbeddingProvider: Send + Sync + 'static {
    /// Embed a batch of texts into vectors, one per input, in input order.
    fn embed(&self, texts: &[String]) -> BoxFuture<'_, Result<Vec<Vec<f32>>>>;

    /// Number of dimensions in the embedding vectors.
    fn dimensions(&self) -> usize;

    fn embed_one(&self, text: &str) -> BoxFuture<'_, Result<Vec<f32>>> {
        let texts = vec![text.to_string()];
        Box::pin(async move {
            self.embed(&texts)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| TaskwardenError::Embedding("empty embedding response".into()))
        })
    }
}

/// HTTP-based embedding provider compatible with OpenAI, Ollama, etc.
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dims: usize,
}

impl HttpEmbeddingProvider {
    pub fn new(base_url: &str, api_key: Option<&str>, model: &str, dims: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(String::from),
            model: model.to_string(),
            dims,
        }
    }

    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self::new(
            &config.resolved_base_url(),
            config.api_key.as_deref(),
            &config.model,
            config.dimensions,
        )
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl EmbeddingProvider for HttpEmbeddingProvider {
    fn embed(&self, texts: &[String]) -> BoxFuture<'_, Result<Vec<Vec<f32>>>> {
        let texts = texts.to_vec();
        Box::pin(async move {
            let url = format!("{}/embeddings", self.base_url);
            let expected = texts.len();

            let mut req = self.client.post(&url).json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            });
            if let Some(ref key) = self.api_key {
                req = req.bearer_auth(key);
            }

            let resp = req
                .send()
                .await
                .map_err(|e| TaskwardenError::Embedding(format!("request failed: {}", e)))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(TaskwardenError::Embedding(format!(
                    "API error {}: {}",
                    status, body
                )));
            }

            let mut body: EmbeddingResponse = resp.json().await.map_err(|e| {
                TaskwardenError::Embedding(format!("failed to parse response: {}", e))
            })?;

            if body.data.len() != expected {
                return Err(TaskwardenError::Embedding(format!(
                    "expected {} embeddings, got {}",
                    expected,
                    body.data.len()
                )));
            }
            body.data.sort_by_key(|d| d.index);
            Ok(body.data.into_iter().map(|d| d.embedding).collect())
        })
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b.iter())
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

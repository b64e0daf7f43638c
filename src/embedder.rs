//! Embedding backends.
//!
//! Defines the [`TextEmbedder`] trait and the concrete backends:
//! - **`local`** — fastembed running the `all-MiniLM-L6-v2` family on the
//!   blocking pool; no network calls after the first model download.
//! - **`ollama`** — a local Ollama instance's `/api/embed` endpoint with
//!   exponential-backoff retry (1s, 2s, 4s, … capped at 32s): HTTP 429 and
//!   5xx retry, other 4xx fail immediately, network errors retry.
//! - **`mock`** — deterministic hash-derived vectors for tests and offline
//!   runs; no model involved.
//! - **`disabled`** — always errors; index build then requires a usable
//!   embedding cache.
//!
//! All vectors leaving this module are L2-normalized, so cosine similarity
//! downstream reduces to a dot product.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::EmbedError;

/// A sentence-embedding backend producing fixed-dimension vectors.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    /// Backend identifier used in logs and error messages.
    fn backend_name(&self) -> &str;

    /// Vector dimensionality (384 for the MiniLM family).
    fn dims(&self) -> usize;

    /// Embed a batch of texts, one unit vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// Embed a single query text.
pub async fn embed_query(
    embedder: &dyn TextEmbedder,
    text: &str,
) -> Result<Vec<f32>, EmbedError> {
    let vectors = embedder.embed_batch(&[text.to_string()]).await?;
    vectors
        .into_iter()
        .next()
        .ok_or_else(|| EmbedError::CountMismatch {
            expected: 1,
            actual: 0,
        })
}

/// Scale a vector to unit length. Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// Instantiate the backend named by the configuration.
pub fn from_config(config: &EmbeddingConfig) -> anyhow::Result<Arc<dyn TextEmbedder>> {
    match config.provider.as_str() {
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => anyhow::bail!(
            "the `local` provider requires building with --features local-embeddings; \
             use the `ollama` provider otherwise"
        ),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        "mock" => Ok(Arc::new(MockEmbedder::new(config.dims))),
        "disabled" => Ok(Arc::new(DisabledEmbedder { dims: config.dims })),
        other => anyhow::bail!("Unknown embedding provider: {}", other),
    }
}

fn backend_error(backend: &str, message: impl ToString) -> EmbedError {
    EmbedError::Backend {
        backend: backend.to_string(),
        message: message.to_string(),
    }
}

/// Validate shape, then normalize every row in place.
fn finish_batch(
    mut vectors: Vec<Vec<f32>>,
    expected_count: usize,
    expected_dims: usize,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    if vectors.len() != expected_count {
        return Err(EmbedError::CountMismatch {
            expected: expected_count,
            actual: vectors.len(),
        });
    }
    for vector in &mut vectors {
        if vector.len() != expected_dims {
            return Err(EmbedError::DimensionMismatch {
                expected: expected_dims,
                actual: vector.len(),
            });
        }
        l2_normalize(vector);
    }
    Ok(vectors)
}

// ============ Local (fastembed) ============

/// Local inference via fastembed. The model is loaded once and shared;
/// inference runs on the blocking pool because ORT calls are CPU-bound.
#[cfg(feature = "local-embeddings")]
pub struct LocalEmbedder {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: Arc<std::sync::Mutex<fastembed::TextEmbedding>>,
}

#[cfg(feature = "local-embeddings")]
impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let fastembed_model = match config.model.as_str() {
            "all-minilm-l6-v2" => fastembed::EmbeddingModel::AllMiniLML6V2,
            "bge-small-en-v1.5" => fastembed::EmbeddingModel::BGESmallENV15,
            "multilingual-e5-small" => fastembed::EmbeddingModel::MultilingualE5Small,
            other => anyhow::bail!(
                "Unknown local embedding model: '{}'. Supported models: \
                 all-minilm-l6-v2, bge-small-en-v1.5, multilingual-e5-small",
                other
            ),
        };

        let model = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
        )
        .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;

        Ok(Self {
            model_name: config.model.clone(),
            dims: config.dims,
            batch_size: config.batch_size,
            model: Arc::new(std::sync::Mutex::new(model)),
        })
    }
}

#[cfg(feature = "local-embeddings")]
#[async_trait]
impl TextEmbedder for LocalEmbedder {
    fn backend_name(&self) -> &str {
        "local"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let texts = texts.to_vec();
        let expected = texts.len();
        let model = Arc::clone(&self.model);
        let batch_size = self.batch_size;

        let vectors = tokio::task::spawn_blocking(move || {
            let mut guard = model
                .lock()
                .map_err(|_| backend_error("local", "embedding model mutex poisoned"))?;
            guard
                .embed(texts, Some(batch_size))
                .map_err(|e| backend_error("local", e))
        })
        .await
        .map_err(|e| backend_error("local", e))??;

        finish_batch(vectors, expected, self.dims)
    }
}

#[cfg(feature = "local-embeddings")]
impl std::fmt::Debug for LocalEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEmbedder")
            .field("model", &self.model_name)
            .field("dims", &self.dims)
            .finish()
    }
}

// ============ Ollama ============

/// Embedding via a local Ollama instance (`ollama pull all-minilm` first).
#[derive(Debug)]
pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    url: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            dims: config.dims,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            max_retries: config.max_retries,
            client,
        })
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let response = match self
                .client
                .post(format!("{}/api/embed", self.url))
                .json(&body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    last_err = Some(backend_error(
                        "ollama",
                        format!("connection error (is Ollama running at {}?): {}", self.url, e),
                    ));
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                let json: serde_json::Value = response
                    .json()
                    .await
                    .map_err(|e| backend_error("ollama", e))?;
                return parse_ollama_response(&json);
            }

            let body_text = response.text().await.unwrap_or_default();
            let err = backend_error("ollama", format!("HTTP {}: {}", status, body_text));
            if status.as_u16() == 429 || status.is_server_error() {
                last_err = Some(err);
                continue;
            }
            return Err(err);
        }

        Err(last_err
            .unwrap_or_else(|| backend_error("ollama", "embedding failed after retries")))
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbedError> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| backend_error("ollama", "response missing embeddings array"))?;

    let mut result = Vec::with_capacity(embeddings.len());
    for embedding in embeddings {
        let vector: Vec<f32> = embedding
            .as_array()
            .ok_or_else(|| backend_error("ollama", "embedding is not an array"))?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        result.push(vector);
    }
    Ok(result)
}

#[async_trait]
impl TextEmbedder for OllamaEmbedder {
    fn backend_name(&self) -> &str {
        "ollama"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let vectors = self.request(texts).await?;
        finish_batch(vectors, texts.len(), self.dims)
    }
}

// ============ Mock ============

/// Deterministic embedder deriving vectors from a text hash.
///
/// Vectors are stable across runs, so tests can assert on ordering and
/// arithmetic without downloading a model. They carry no semantics.
#[derive(Debug)]
pub struct MockEmbedder {
    dims: usize,
}

impl MockEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let hash = text
            .bytes()
            .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));

        let mut vector = vec![0.0f32; self.dims];
        for (i, value) in vector.iter_mut().enumerate() {
            *value = ((hash.wrapping_add(i as u64) % 1000) as f32 / 1000.0) - 0.5;
        }
        l2_normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl TextEmbedder for MockEmbedder {
    fn backend_name(&self) -> &str {
        "mock"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

// ============ Disabled ============

/// Backend that always errors. With this configured, the index can only be
/// built from a pre-existing cache.
#[derive(Debug)]
pub struct DisabledEmbedder {
    pub dims: usize,
}

#[async_trait]
impl TextEmbedder for DisabledEmbedder {
    fn backend_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Err(EmbedError::Disabled)
    }
}

//! The immutable search index.
//!
//! A [`SearchIndex`] is built once at startup from the two snapshots and is
//! then shared read-only (behind an `Arc`) by every query: the record array,
//! the embedding matrix, and the corpus word set. No mutable globals, no
//! locking on the query path.
//!
//! Cache policy on build:
//! 1. a cache with matching shape and fingerprint is loaded as-is;
//! 2. otherwise embeddings are recomputed and the cache overwritten;
//! 3. if recomputation fails but a shape-compatible stale cache exists, the
//!    stale matrix is used (logged as a warning);
//! 4. with neither a backend nor a usable cache, the build fails.

use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

use crate::cache;
use crate::config::{Config, EmbeddingConfig};
use crate::embedder::{l2_normalize, TextEmbedder};
use crate::error::{CacheError, EmbedError};
use crate::loader::{self, Catalog};
use crate::models::{Offer, Record};

/// Row-major `(rows × dim)` matrix of unit vectors, one row per record.
#[derive(Debug, Clone)]
pub struct EmbeddingMatrix {
    rows: usize,
    dim: usize,
    data: Vec<f32>,
}

impl EmbeddingMatrix {
    pub fn new(rows: usize, dim: usize, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), rows * dim);
        Self { rows, dim, data }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn row(&self, index: usize) -> &[f32] {
        &self.data[index * self.dim..(index + 1) * self.dim]
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

/// Everything a query needs, constructed once and never mutated.
#[derive(Debug)]
pub struct SearchIndex {
    pub offers: Vec<Offer>,
    pub records: Vec<Record>,
    pub embeddings: EmbeddingMatrix,
    /// Every token appearing in any record field; the gibberish gate's
    /// admission set.
    pub corpus: HashSet<String>,
}

impl SearchIndex {
    /// Load the snapshots named by the config and build the index.
    pub async fn build(config: &Config, embedder: &dyn TextEmbedder) -> anyhow::Result<Self> {
        let catalog = loader::load_catalog(&config.data.deals_path, &config.data.products_path)?;
        Self::from_catalog(catalog, &config.embedding, embedder).await
    }

    /// Build the index from an already-loaded catalog.
    pub async fn from_catalog(
        catalog: Catalog,
        embedding_config: &EmbeddingConfig,
        embedder: &dyn TextEmbedder,
    ) -> anyhow::Result<Self> {
        let Catalog { offers, records } = catalog;

        let texts: Vec<String> = records.iter().map(|r| r.embed_text.clone()).collect();
        let embeddings = resolve_embeddings(
            &embedding_config.cache_path,
            embedding_config.dims,
            &texts,
            embedder,
        )
        .await?;

        let corpus: HashSet<String> = records
            .iter()
            .flat_map(|record| record.fields.iter())
            .flat_map(|field| field.tokens.iter().cloned())
            .collect();

        info!(
            offers = offers.len(),
            records = records.len(),
            corpus_words = corpus.len(),
            dim = embeddings.dim(),
            "search index ready"
        );

        Ok(Self {
            offers,
            records,
            embeddings,
            corpus,
        })
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// The offer a record belongs to.
    pub fn offer_of(&self, record: &Record) -> &Offer {
        &self.offers[record.offer_idx]
    }
}

async fn resolve_embeddings(
    cache_path: &Path,
    dims: usize,
    texts: &[String],
    embedder: &dyn TextEmbedder,
) -> anyhow::Result<EmbeddingMatrix> {
    let fp = cache::fingerprint(texts);

    match cache::load(cache_path, texts.len(), dims, &fp) {
        Ok(matrix) => {
            info!(
                path = %cache_path.display(),
                fingerprint = %hex::encode(&fp[..8]),
                "embedding cache hit"
            );
            return Ok(matrix);
        }
        Err(CacheError::Io(ref e)) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %cache_path.display(), "no embedding cache, computing embeddings");
        }
        Err(err) => {
            warn!(%err, "embedding cache unusable, recomputing");
        }
    }

    match compute_embeddings(embedder, texts, dims).await {
        Ok(matrix) => {
            if let Err(err) = cache::store(cache_path, &fp, &matrix) {
                warn!(%err, path = %cache_path.display(), "failed to write embedding cache");
            }
            Ok(matrix)
        }
        Err(embed_err) => match cache::load_stale(cache_path, texts.len(), dims) {
            Ok(matrix) => {
                warn!(
                    %embed_err,
                    "embedding backend unavailable, falling back to stale cache"
                );
                Ok(matrix)
            }
            Err(_) => Err(anyhow::Error::new(embed_err)
                .context("embedding backend failed and no usable cache exists")),
        },
    }
}

async fn compute_embeddings(
    embedder: &dyn TextEmbedder,
    texts: &[String],
    dims: usize,
) -> Result<EmbeddingMatrix, EmbedError> {
    if texts.is_empty() {
        return Ok(EmbeddingMatrix::new(0, dims, Vec::new()));
    }

    let vectors = embedder.embed_batch(texts).await?;
    if vectors.len() != texts.len() {
        return Err(EmbedError::CountMismatch {
            expected: texts.len(),
            actual: vectors.len(),
        });
    }

    let mut data = Vec::with_capacity(texts.len() * dims);
    for mut vector in vectors {
        if vector.len() != dims {
            return Err(EmbedError::DimensionMismatch {
                expected: dims,
                actual: vector.len(),
            });
        }
        // No-op for rows that are already unit length.
        l2_normalize(&mut vector);
        data.extend_from_slice(&vector);
    }

    Ok(EmbeddingMatrix::new(texts.len(), dims, data))
}

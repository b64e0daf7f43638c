//! The query engine: gibberish gate, parallel scorer fan-out, ranking,
//! and batched emission.
//!
//! A [`SearchEngine`] owns a shared reference to the immutable
//! [`SearchIndex`] plus the embedding backend for query vectors. Per query
//! the three scorers run as independent tasks — keyword and fuzzy on the
//! blocking pool (pure CPU passes over the record set), semantic after an
//! async query embedding — and are joined before the ranker runs on the
//! caller's task.
//!
//! Scorers never share mutable state: each returns a freshly allocated
//! score vector over the full record index space. Dropping the search
//! future cancels the query at the join boundary without mutating anything
//! shared.
//!
//! Queries are never errors. An empty query, a gibberish query, and a
//! query-time embedding failure (semantic degraded to zero, logged) all
//! produce ordinary — possibly empty — result lists.

use std::sync::Arc;
use tokio_stream::Stream;
use tracing::{debug, warn};

use crate::config::{Config, RetrievalConfig};
use crate::embedder::{self, TextEmbedder};
use crate::index::SearchIndex;
use crate::keyword;
use crate::models::DealResult;
use crate::ranker;
use crate::{fuzzy, semantic};

/// Normalized fuzzy score strong enough to pass the gibberish gate
/// (raw partial ratio 80).
const GATE_FUZZY_FLOOR: f64 = 0.8;

pub struct SearchEngine {
    index: Arc<SearchIndex>,
    embedder: Arc<dyn TextEmbedder>,
    retrieval: RetrievalConfig,
}

impl SearchEngine {
    pub fn new(
        index: Arc<SearchIndex>,
        embedder: Arc<dyn TextEmbedder>,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            index,
            embedder,
            retrieval,
        }
    }

    /// Build the backend and index named by the configuration, then wrap
    /// them in an engine. The usual entry point for the CLI.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let embedder = embedder::from_config(&config.embedding)?;
        let index = SearchIndex::build(config, embedder.as_ref()).await?;
        Ok(Self::new(Arc::new(index), embedder, config.retrieval.clone()))
    }

    pub fn index(&self) -> &SearchIndex {
        &self.index
    }

    /// Configured default result limit.
    pub fn top_k(&self) -> usize {
        self.retrieval.top_k
    }

    /// Rank all deals matching `query`, best first.
    pub async fn search(&self, query: &str, top_k: usize) -> Vec<DealResult> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }

        let (keyword_scores, fuzzy_scores, semantic_scores) = self.score_all(query).await;

        if self.is_gibberish(query, &keyword_scores, &fuzzy_scores) {
            debug!(query, "query rejected by gibberish gate");
            return Vec::new();
        }

        ranker::rank(
            &self.index,
            &keyword_scores,
            &fuzzy_scores,
            &semantic_scores,
            query,
            top_k,
        )
    }

    /// Rank and emit results in monotonically score-descending batches.
    ///
    /// The stream holds only the finished, sorted list; a batch once
    /// emitted is never revised.
    pub async fn search_stream(
        &self,
        query: &str,
        top_k: usize,
    ) -> impl Stream<Item = Vec<DealResult>> {
        let results = self.search(query, top_k).await;
        tokio_stream::iter(ranker::into_batches(
            results,
            self.retrieval.stream_batch_size,
        ))
    }

    /// Multi-query mode for externally expanded terms: full ranking per
    /// term, merged by offer with a per-term match reward and a stricter
    /// cutoff.
    pub async fn search_expanded(&self, terms: &[String], top_k: usize) -> Vec<DealResult> {
        let mut per_term = Vec::with_capacity(terms.len());
        for term in terms {
            let results = self.search(term, top_k).await;
            if !results.is_empty() {
                per_term.push(results);
            }
        }
        ranker::merge_expanded(per_term, top_k)
    }

    /// Fan out the three scorers and join their score vectors.
    async fn score_all(&self, query: &str) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let record_count = self.index.record_count();

        let keyword_index = Arc::clone(&self.index);
        let keyword_query = query.to_string();
        let keyword_task = tokio::task::spawn_blocking(move || {
            keyword::score(&keyword_index.records, &keyword_query)
        });

        let fuzzy_index = Arc::clone(&self.index);
        let fuzzy_query = query.to_string();
        let fuzzy_task =
            tokio::task::spawn_blocking(move || fuzzy::score(&fuzzy_index.records, &fuzzy_query));

        let semantic_scores = async {
            match embedder::embed_query(self.embedder.as_ref(), query).await {
                Ok(vector) => semantic::score(&self.index.embeddings, &vector),
                Err(err) => {
                    warn!(%err, "semantic scorer degraded to zero for this query");
                    vec![0.0; record_count]
                }
            }
        };

        let (keyword_result, fuzzy_result, semantic_scores) =
            tokio::join!(keyword_task, fuzzy_task, semantic_scores);

        // A scorer task only fails on panic or runtime teardown; degrade to
        // zeros rather than surfacing an error to the caller.
        let keyword_scores = keyword_result.unwrap_or_else(|err| {
            warn!(%err, "keyword scorer task failed");
            vec![0.0; record_count]
        });
        let fuzzy_scores = fuzzy_result.unwrap_or_else(|err| {
            warn!(%err, "fuzzy scorer task failed");
            vec![0.0; record_count]
        });

        (keyword_scores, fuzzy_scores, semantic_scores)
    }

    /// A query is gibberish when the exact scorer found nothing, no record
    /// aligns strongly under fuzzy matching, and none of its words exist in
    /// the corpus. Without this gate, nonsense queries would surface
    /// semantic noise.
    fn is_gibberish(&self, query: &str, keyword_scores: &[f64], fuzzy_scores: &[f64]) -> bool {
        if keyword_scores.iter().any(|&score| score > 0.0) {
            return false;
        }
        if fuzzy_scores.iter().any(|&score| score >= GATE_FUZZY_FLOOR) {
            return false;
        }
        !keyword::query_words(query)
            .iter()
            .any(|word| self.index.corpus.contains(word.as_str()))
    }
}

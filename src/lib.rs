//! # Dealfinder
//!
//! **A hybrid retrieval engine for grocery deal catalogs.**
//!
//! Dealfinder joins a deals snapshot with its qualifying-products snapshot,
//! flattens the join into searchable records, and answers free-text queries
//! by fusing three disjoint matching strategies — exact keyword, fuzzy
//! string alignment, and dense-vector semantic similarity — into a single
//! composite score with adaptive cutoffs.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐   ┌──────────────┐   ┌─────────────────┐
//! │  Snapshots    │──▶│    Loader     │──▶│   SearchIndex    │
//! │ deals+products│   │ join+flatten │   │ records+vectors │
//! └───────────────┘   └──────────────┘   └────────┬────────┘
//!                                                 │
//!                     ┌──────────┬────────────────┤
//!                     ▼          ▼                ▼
//!                ┌─────────┐ ┌───────┐      ┌──────────┐
//!                │ Keyword │ │ Fuzzy │      │ Semantic │
//!                └────┬────┘ └───┬───┘      └────┬─────┘
//!                     └──────────┼───────────────┘
//!                                ▼
//!                           ┌────────┐
//!                           │ Ranker │──▶ ranked DealResults
//!                           └────────┘
//! ```
//!
//! ## Query Flow
//!
//! 1. The **loader** ([`loader`]) parses both snapshots, joins them by
//!    `offer_id`, and emits one [`models::Record`] per (offer, product)
//!    pair plus one per product-less offer.
//! 2. The **index** ([`index`]) embeds every record (384-dim unit vectors,
//!    cached on disk keyed by a SHA-256 content hash — see [`cache`]) and
//!    collects the corpus word set.
//! 3. Per query, the **engine** ([`search`]) fans out the three scorers
//!    ([`keyword`], [`fuzzy`], [`semantic`]) in parallel, gates gibberish,
//!    and hands the score vectors to the **ranker** ([`ranker`]) for
//!    fusion, grouping, boosts, and the adaptive cutoff.
//! 4. Results stream in monotonically ordered batches for incremental
//!    transports.
//!
//! ## Scoring
//!
//! | Scorer | Signal | Scale |
//! |--------|--------|-------|
//! | `keyword` | field-weighted exact word/substring matches | `[0, ~5]`, normalized per query |
//! | `fuzzy` | partial-ratio alignment against offer/product names | `[0, 1]`, floor at raw 60 |
//! | `semantic` | cosine similarity of MiniLM embeddings | `[0, 1]` |
//!
//! Composite: `0.50·keyword + 0.25·fuzzy + 0.25·semantic`, then the
//! record- and deal-level adjustments described in [`ranker`].
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types: `Offer`, `Product`, `Record`, `DealResult` |
//! | [`error`] | Load, cache, and embedding error taxonomy |
//! | [`loader`] | Snapshot parsing, offer/product join, record building |
//! | [`index`] | Immutable search index: records, embeddings, corpus set |
//! | [`embedder`] | Embedding backends: fastembed, Ollama, mock, disabled |
//! | [`cache`] | Binary embedding cache with SHA-256 integrity |
//! | [`keyword`] | Field-weighted exact keyword scorer |
//! | [`fuzzy`] | Partial-ratio fuzzy scorer |
//! | [`semantic`] | Dense-vector semantic scorer |
//! | [`ranker`] | Fusion, adjustments, grouping, cutoffs, multi-query merge |
//! | [`search`] | Query engine: gate, parallel fan-out, streaming |

pub mod cache;
pub mod config;
pub mod embedder;
pub mod error;
pub mod fuzzy;
pub mod index;
pub mod keyword;
pub mod loader;
pub mod models;
pub mod ranker;
pub mod search;
pub mod semantic;

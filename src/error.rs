//! Typed errors for index construction.
//!
//! Load-time failures propagate to the process entrypoint; query-time
//! anomalies never surface as errors (an empty or rejected query produces an
//! empty result list, and a query-time embedding failure degrades the
//! semantic subscore to zero).

use std::path::PathBuf;
use thiserror::Error;

/// A snapshot could not be turned into a catalog. Fatal to startup.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read snapshot {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed snapshot {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("offer at position {position} is missing required field `{field}`")]
    MissingOfferField { position: usize, field: &'static str },
}

/// The embedding cache file could not be used. Always recoverable by
/// recomputation; the variants exist so the recovery path can be logged
/// precisely.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to read embedding cache: {0}")]
    Io(#[from] std::io::Error),

    #[error("embedding cache is truncated: expected {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },

    #[error("embedding cache shape is {cached_rows}x{cached_dim}, index needs {rows}x{dim}")]
    ShapeMismatch {
        cached_rows: usize,
        cached_dim: usize,
        rows: usize,
        dim: usize,
    },

    #[error("embedding cache fingerprint does not match the loaded snapshots")]
    FingerprintMismatch,
}

/// The embedding backend is unavailable or misbehaving.
///
/// Fatal at index build only when no shape-compatible cache exists to fall
/// back on.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding backend `{backend}` failed: {message}")]
    Backend { backend: String, message: String },

    #[error("embedding backend is disabled")]
    Disabled,

    #[error("backend returned {actual}-dim vectors, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("backend returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },
}

//! Binary embedding cache.
//!
//! Layout, all little-endian:
//!
//! ```text
//! record_count: u32 | dim: u32 | fingerprint: [u8; 32] | data: f32[count × dim]
//! ```
//!
//! The fingerprint is the SHA-256 of the UTF-8 record texts joined by `'\n'`,
//! so any change to the snapshots — content, ordering, or count — invalidates
//! the cache. Integrity failures are never fatal: the index build recomputes
//! and overwrites.

use sha2::{Digest, Sha256};
use std::path::Path;

use crate::error::CacheError;
use crate::index::EmbeddingMatrix;

const HEADER_LEN: usize = 4 + 4 + 32;

/// Content hash over the ordered per-record embedding texts.
pub fn fingerprint(texts: &[String]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for (i, text) in texts.iter().enumerate() {
        if i > 0 {
            hasher.update(b"\n");
        }
        hasher.update(text.as_bytes());
    }
    hasher.finalize().into()
}

/// Load the cache, requiring both the expected shape and a fingerprint match.
pub fn load(
    path: &Path,
    rows: usize,
    dim: usize,
    expected_fingerprint: &[u8; 32],
) -> Result<EmbeddingMatrix, CacheError> {
    let (matrix, stored) = read(path, rows, dim)?;
    if &stored != expected_fingerprint {
        return Err(CacheError::FingerprintMismatch);
    }
    Ok(matrix)
}

/// Load the cache requiring only the expected shape.
///
/// Fallback path for when the embedding backend is down: a stale matrix
/// over the same record set is better than no semantic scorer at all.
pub fn load_stale(path: &Path, rows: usize, dim: usize) -> Result<EmbeddingMatrix, CacheError> {
    let (matrix, _) = read(path, rows, dim)?;
    Ok(matrix)
}

fn read(path: &Path, rows: usize, dim: usize) -> Result<(EmbeddingMatrix, [u8; 32]), CacheError> {
    let bytes = std::fs::read(path)?;

    if bytes.len() < HEADER_LEN {
        return Err(CacheError::Truncated {
            expected: HEADER_LEN,
            found: bytes.len(),
        });
    }

    let cached_rows = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let cached_dim = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;

    if cached_rows != rows || cached_dim != dim {
        return Err(CacheError::ShapeMismatch {
            cached_rows,
            cached_dim,
            rows,
            dim,
        });
    }

    let mut stored = [0u8; 32];
    stored.copy_from_slice(&bytes[8..HEADER_LEN]);

    let expected_len = HEADER_LEN + rows * dim * 4;
    if bytes.len() != expected_len {
        return Err(CacheError::Truncated {
            expected: expected_len,
            found: bytes.len(),
        });
    }

    let data: Vec<f32> = bytes[HEADER_LEN..]
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    Ok((EmbeddingMatrix::new(rows, dim, data), stored))
}

/// Write the cache, creating parent directories as needed.
pub fn store(
    path: &Path,
    fingerprint: &[u8; 32],
    matrix: &EmbeddingMatrix,
) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut bytes = Vec::with_capacity(HEADER_LEN + matrix.rows() * matrix.dim() * 4);
    bytes.extend_from_slice(&(matrix.rows() as u32).to_le_bytes());
    bytes.extend_from_slice(&(matrix.dim() as u32).to_le_bytes());
    bytes.extend_from_slice(fingerprint);
    for value in matrix.data() {
        bytes.extend_from_slice(&value.to_le_bytes());
    }

    std::fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_matrix() -> EmbeddingMatrix {
        EmbeddingMatrix::new(2, 3, vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0])
    }

    fn sample_texts() -> Vec<String> {
        vec!["Milk Deal".to_string(), "Juice Deal".to_string()]
    }

    #[test]
    fn test_store_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.bin");
        let fp = fingerprint(&sample_texts());

        store(&path, &fp, &sample_matrix()).unwrap();
        let loaded = load(&path, 2, 3, &fp).unwrap();
        assert_eq!(loaded.row(0), &[1.0, 0.0, 0.0]);
        assert_eq!(loaded.row(1), &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_fingerprint_mismatch_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.bin");
        let fp = fingerprint(&sample_texts());
        store(&path, &fp, &sample_matrix()).unwrap();

        let other = fingerprint(&vec!["Milk Deal (changed)".to_string()]);
        assert!(matches!(
            load(&path, 2, 3, &other),
            Err(CacheError::FingerprintMismatch)
        ));
        // A stale load still succeeds on matching shape.
        assert!(load_stale(&path, 2, 3).is_ok());
    }

    #[test]
    fn test_shape_mismatch_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.bin");
        let fp = fingerprint(&sample_texts());
        store(&path, &fp, &sample_matrix()).unwrap();

        assert!(matches!(
            load(&path, 3, 3, &fp),
            Err(CacheError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_truncated_file_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.bin");
        let fp = fingerprint(&sample_texts());
        store(&path, &fp, &sample_matrix()).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();
        assert!(matches!(
            load(&path, 2, 3, &fp),
            Err(CacheError::Truncated { .. })
        ));
    }

    #[test]
    fn test_fingerprint_depends_on_order() {
        let forward = fingerprint(&sample_texts());
        let mut reversed = sample_texts();
        reversed.reverse();
        assert_ne!(forward, fingerprint(&reversed));
    }
}

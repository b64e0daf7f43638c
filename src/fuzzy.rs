//! Approximate string scorer for typo recovery.
//!
//! Scores each record by the best substring-alignment ratio between the
//! query and the record's offer and product names. This is the scorer that
//! answers when the keyword pass comes back empty because of a misspelling
//! ("choclate", "cofee").
//!
//! Raw partial ratios live in `[0, 100]`; anything below 60 is noise and
//! scores zero. Values are normalized to `[0, 1]` before they leave this
//! module, so the ranker never sees the raw scale.

use rapidfuzz::fuzz;

use crate::models::Record;

/// Minimum raw partial ratio considered a signal.
const MIN_RATIO: f64 = 60.0;

/// Score every record against the query, normalized to `[0, 1]`.
pub fn score(records: &[Record], query: &str) -> Vec<f64> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return vec![0.0; records.len()];
    }
    let query: Vec<char> = query.chars().collect();

    records
        .iter()
        .map(|record| {
            let mut best = fuzz::partial_ratio(
                query.iter().copied(),
                record.offer_name_lower.chars(),
            );
            if let Some(ref product_name) = record.product_name_lower {
                best = best.max(fuzz::partial_ratio(
                    query.iter().copied(),
                    product_name.chars(),
                ));
            }
            if best < MIN_RATIO {
                0.0
            } else {
                best / 100.0
            }
        })
        .collect()
}

/// Case-insensitive partial ratio between two strings, normalized to
/// `[0, 1]`. Used by the ranker's offer-name boost.
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    if a.trim().is_empty() || b.trim().is_empty() {
        return 0.0;
    }
    fuzz::partial_ratio(a.to_lowercase().chars(), b.to_lowercase().chars()) / 100.0
}

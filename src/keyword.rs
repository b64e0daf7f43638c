//! Field-weighted exact keyword scorer.
//!
//! The query is lowercased and split on whitespace; every query word must
//! appear somewhere in a record's combined text, otherwise the record scores
//! zero. Matching words contribute per (field, word):
//!
//! ```text
//! contribution = field_weight × bonus
//! ```
//!
//! where the bonus is 1.5 for a token-bounded whole-word hit and 1.0 for a
//! substring hit inside a token. A field containing the same word several
//! times still contributes once per (field, word). Contributions sum over
//! all words and fields, rewarding multi-field and multi-word coverage
//! linearly; the resulting raw scores sit in `[0, ~5]` and are normalized to
//! `[0, 1]` by the ranker before fusion.

use crate::models::{FieldKind, Record};

const WHOLE_WORD_BONUS: f64 = 1.5;
const SUBSTRING_BONUS: f64 = 1.0;

/// Weight of a field class in the keyword score.
pub fn field_weight(kind: FieldKind) -> f64 {
    match kind {
        FieldKind::OfferName => 3.0,
        FieldKind::ProductName => 2.0,
        FieldKind::Description => 1.0,
        FieldKind::Auxiliary => 0.5,
    }
}

/// Lowercased word-split of arbitrary record text.
///
/// Splits on any non-alphanumeric character so `"Gift Cards, $50"` yields
/// `["gift", "cards", "50"]`. Used both for the per-field token sets built
/// at index time and for the corpus word set.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_string())
        .collect()
}

/// Lowercased whitespace-split query words, as the scorers and the ranker's
/// offer-name boost consume them.
pub fn query_words(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .map(|word| word.to_string())
        .collect()
}

/// Score every record against the query. The returned vector is defined
/// over the full record index space, zero where no signal was found.
pub fn score(records: &[Record], query: &str) -> Vec<f64> {
    let words = query_words(query);
    if words.is_empty() {
        return vec![0.0; records.len()];
    }

    records
        .iter()
        .map(|record| score_record(record, &words))
        .collect()
}

fn score_record(record: &Record, words: &[String]) -> f64 {
    // All-words gate: a single missing word disqualifies the record.
    if !words.iter().all(|word| record.combined.contains(word.as_str())) {
        return 0.0;
    }

    let mut total = 0.0;
    for word in words {
        for field in &record.fields {
            let bonus = if field.tokens.contains(word.as_str()) {
                WHOLE_WORD_BONUS
            } else if field.text.contains(word.as_str()) {
                SUBSTRING_BONUS
            } else {
                continue;
            };
            total += field_weight(field.kind) * bonus;
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::build_record;
    use crate::models::{Offer, Product};

    fn offer(name: &str, description: &str, category: &str) -> Offer {
        Offer {
            offer_id: "offer-1".to_string(),
            name: name.to_string(),
            description: description.to_string(),
            category: category.to_string(),
            offer_price: String::new(),
            program: None,
            deal_type: String::new(),
            start_date: None,
            end_date: None,
            image_url: None,
        }
    }

    fn product(name: &str, department: &str) -> Product {
        Product {
            offer_id: "offer-1".to_string(),
            name: name.to_string(),
            description: String::new(),
            department: department.to_string(),
            aisle: String::new(),
            shelf: String::new(),
            member_price: None,
            base_price: None,
            image_url: None,
        }
    }

    #[test]
    fn test_tokenize_splits_punctuation() {
        assert_eq!(tokenize("Gift Cards, $50"), vec!["gift", "cards", "50"]);
        assert!(tokenize("  --  ").is_empty());
    }

    #[test]
    fn test_missing_word_scores_zero() {
        let record = build_record(
            0,
            0,
            &offer("Chocolate Bars", "Assorted dark chocolate", "Candy"),
            None,
        );
        let scores = score(&[record], "chocolate hazelnut");
        assert_eq!(scores, vec![0.0]);
    }

    #[test]
    fn test_whole_word_beats_substring() {
        let whole = build_record(0, 0, &offer("Milk Deal", "", ""), None);
        let substring = build_record(1, 1, &offer("Milkshake Deal", "", ""), None);
        let scores = score(&[whole, substring], "milk");
        // Offer name weight 3.0: whole-word 3.0 × 1.5, substring 3.0 × 1.0.
        assert!((scores[0] - 4.5).abs() < 1e-9);
        assert!((scores[1] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_multi_field_coverage_sums() {
        let record = build_record(
            0,
            0,
            &offer("Chocolate Bars", "Rich chocolate squares", "Chocolate"),
            None,
        );
        let scores = score(&[record], "chocolate");
        // name 3.0×1.5 + description 1.0×1.5 + category 0.5×1.5
        assert!((scores[0] - 6.75).abs() < 1e-9);
    }

    #[test]
    fn test_product_fields_contribute() {
        let record = build_record(
            0,
            0,
            &offer("Snack Savings", "", ""),
            Some(product("Chocolate Wafers", "Candy")),
        );
        let scores = score(&[record], "chocolate");
        // product name 2.0 × 1.5
        assert!((scores[0] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_repeated_word_counts_once_per_field() {
        let record = build_record(
            0,
            0,
            &offer("Chocolate Chocolate Chip", "", ""),
            None,
        );
        let scores = score(&[record], "chocolate");
        assert!((scores[0] - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_empty_query_scores_nothing() {
        let record = build_record(0, 0, &offer("Milk", "", ""), None);
        assert_eq!(score(&[record], "   "), vec![0.0]);
    }
}

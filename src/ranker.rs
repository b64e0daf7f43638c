//! Score fusion, ranking adjustments, deal grouping, and cutoffs.
//!
//! The ranker consumes the three per-record score vectors and produces the
//! final deal list:
//!
//! 1. normalize keyword scores to `[0, 1]` (per-query max, only when > 1);
//! 2. fuse: `0.50·keyword + 0.25·fuzzy + 0.25·semantic`;
//! 3. record-level adjustments, in order: fuzzy cap, semantic-only
//!    discount, multi-source bonus;
//! 4. group records into deals (MAX aggregation per offer);
//! 5. deal-level adjustments: offer-name boost, match-density multiplier;
//! 6. adaptive cutoff derived from the top score, then truncation.
//!
//! Each adjustment is a pure in-place transformation over the score slice,
//! so they are testable in isolation and their order is explicit in
//! [`fuse`] and [`rank`].

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::fuzzy;
use crate::index::SearchIndex;
use crate::keyword;
use crate::models::{DealResult, MatchedProduct, ScoreComponents};

// Fusion weights.
pub const KEYWORD_WEIGHT: f64 = 0.50;
pub const FUZZY_WEIGHT: f64 = 0.25;
pub const SEMANTIC_WEIGHT: f64 = 0.25;

// Record-level adjustments.
const SEMANTIC_ONLY_DISCOUNT: f64 = 0.5;
/// Normalized fuzzy score counting as a source (raw ratio 60).
const FUZZY_SOURCE_FLOOR: f64 = 0.6;
const MULTI_SOURCE_STEP: f64 = 0.1;
const MULTI_SOURCE_CAP: f64 = 0.2;

// Deal-level adjustments.
const NAME_BOOST: f64 = 1.2;
/// Normalized partial ratio counting as an offer-name hit (raw ratio 80).
const NAME_BOOST_FUZZY_FLOOR: f64 = 0.8;
const DENSITY_FLOOR: f64 = 0.3;

// Adaptive cutoff.
const CUTOFF_PIVOT: f64 = 0.5;
const CUTOFF_RATIO_HIGH: f64 = 0.40;
const CUTOFF_RATIO_LOW: f64 = 0.70;

// Multi-query merge.
const MERGE_TERM_STEP: f64 = 0.05;
const MERGE_TERM_CAP: f64 = 1.3;
const MERGE_CUTOFF_RATIO: f64 = 0.45;

/// Full single-query ranking: fuse, group, adjust, cut, truncate.
pub fn rank(
    index: &SearchIndex,
    keyword_scores: &[f64],
    fuzzy_scores: &[f64],
    semantic_scores: &[f64],
    query: &str,
    top_k: usize,
) -> Vec<DealResult> {
    let components = fuse(keyword_scores, fuzzy_scores, semantic_scores);
    let mut deals = group_into_deals(index, &components, query);
    sort_deals(&mut deals);
    apply_adaptive_cutoff(&mut deals);
    deals.truncate(top_k);
    deals
}

// ============ Record-level fusion ============

/// Scale keyword scores into `[0, 1]` by the per-query max, only when the
/// max exceeds 1 (a sub-1 max is already on the composite scale).
pub fn normalize_keyword(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(0.0, f64::max);
    if max > 1.0 {
        scores.iter().map(|s| s / max).collect()
    } else {
        scores.to_vec()
    }
}

/// Fuse the three score vectors into per-record components with all
/// record-level adjustments applied.
pub fn fuse(
    keyword_raw: &[f64],
    fuzzy_scores: &[f64],
    semantic_scores: &[f64],
) -> Vec<ScoreComponents> {
    let keyword = normalize_keyword(keyword_raw);

    let mut components: Vec<ScoreComponents> = keyword
        .iter()
        .zip(fuzzy_scores)
        .zip(semantic_scores)
        .map(|((&kw, &fz), &sem)| ScoreComponents {
            keyword: kw,
            fuzzy: fz,
            semantic: sem,
            composite: KEYWORD_WEIGHT * kw + FUZZY_WEIGHT * fz + SEMANTIC_WEIGHT * sem,
        })
        .collect();

    apply_fuzzy_cap(&mut components);
    apply_semantic_only_discount(&mut components);
    apply_multi_source_bonus(&mut components);
    components
}

/// Fuzzy must not amplify records that already have exact matches: when
/// both signals fire, the composite is recomputed with the fuzzy term
/// capped at the (normalized) keyword score.
pub fn apply_fuzzy_cap(components: &mut [ScoreComponents]) {
    for c in components.iter_mut() {
        if c.keyword > 0.0 && c.fuzzy > 0.0 {
            let capped = c.fuzzy.min(c.keyword);
            c.composite =
                KEYWORD_WEIGHT * c.keyword + FUZZY_WEIGHT * capped + SEMANTIC_WEIGHT * c.semantic;
        }
    }
}

/// Records that only the embedding space found are halved.
pub fn apply_semantic_only_discount(components: &mut [ScoreComponents]) {
    for c in components.iter_mut() {
        if c.semantic > 0.0 && c.keyword == 0.0 && c.fuzzy == 0.0 {
            c.composite *= SEMANTIC_ONLY_DISCOUNT;
        }
    }
}

/// Additive reward for records found by more than one scorer: `+0.1` per
/// extra source, capped at `+0.2`.
pub fn apply_multi_source_bonus(components: &mut [ScoreComponents]) {
    for c in components.iter_mut() {
        let sources = (c.keyword > 0.0) as u32
            + (c.fuzzy >= FUZZY_SOURCE_FLOOR) as u32
            + (c.semantic > 0.0) as u32;
        if sources > 1 {
            c.composite += (MULTI_SOURCE_STEP * (sources - 1) as f64).min(MULTI_SOURCE_CAP);
        }
    }
}

// ============ Deal grouping & deal-level adjustments ============

#[derive(Default)]
struct OfferAccumulator {
    best: Option<ScoreComponents>,
    matched: Vec<MatchedProduct>,
    product_records: usize,
    keyword_products: usize,
    fuzzy_products: usize,
}

/// Group scored records by offer and apply the deal-level adjustments
/// (offer-name boost, density multiplier). The result is unsorted and
/// uncut; [`rank`] finishes the job.
pub fn group_into_deals(
    index: &SearchIndex,
    components: &[ScoreComponents],
    query: &str,
) -> Vec<DealResult> {
    debug_assert_eq!(components.len(), index.records.len());
    let query_words = keyword::query_words(query);

    let mut accumulators: Vec<OfferAccumulator> = Vec::with_capacity(index.offers.len());
    accumulators.resize_with(index.offers.len(), OfferAccumulator::default);

    for (record, c) in index.records.iter().zip(components) {
        let acc = &mut accumulators[record.offer_idx];

        if let Some(ref product) = record.product {
            acc.product_records += 1;
            if c.keyword > 0.0 {
                acc.keyword_products += 1;
            }
            if c.fuzzy > 0.0 {
                acc.fuzzy_products += 1;
            }
            if c.composite > 0.0 {
                acc.matched.push(MatchedProduct {
                    product: product.clone(),
                    components: *c,
                });
            }
        }

        if c.composite > 0.0 {
            let better = acc
                .best
                .map(|best| c.composite > best.composite)
                .unwrap_or(true);
            if better {
                acc.best = Some(*c);
            }
        }
    }

    let mut deals = Vec::new();
    for (offer_idx, mut acc) in accumulators.into_iter().enumerate() {
        let Some(best) = acc.best else { continue };
        let offer = &index.offers[offer_idx];
        let mut score = best.composite;

        // Offer-name boost: a literal query word in the name, or a strong
        // fuzzy alignment of the whole query against it.
        let name_lower = offer.name.to_lowercase();
        let exact_hit = query_words.iter().any(|word| name_lower.contains(word.as_str()));
        let fuzzy_hit = fuzzy::partial_ratio(query, &offer.name) >= NAME_BOOST_FUZZY_FLOOR;
        if exact_hit || fuzzy_hit {
            score *= NAME_BOOST;
        }

        // Density: deals where most qualifying products match outrank deals
        // carried by a sliver of a large product list. Offer-only matches
        // count as 1/1.
        let (n_matched, n_total) = if acc.product_records == 0 {
            (1.0, 1.0)
        } else {
            let matched = if acc.keyword_products > 0 {
                acc.keyword_products
            } else {
                acc.fuzzy_products
            };
            (matched as f64, acc.product_records as f64)
        };
        score *= DENSITY_FLOOR + (1.0 - DENSITY_FLOOR) * (n_matched / n_total);

        acc.matched.sort_by(|a, b| {
            b.components
                .composite
                .partial_cmp(&a.components.composite)
                .unwrap_or(Ordering::Equal)
        });

        deals.push(DealResult {
            offer: offer.clone(),
            matching_products: acc.matched,
            score,
            components: best,
        });
    }
    deals
}

/// Sort: score desc, offer-name length asc, offer id asc. Fully
/// deterministic for a given (records, embeddings, query).
pub fn sort_deals(deals: &mut [DealResult]) {
    deals.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.offer.name.len().cmp(&b.offer.name.len()))
            .then_with(|| a.offer.offer_id.cmp(&b.offer.offer_id))
    });
}

/// Trim the low-confidence tail relative to the top score. Expects `deals`
/// sorted descending.
///
/// A confident top (≥ 0.5) tolerates a wider spread (keep ≥ 40% of top);
/// a weak top keeps only scores within 70% of it.
pub fn apply_adaptive_cutoff(deals: &mut Vec<DealResult>) {
    let Some(top) = deals.first() else { return };
    let ratio = if top.score >= CUTOFF_PIVOT {
        CUTOFF_RATIO_HIGH
    } else {
        CUTOFF_RATIO_LOW
    };
    let threshold = ratio * top.score;
    deals.retain(|deal| deal.score >= threshold);
}

// ============ Multi-query merge ============

/// Merge independently-ranked result lists from expanded query terms.
///
/// Per offer the best deal wins, scaled by how many distinct terms matched
/// it (`+5%` per extra term, capped at `×1.3`), then a stricter flat 45%
/// cutoff trims the merged set.
pub fn merge_expanded(per_term: Vec<Vec<DealResult>>, top_k: usize) -> Vec<DealResult> {
    let mut merged: HashMap<String, (DealResult, usize)> = HashMap::new();

    for term_results in per_term {
        for deal in term_results {
            match merged.entry(deal.offer.offer_id.clone()) {
                std::collections::hash_map::Entry::Vacant(entry) => {
                    entry.insert((deal, 1));
                }
                std::collections::hash_map::Entry::Occupied(mut entry) => {
                    let (best, terms) = entry.get_mut();
                    *terms += 1;
                    if deal.score > best.score {
                        *best = deal;
                    }
                }
            }
        }
    }

    let mut deals: Vec<DealResult> = merged
        .into_values()
        .map(|(mut deal, terms)| {
            let factor = (1.0 + MERGE_TERM_STEP * (terms - 1) as f64).min(MERGE_TERM_CAP);
            deal.score *= factor;
            deal
        })
        .collect();

    sort_deals(&mut deals);
    if let Some(top) = deals.first() {
        let threshold = MERGE_CUTOFF_RATIO * top.score;
        deals.retain(|deal| deal.score >= threshold);
    }
    deals.truncate(top_k);
    deals
}

// ============ Streaming ============

/// Chunk a final result list into monotonically-ordered batches for the
/// streaming API. The list is already sorted; no result is ever revised.
pub fn into_batches(results: Vec<DealResult>, batch_size: usize) -> Vec<Vec<DealResult>> {
    if results.is_empty() {
        return Vec::new();
    }
    let batch_size = batch_size.max(1);
    let mut batches = Vec::with_capacity(results.len().div_ceil(batch_size));
    let mut batch = Vec::with_capacity(batch_size);
    for result in results {
        batch.push(result);
        if batch.len() == batch_size {
            batches.push(std::mem::take(&mut batch));
        }
    }
    if !batch.is_empty() {
        batches.push(batch);
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::EmbeddingMatrix;
    use crate::loader::parse_catalog;
    use std::collections::HashSet;

    fn components(keyword: f64, fz: f64, semantic: f64) -> ScoreComponents {
        let mut c = vec![ScoreComponents {
            keyword,
            fuzzy: fz,
            semantic,
            composite: KEYWORD_WEIGHT * keyword + FUZZY_WEIGHT * fz + SEMANTIC_WEIGHT * semantic,
        }];
        apply_fuzzy_cap(&mut c);
        apply_semantic_only_discount(&mut c);
        apply_multi_source_bonus(&mut c);
        c[0]
    }

    fn index_from(deals_json: &str, products_json: &str) -> SearchIndex {
        let catalog = parse_catalog(deals_json, products_json).unwrap();
        let rows = catalog.records.len();
        SearchIndex {
            offers: catalog.offers,
            records: catalog.records,
            embeddings: EmbeddingMatrix::new(rows, 2, vec![0.0; rows * 2]),
            corpus: HashSet::new(),
        }
    }

    #[test]
    fn test_normalize_keyword_only_above_one() {
        assert_eq!(normalize_keyword(&[4.0, 2.0]), vec![1.0, 0.5]);
        // A max of exactly 1 (or below) is left alone.
        assert_eq!(normalize_keyword(&[0.8, 0.4]), vec![0.8, 0.4]);
    }

    #[test]
    fn test_semantic_only_discount_arithmetic() {
        // keyword=0, fuzzy=0, semantic=s → composite = 0.25 × 0.5 × s.
        let c = components(0.0, 0.0, 0.8);
        assert!((c.composite - 0.125 * 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_fuzzy_cap_limits_fuzzy_to_keyword() {
        let c = components(0.4, 0.9, 0.0);
        // fuzzy capped to 0.4, then +0.1 multi-source bonus (kw + fuzzy).
        let expected = 0.5 * 0.4 + 0.25 * 0.4 + 0.1;
        assert!((c.composite - expected).abs() < 1e-9);
    }

    #[test]
    fn test_multi_source_bonus_capped() {
        let all_three = components(1.0, 0.9, 0.5);
        // fuzzy capped at 0.9 vs keyword 1.0 → stays 0.9; bonus 0.2 (capped).
        let expected = 0.5 * 1.0 + 0.25 * 0.9 + 0.25 * 0.5 + 0.2;
        assert!((all_three.composite - expected).abs() < 1e-9);
    }

    #[test]
    fn test_weak_fuzzy_is_not_a_source() {
        // Below the 0.6 floor the fuzzy scorer already emits zero; the
        // bonus therefore needs keyword + semantic to fire.
        let c = components(0.5, 0.0, 0.3);
        let expected = 0.5 * 0.5 + 0.25 * 0.3 + 0.1;
        assert!((c.composite - expected).abs() < 1e-9);
    }

    #[test]
    fn test_cutoff_high_top() {
        // Top 0.9 ≥ 0.5 → threshold 0.36.
        let index = index_from(
            r#"[{"offer_id": "a", "name": "A"}, {"offer_id": "b", "name": "B"},
                {"offer_id": "c", "name": "C"}]"#,
            "[]",
        );
        let mut deals = vec![
            deal(&index, 0, 0.9),
            deal(&index, 1, 0.37),
            deal(&index, 2, 0.35),
        ];
        apply_adaptive_cutoff(&mut deals);
        let ids: Vec<&str> = deals.iter().map(|d| d.offer.offer_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_cutoff_low_top() {
        // Top 0.3 < 0.5 → threshold 0.21.
        let index = index_from(
            r#"[{"offer_id": "a", "name": "A"}, {"offer_id": "b", "name": "B"},
                {"offer_id": "c", "name": "C"}]"#,
            "[]",
        );
        let mut deals = vec![
            deal(&index, 0, 0.3),
            deal(&index, 1, 0.22),
            deal(&index, 2, 0.20),
        ];
        apply_adaptive_cutoff(&mut deals);
        assert_eq!(deals.len(), 2);
    }

    fn deal(index: &SearchIndex, offer_idx: usize, score: f64) -> DealResult {
        DealResult {
            offer: index.offers[offer_idx].clone(),
            matching_products: Vec::new(),
            score,
            components: ScoreComponents::default(),
        }
    }

    #[test]
    fn test_sort_ties_by_name_length_then_id() {
        let index = index_from(
            r#"[{"offer_id": "z9", "name": "Long Offer Name"},
                {"offer_id": "b2", "name": "Short"},
                {"offer_id": "a1", "name": "Short"}]"#,
            "[]",
        );
        let mut deals = vec![
            deal(&index, 0, 0.5),
            deal(&index, 1, 0.5),
            deal(&index, 2, 0.5),
        ];
        sort_deals(&mut deals);
        let ids: Vec<&str> = deals.iter().map(|d| d.offer.offer_id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "b2", "z9"]);
    }

    #[test]
    fn test_density_rewards_dense_offers() {
        // Offer A: both products match. Offer B: 1 of 4 matches.
        let index = index_from(
            r#"[{"offer_id": "a", "name": "Offer A"}, {"offer_id": "b", "name": "Offer B"}]"#,
            r#"[
                {"offer_id": "a", "name": "Apple Juice"},
                {"offer_id": "a", "name": "Apple Cider"},
                {"offer_id": "b", "name": "Apple Sauce"},
                {"offer_id": "b", "name": "Paper Towels"},
                {"offer_id": "b", "name": "Dish Soap"},
                {"offer_id": "b", "name": "Sponges"}
            ]"#,
        );
        // Same per-record composite for every matching record.
        let hit = ScoreComponents {
            keyword: 1.0,
            fuzzy: 0.0,
            semantic: 0.0,
            composite: 0.5,
        };
        let miss = ScoreComponents::default();
        let components = vec![hit, hit, hit, miss, miss, miss];
        let deals = group_into_deals(&index, &components, "apple");
        let a = deals.iter().find(|d| d.offer.offer_id == "a").unwrap();
        let b = deals.iter().find(|d| d.offer.offer_id == "b").unwrap();
        assert!(a.score > b.score);
        // A: density 1.0 → 0.5; B: 0.3 + 0.7 × 1/4 = 0.475 multiplier.
        assert!((a.score - 0.5).abs() < 1e-9);
        assert!((b.score - 0.5 * 0.475).abs() < 1e-9);
    }

    #[test]
    fn test_offer_name_boost() {
        let index = index_from(
            r#"[{"offer_id": "named", "name": "Apple Festival"},
                {"offer_id": "plain", "name": "Fruit Savings"}]"#,
            r#"[
                {"offer_id": "named", "name": "Gala Apples"},
                {"offer_id": "plain", "name": "Fuji Apples"}
            ]"#,
        );
        let hit = ScoreComponents {
            keyword: 1.0,
            fuzzy: 0.0,
            semantic: 0.0,
            composite: 0.5,
        };
        let deals = group_into_deals(&index, &[hit, hit], "apple");
        let named = deals.iter().find(|d| d.offer.offer_id == "named").unwrap();
        let plain = deals.iter().find(|d| d.offer.offer_id == "plain").unwrap();
        assert!((named.score / plain.score - 1.2).abs() < 1e-6);
    }

    #[test]
    fn test_offer_only_record_has_no_density_penalty() {
        let index = index_from(
            r#"[{"offer_id": "solo", "name": "Store Opening Special"}]"#,
            "[]",
        );
        let hit = ScoreComponents {
            keyword: 1.0,
            fuzzy: 0.0,
            semantic: 0.0,
            composite: 0.5,
        };
        let deals = group_into_deals(&index, &[hit], "opening");
        assert_eq!(deals.len(), 1);
        // ×1.2 name boost, no density penalty.
        assert!((deals[0].score - 0.6).abs() < 1e-9);
        assert!(deals[0].matching_products.is_empty());
    }

    #[test]
    fn test_merge_expanded_rewards_multi_term_matches() {
        let index = index_from(
            r#"[{"offer_id": "both", "name": "Breakfast Bundle"},
                {"offer_id": "one", "name": "Juice Sale"}]"#,
            "[]",
        );
        let per_term = vec![
            vec![deal(&index, 0, 0.5), deal(&index, 1, 0.5)],
            vec![deal(&index, 0, 0.4)],
        ];
        let merged = merge_expanded(per_term, 40);
        let both = merged.iter().find(|d| d.offer.offer_id == "both").unwrap();
        let one = merged.iter().find(|d| d.offer.offer_id == "one").unwrap();
        // Max score 0.5 kept, ×1.05 for matching two terms.
        assert!((both.score - 0.525).abs() < 1e-9);
        assert!((one.score - 0.5).abs() < 1e-9);
        assert_eq!(merged[0].offer.offer_id, "both");
    }

    #[test]
    fn test_merge_term_factor_caps_at_1_3() {
        let index = index_from(r#"[{"offer_id": "x", "name": "X"}]"#, "[]");
        // Eight terms all matching the same offer: factor would be 1.35.
        let per_term: Vec<Vec<DealResult>> =
            (0..8).map(|_| vec![deal(&index, 0, 0.5)]).collect();
        let merged = merge_expanded(per_term, 40);
        assert!((merged[0].score - 0.5 * 1.3).abs() < 1e-9);
    }

    #[test]
    fn test_into_batches_shapes() {
        let index = index_from(
            r#"[{"offer_id": "a", "name": "A"}, {"offer_id": "b", "name": "B"},
                {"offer_id": "c", "name": "C"}]"#,
            "[]",
        );
        let results = vec![
            deal(&index, 0, 0.9),
            deal(&index, 1, 0.8),
            deal(&index, 2, 0.7),
        ];
        let batches = into_batches(results, 2);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1].len(), 1);
        assert!(into_batches(Vec::new(), 2).is_empty());
    }
}

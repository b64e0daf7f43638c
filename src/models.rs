//! Core data models used throughout the engine.
//!
//! These types represent the offers, qualifying products, and searchable
//! records that flow through the index-build and retrieval pipeline, plus
//! the per-query result types handed to callers.

use serde::Serialize;
use std::collections::HashSet;

/// Promotional program an offer belongs to.
///
/// The snapshot carries these as short codes (`MF`, `PD`, `SC`, `LO`).
/// Codes outside the known set are preserved verbatim rather than dropped,
/// so a snapshot from a newer upstream schema still loads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfferProgram {
    /// Manufacturer coupon.
    Mf,
    /// Personalized deal.
    Pd,
    /// Store coupon.
    Sc,
    /// Loyalty offer.
    Lo,
    /// Unrecognized program code, kept as-is.
    Other(String),
}

impl OfferProgram {
    pub fn parse(code: &str) -> Self {
        match code {
            "MF" => OfferProgram::Mf,
            "PD" => OfferProgram::Pd,
            "SC" => OfferProgram::Sc,
            "LO" => OfferProgram::Lo,
            other => OfferProgram::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            OfferProgram::Mf => "MF",
            OfferProgram::Pd => "PD",
            OfferProgram::Sc => "SC",
            OfferProgram::Lo => "LO",
            OfferProgram::Other(code) => code,
        }
    }
}

impl Serialize for OfferProgram {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A deal from the deals snapshot. Created once at load, never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct Offer {
    pub offer_id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    /// Free-form price label, e.g. `"$2.00 OFF"` or `"FREE"`.
    pub offer_price: String,
    pub program: Option<OfferProgram>,
    pub deal_type: String,
    /// Validity window as epoch milliseconds.
    pub start_date: Option<i64>,
    pub end_date: Option<i64>,
    pub image_url: Option<String>,
}

/// A qualifying item inside an offer. Belongs to exactly one offer.
#[derive(Debug, Clone, Serialize)]
pub struct Product {
    pub offer_id: String,
    pub name: String,
    pub description: String,
    pub department: String,
    pub aisle: String,
    pub shelf: String,
    pub member_price: Option<f64>,
    pub base_price: Option<f64>,
    pub image_url: Option<String>,
}

/// Relevance class of a searchable field, mapped to a weight by the
/// keyword scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    OfferName,
    ProductName,
    /// Offer or product description.
    Description,
    /// Category, department, aisle, shelf, price label, deal type.
    Auxiliary,
}

/// One lowercased searchable field of a record, with its token set
/// precomputed at index-build time so the query hot path never tokenizes
/// record text.
#[derive(Debug, Clone)]
pub struct SearchField {
    pub kind: FieldKind,
    pub text: String,
    pub tokens: HashSet<String>,
}

/// The searchable unit: one per (offer, product) pair, plus one per offer
/// that has no qualifying products.
///
/// `index` is the stable 0-based position in the record array; all three
/// scorers key their score vectors by it.
#[derive(Debug, Clone)]
pub struct Record {
    pub index: usize,
    /// Position of the owning offer in the index's offer array.
    pub offer_idx: usize,
    pub product: Option<Product>,
    /// Weighted lowercased fields for keyword scoring.
    pub fields: Vec<SearchField>,
    /// All field texts joined by spaces; used for the all-words gate.
    pub combined: String,
    /// Offer name, lowercased, for fuzzy alignment.
    pub offer_name_lower: String,
    /// Product name, lowercased, when the record carries a product.
    pub product_name_lower: Option<String>,
    /// Original-case text handed to the embedding model.
    pub embed_text: String,
}

/// Per-record subscores, reported back to callers so the transport layer
/// can explain a match.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ScoreComponents {
    /// Keyword score after per-query max normalization.
    pub keyword: f64,
    /// Fuzzy partial-ratio score, normalized to `[0, 1]`.
    pub fuzzy: f64,
    /// Cosine similarity clamped to `[0, 1]`.
    pub semantic: f64,
    /// Fused score after all record-level adjustments.
    pub composite: f64,
}

/// A qualifying product that contributed to a deal match.
#[derive(Debug, Clone, Serialize)]
pub struct MatchedProduct {
    pub product: Product,
    pub components: ScoreComponents,
}

/// One ranked deal returned from the engine. Ephemeral per query.
#[derive(Debug, Clone, Serialize)]
pub struct DealResult {
    pub offer: Offer,
    /// Products whose records scored above zero, best first.
    pub matching_products: Vec<MatchedProduct>,
    /// Deal-level score after boost, density, and cutoff handling.
    pub score: f64,
    /// Components of the offer's best-scoring record.
    pub components: ScoreComponents,
}

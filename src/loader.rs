//! Snapshot loading and record building.
//!
//! Reads the two JSON snapshots (deals and qualifying products), joins them
//! by `offer_id`, and flattens the join into searchable [`Record`]s: one per
//! (offer, product) pair, plus one offer-only record per offer without
//! products. Offers are enumerated in input order, so the resulting record
//! order — and therefore every `record_index` — is deterministic.
//!
//! Required offer fields (`offer_id`, `name`) fail the load when missing.
//! Products missing required fields, and products referencing an unknown
//! offer, are skipped with a warning: a snapshot pair captured mid-update
//! should degrade, not kill startup.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

use crate::error::LoadError;
use crate::keyword::tokenize;
use crate::models::{FieldKind, Offer, OfferProgram, Product, Record, SearchField};

/// The joined, flattened output of the two snapshots.
#[derive(Debug)]
pub struct Catalog {
    pub offers: Vec<Offer>,
    pub records: Vec<Record>,
}

impl Catalog {
    /// Total qualifying products across all offers.
    pub fn product_count(&self) -> usize {
        self.records.iter().filter(|r| r.product.is_some()).count()
    }
}

// ============ Raw snapshot shapes ============

/// Epoch-milliseconds timestamp, accepted as an integer or a numeric string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EpochMillis {
    Int(i64),
    Float(f64),
    Text(String),
}

impl EpochMillis {
    fn as_millis(&self) -> Option<i64> {
        match self {
            EpochMillis::Int(ms) => Some(*ms),
            EpochMillis::Float(ms) => Some(*ms as i64),
            EpochMillis::Text(text) => {
                let text = text.trim();
                text.parse::<i64>()
                    .ok()
                    .or_else(|| text.parse::<f64>().ok().map(|ms| ms as i64))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawOffer {
    offer_id: Option<String>,
    name: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    offer_price: String,
    #[serde(default)]
    offer_pgm: Option<String>,
    #[serde(default)]
    deal_type: String,
    #[serde(default)]
    start_date: Option<EpochMillis>,
    #[serde(default)]
    end_date: Option<EpochMillis>,
    #[serde(default)]
    image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawProduct {
    offer_id: Option<String>,
    name: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    department: String,
    #[serde(default)]
    aisle: String,
    #[serde(default)]
    shelf: String,
    #[serde(default)]
    member_price: Option<f64>,
    #[serde(default)]
    base_price: Option<f64>,
    #[serde(default)]
    image_url: Option<String>,
}

// ============ Loading ============

/// Load both snapshots and build the record array.
pub fn load_catalog(deals_path: &Path, products_path: &Path) -> Result<Catalog, LoadError> {
    let offers = load_offers(deals_path)?;
    let products = load_products(products_path)?;
    Ok(join(offers, products))
}

/// Parse a JSON string pair directly, bypassing the filesystem. Useful for
/// in-memory catalogs and tests.
pub fn parse_catalog(deals_json: &str, products_json: &str) -> Result<Catalog, LoadError> {
    let offers = parse_offers(deals_json, Path::new("<deals>"))?;
    let products = parse_products(products_json, Path::new("<products>"))?;
    Ok(join(offers, products))
}

fn load_offers(path: &Path) -> Result<Vec<Offer>, LoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_offers(&content, path)
}

fn parse_offers(content: &str, path: &Path) -> Result<Vec<Offer>, LoadError> {
    let raw: Vec<RawOffer> = serde_json::from_str(content).map_err(|source| LoadError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let mut offers = Vec::with_capacity(raw.len());
    for (position, item) in raw.into_iter().enumerate() {
        let offer_id = match item.offer_id {
            Some(id) if !id.trim().is_empty() => id,
            _ => {
                return Err(LoadError::MissingOfferField {
                    position,
                    field: "offer_id",
                })
            }
        };
        let name = match item.name {
            Some(name) if !name.trim().is_empty() => name,
            _ => {
                return Err(LoadError::MissingOfferField {
                    position,
                    field: "name",
                })
            }
        };

        offers.push(Offer {
            offer_id,
            name,
            description: item.description,
            category: item.category,
            offer_price: item.offer_price,
            program: item.offer_pgm.as_deref().map(OfferProgram::parse),
            deal_type: item.deal_type,
            start_date: item.start_date.and_then(|ms| ms.as_millis()),
            end_date: item.end_date.and_then(|ms| ms.as_millis()),
            image_url: item.image_url,
        });
    }
    Ok(offers)
}

fn load_products(path: &Path) -> Result<Vec<Product>, LoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_products(&content, path)
}

fn parse_products(content: &str, path: &Path) -> Result<Vec<Product>, LoadError> {
    let raw: Vec<RawProduct> = serde_json::from_str(content).map_err(|source| LoadError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let mut products = Vec::with_capacity(raw.len());
    let mut skipped = 0usize;
    for item in raw {
        let (offer_id, name) = match (item.offer_id, item.name) {
            (Some(id), Some(name)) if !id.trim().is_empty() && !name.trim().is_empty() => {
                (id, name)
            }
            _ => {
                skipped += 1;
                continue;
            }
        };
        products.push(Product {
            offer_id,
            name,
            description: item.description,
            department: item.department,
            aisle: item.aisle,
            shelf: item.shelf,
            member_price: item.member_price,
            base_price: item.base_price,
            image_url: item.image_url,
        });
    }

    if skipped > 0 {
        warn!(skipped, "skipped products missing offer_id or name");
    }
    Ok(products)
}

// ============ Join & record building ============

fn join(offers: Vec<Offer>, products: Vec<Product>) -> Catalog {
    let offer_positions: HashMap<&str, usize> = offers
        .iter()
        .enumerate()
        .map(|(idx, offer)| (offer.offer_id.as_str(), idx))
        .collect();

    let mut by_offer: Vec<Vec<Product>> = vec![Vec::new(); offers.len()];
    let mut orphans = 0usize;
    for product in products {
        match offer_positions.get(product.offer_id.as_str()) {
            Some(&idx) => by_offer[idx].push(product),
            None => orphans += 1,
        }
    }
    if orphans > 0 {
        warn!(orphans, "skipped products referencing unknown offers");
    }

    let mut records = Vec::new();
    for (offer_idx, offer) in offers.iter().enumerate() {
        let offer_products = std::mem::take(&mut by_offer[offer_idx]);
        if offer_products.is_empty() {
            records.push(build_record(records.len(), offer_idx, offer, None));
        } else {
            for product in offer_products {
                records.push(build_record(records.len(), offer_idx, offer, Some(product)));
            }
        }
    }

    Catalog { offers, records }
}

fn search_field(kind: FieldKind, text: &str) -> Option<SearchField> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_lowercase();
    let tokens = tokenize(&lower).into_iter().collect();
    Some(SearchField {
        kind,
        text: lower,
        tokens,
    })
}

/// Flatten one (offer, product) pair into a record: lowercased weighted
/// fields with token sets, the combined all-words text, and the
/// original-case embedding text.
pub(crate) fn build_record(
    index: usize,
    offer_idx: usize,
    offer: &Offer,
    product: Option<Product>,
) -> Record {
    let mut fields = Vec::new();
    fields.extend(search_field(FieldKind::OfferName, &offer.name));
    fields.extend(search_field(FieldKind::Description, &offer.description));
    fields.extend(search_field(FieldKind::Auxiliary, &offer.category));
    fields.extend(search_field(FieldKind::Auxiliary, &offer.offer_price));
    fields.extend(search_field(FieldKind::Auxiliary, &offer.deal_type));

    let mut embed_parts: Vec<&str> = Vec::new();
    for part in [&offer.name, &offer.description, &offer.category] {
        if !part.trim().is_empty() {
            embed_parts.push(part);
        }
    }

    if let Some(ref product) = product {
        fields.extend(search_field(FieldKind::ProductName, &product.name));
        fields.extend(search_field(FieldKind::Description, &product.description));
        fields.extend(search_field(FieldKind::Auxiliary, &product.department));
        fields.extend(search_field(FieldKind::Auxiliary, &product.aisle));
        fields.extend(search_field(FieldKind::Auxiliary, &product.shelf));

        for part in [&product.name, &product.description, &product.department] {
            if !part.trim().is_empty() {
                embed_parts.push(part);
            }
        }
    }

    let combined = fields
        .iter()
        .map(|field| field.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let embed_text = embed_parts.join(" ");

    Record {
        index,
        offer_idx,
        offer_name_lower: offer.name.to_lowercase(),
        product_name_lower: product.as_ref().map(|p| p.name.to_lowercase()),
        product,
        fields,
        combined,
        embed_text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEALS: &str = r#"[
        {"offer_id": "d1", "name": "Chocolate Lovers", "description": "Save on chocolate",
         "category": "Candy", "offer_price": "$2.00 OFF", "offer_pgm": "MF",
         "deal_type": "coupon", "start_date": 1700000000000, "end_date": "1702000000000"},
        {"offer_id": "d2", "name": "Gift Card Bonus", "category": "Gift Cards"}
    ]"#;

    const PRODUCTS: &str = r#"[
        {"offer_id": "d1", "name": "Dark Chocolate Bar", "department": "Candy"},
        {"offer_id": "d1", "name": "Milk Chocolate Squares", "department": "Candy"},
        {"offer_id": "missing", "name": "Orphan Item"},
        {"offer_id": "d1"}
    ]"#;

    #[test]
    fn test_join_counts() {
        let catalog = parse_catalog(DEALS, PRODUCTS).unwrap();
        assert_eq!(catalog.offers.len(), 2);
        // d1 has two valid products, d2 none: 2 + max(1, 0) = 3 records.
        assert_eq!(catalog.records.len(), 3);
        assert_eq!(catalog.product_count(), 2);
    }

    #[test]
    fn test_record_indices_are_positions() {
        let catalog = parse_catalog(DEALS, PRODUCTS).unwrap();
        for (position, record) in catalog.records.iter().enumerate() {
            assert_eq!(record.index, position);
        }
    }

    #[test]
    fn test_product_records_reference_their_offer() {
        let catalog = parse_catalog(DEALS, PRODUCTS).unwrap();
        for record in &catalog.records {
            if let Some(ref product) = record.product {
                assert_eq!(product.offer_id, catalog.offers[record.offer_idx].offer_id);
            }
        }
    }

    #[test]
    fn test_offer_only_record_for_productless_offer() {
        let catalog = parse_catalog(DEALS, PRODUCTS).unwrap();
        let record = catalog
            .records
            .iter()
            .find(|r| catalog.offers[r.offer_idx].offer_id == "d2")
            .unwrap();
        assert!(record.product.is_none());
        assert!(record.combined.contains("gift card bonus"));
    }

    #[test]
    fn test_epoch_millis_int_or_string() {
        let catalog = parse_catalog(DEALS, PRODUCTS).unwrap();
        let offer = &catalog.offers[0];
        assert_eq!(offer.start_date, Some(1_700_000_000_000));
        assert_eq!(offer.end_date, Some(1_702_000_000_000));
    }

    #[test]
    fn test_missing_offer_name_fails() {
        let deals = r#"[{"offer_id": "d1"}]"#;
        let err = parse_catalog(deals, "[]").unwrap_err();
        assert!(matches!(
            err,
            LoadError::MissingOfferField { field: "name", .. }
        ));
    }

    #[test]
    fn test_malformed_json_fails() {
        assert!(matches!(
            parse_catalog("{not json", "[]").unwrap_err(),
            LoadError::Json { .. }
        ));
    }

    #[test]
    fn test_embed_text_keeps_original_case() {
        let catalog = parse_catalog(DEALS, PRODUCTS).unwrap();
        let record = &catalog.records[0];
        assert!(record.embed_text.starts_with("Chocolate Lovers"));
        assert!(record.embed_text.contains("Dark Chocolate Bar"));
    }
}

//! Import and export of the listing mapping.
//!
//! Import accepts the payload shapes users actually produce (bare array,
//! wrapped arrays, or an object-map) and normalizes them once into a
//! `Vec<Listing>` before any merge logic runs. A single bad item rejects
//! the whole import — no partial state.

use crate::models::{Listing, Trim};
use crate::store::{ListingStore, StoreBackend};
use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Import failed: file is not valid JSON")]
    InvalidJson,
    #[error("Import failed: payload is not a listing array, wrapper object, or listing map")]
    UnrecognizedShape,
    #[error("Import failed: every listing must carry a string id")]
    MissingId,
    #[error("Import failed: listing {id} has malformed fields")]
    MalformedListing { id: String },
}

/// How imported listings interact with the existing mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Run each item through the capture-time merge path
    Merge,
    /// Wholesale overwrite of the mapping
    Replace,
}

/// Parse an import payload into a canonical listing array
///
/// Accepted shapes: `[Listing, ...]`, `{"listings": [...]}`,
/// `{"data": [...]}`, or `{"<id>": Listing, ...}`.
pub fn parse_import_payload(raw: &str) -> Result<Vec<Listing>, ImportError> {
    let value: Value = serde_json::from_str(raw).map_err(|_| ImportError::InvalidJson)?;

    let items: Vec<Value> = match value {
        Value::Array(items) => items,
        Value::Object(map) => {
            let wrapped = map.get("listings").or_else(|| map.get("data")).cloned();
            match wrapped {
                Some(Value::Array(items)) => items,
                // a wrapper key that is not an array is a shape error,
                // not a listing map
                Some(_) => return Err(ImportError::UnrecognizedShape),
                None => map.into_iter().map(|(_, item)| item).collect(),
            }
        }
        _ => return Err(ImportError::UnrecognizedShape),
    };

    items.into_iter().map(parse_item).collect()
}

fn parse_item(value: Value) -> Result<Listing, ImportError> {
    let id = value
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or(ImportError::MissingId)?
        .to_string();
    serde_json::from_value(value).map_err(|_| ImportError::MalformedListing { id })
}

/// Import a JSON payload into the store, returning how many listings it held
pub async fn import_listings<B: StoreBackend>(
    store: &ListingStore<B>,
    raw: &str,
    mode: ImportMode,
) -> Result<usize> {
    let listings = parse_import_payload(raw)?;
    match mode {
        ImportMode::Merge => {
            store.upsert(&listings).await?;
        }
        ImportMode::Replace => {
            let map: HashMap<String, Listing> = listings
                .iter()
                .map(|l| (l.id.clone(), l.clone()))
                .collect();
            store.replace_all(&map).await?;
        }
    }
    info!("Imported {} listings ({:?} mode)", listings.len(), mode);
    Ok(listings.len())
}

/// Export the mapping values as a pretty-printed JSON array, id-sorted
pub fn export_json(map: &HashMap<String, Listing>) -> Result<String> {
    let mut listings: Vec<&Listing> = map.values().collect();
    listings.sort_by(|a, b| a.id.cmp(&b.id));
    serde_json::to_string_pretty(&listings).context("Failed to serialize listings for export")
}

/// Fixed column set of the CSV export; price history is not flattened
pub const CSV_COLUMNS: [&str; 15] = [
    "id",
    "url",
    "title",
    "price_eur",
    "brand",
    "model",
    "trim",
    "year",
    "mileage_km",
    "ps",
    "erstzulassung",
    "fuel",
    "drivetrain",
    "transmission",
    "captured_at",
];

/// Export the mapping as CSV with the fixed column set, id-sorted
pub fn export_csv(map: &HashMap<String, Listing>) -> Result<String> {
    let mut listings: Vec<&Listing> = map.values().collect();
    listings.sort_by(|a, b| a.id.cmp(&b.id));

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(CSV_COLUMNS)
        .context("Failed to write CSV header")?;

    for listing in listings {
        let trim = match listing.trim {
            Some(Trim::Rs) => "rs",
            Some(Trim::Standard) => "standard",
            None => "",
        };
        let price = opt_num(listing.price_eur);
        let year = opt_num(listing.year);
        let mileage = opt_num(listing.mileage_km);
        let ps = opt_num(listing.ps);
        writer
            .write_record([
                listing.id.as_str(),
                listing.url.as_str(),
                listing.title.as_deref().unwrap_or(""),
                price.as_str(),
                listing.brand.as_deref().unwrap_or(""),
                listing.model.as_deref().unwrap_or(""),
                trim,
                year.as_str(),
                mileage.as_str(),
                ps.as_str(),
                listing.erstzulassung.as_deref().unwrap_or(""),
                listing.fuel.as_deref().unwrap_or(""),
                listing.drivetrain.as_deref().unwrap_or(""),
                listing.transmission.as_deref().unwrap_or(""),
                listing.captured_at.as_str(),
            ])
            .with_context(|| format!("Failed to write CSV row for {}", listing.id))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV writer: {}", e))?;
    String::from_utf8(bytes).context("CSV output was not valid UTF-8")
}

fn opt_num<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;

    #[test]
    fn parses_bare_array() {
        let listings =
            parse_import_payload(r#"[{"id":"https://x/a"},{"id":"https://x/b"}]"#).unwrap();
        assert_eq!(listings.len(), 2);
    }

    #[test]
    fn parses_wrapped_arrays() {
        let listings =
            parse_import_payload(r#"{"listings":[{"id":"https://x/a"}]}"#).unwrap();
        assert_eq!(listings[0].id, "https://x/a");

        let listings = parse_import_payload(r#"{"data":[{"id":"https://x/a"}]}"#).unwrap();
        assert_eq!(listings[0].id, "https://x/a");
    }

    #[test]
    fn parses_object_map() {
        let listings = parse_import_payload(
            r#"{"https://x/a":{"id":"https://x/a","price_eur":5000},"https://x/b":{"id":"https://x/b"}}"#,
        )
        .unwrap();
        assert_eq!(listings.len(), 2);
    }

    #[test]
    fn rejects_whole_import_on_missing_id() {
        let err = parse_import_payload(r#"[{"id":"https://x/a"},{"price_eur":5000}]"#)
            .unwrap_err();
        assert!(matches!(err, ImportError::MissingId));

        let err = parse_import_payload(r#"[{"id":42}]"#).unwrap_err();
        assert!(matches!(err, ImportError::MissingId));
    }

    #[test]
    fn rejects_invalid_json_and_scalars() {
        assert!(matches!(
            parse_import_payload("{not json"),
            Err(ImportError::InvalidJson)
        ));
        assert!(matches!(
            parse_import_payload("42"),
            Err(ImportError::UnrecognizedShape)
        ));
    }

    #[test]
    fn rejects_non_array_wrapper_keys_as_shape_errors() {
        assert!(matches!(
            parse_import_payload(r#"{"listings":{"id":"https://x/a"}}"#),
            Err(ImportError::UnrecognizedShape)
        ));
        assert!(matches!(
            parse_import_payload(r#"{"data":42}"#),
            Err(ImportError::UnrecognizedShape)
        ));
    }

    #[tokio::test]
    async fn replace_mode_discards_prior_entries() {
        let store = ListingStore::new(MemoryBackend::new());
        store.upsert(&[Listing::new("https://x/old")]).await.unwrap();

        let count = import_listings(
            &store,
            r#"{"data":[{"id":"https://x/a","price_eur":5000}]}"#,
            ImportMode::Replace,
        )
        .await
        .unwrap();
        assert_eq!(count, 1);

        let map = store.load_all().await.unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["https://x/a"].price_eur, Some(5000));
    }

    #[tokio::test]
    async fn merge_mode_runs_the_upsert_path() {
        let store = ListingStore::new(MemoryBackend::new());
        let mut existing = Listing::new("https://x/a");
        existing.title = Some("Skoda Octavia".to_string());
        existing.price_eur = Some(21_000);
        store.upsert(&[existing]).await.unwrap();

        import_listings(
            &store,
            r#"[{"id":"https://x/a","price_eur":20000}]"#,
            ImportMode::Merge,
        )
        .await
        .unwrap();

        let merged = store.get("https://x/a").await.unwrap().unwrap();
        // merge path: title survives, price updates, history extends
        assert_eq!(merged.title.as_deref(), Some("Skoda Octavia"));
        assert_eq!(merged.price_eur, Some(20_000));
        assert_eq!(merged.price_history.len(), 1);
        assert_eq!(merged.price_history[0].price_eur, 20_000);
    }

    #[test]
    fn csv_export_has_fixed_columns() {
        let mut listing = Listing::new("https://x/a");
        listing.price_eur = Some(5_000);
        listing.brand = Some("skoda".to_string());
        listing.trim = Some(Trim::Rs);
        let map: HashMap<String, Listing> =
            [(listing.id.clone(), listing)].into_iter().collect();

        let csv = export_csv(&map).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next().unwrap(), CSV_COLUMNS.join(","));
        let row = lines.next().unwrap();
        assert!(row.starts_with("https://x/a,https://x/a,,5000,skoda,,rs,"));
    }

    #[test]
    fn json_export_round_trips() {
        let mut listing = Listing::new("https://x/a");
        listing.price_eur = Some(5_000);
        let map: HashMap<String, Listing> =
            [(listing.id.clone(), listing.clone())].into_iter().collect();

        let json = export_json(&map).unwrap();
        let parsed = parse_import_payload(&json).unwrap();
        assert_eq!(parsed, vec![listing]);
    }
}

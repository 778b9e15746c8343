//! Durable listing store: merges partial observations into per-listing
//! records and keeps price history.

mod backend;

pub use backend::{JsonFileBackend, MemoryBackend, StoreBackend};

use crate::models::{Listing, PricePoint, Source};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::{debug, info};

/// Merge a newly observed partial listing into an already-known record
///
/// Existing data is never erased by an incoming null: a search-card
/// glimpse must not blank out fields only detail pages populate. The
/// price history is append-only and grows only when the observed price
/// actually changed. Detail provenance is sticky — once a listing has
/// been seen on its detail page, search recaptures do not demote it.
pub fn merge(existing: &Listing, incoming: &Listing) -> Listing {
    let mut merged = existing.clone();

    if !incoming.url.is_empty() {
        merged.url = incoming.url.clone();
    }
    merged.title = incoming.title.clone().or(merged.title);
    merged.price_eur = incoming.price_eur.or(merged.price_eur);
    merged.brand = incoming.brand.clone().or(merged.brand);
    merged.model = incoming.model.clone().or(merged.model);
    merged.trim = incoming.trim.or(merged.trim);
    merged.year = incoming.year.or(merged.year);
    merged.mileage_km = incoming.mileage_km.or(merged.mileage_km);
    merged.ps = incoming.ps.or(merged.ps);
    merged.erstzulassung = incoming.erstzulassung.clone().or(merged.erstzulassung);
    merged.fuel = incoming.fuel.clone().or(merged.fuel);
    merged.drivetrain = incoming.drivetrain.clone().or(merged.drivetrain);
    merged.transmission = incoming.transmission.clone().or(merged.transmission);

    if let Some(price) = incoming.price_eur {
        let last = merged.price_history.last().map(|p| p.price_eur);
        if last != Some(price) {
            merged.price_history.push(PricePoint {
                price_eur: price,
                captured_at: incoming.captured_at.clone(),
            });
        }
    }

    merged.captured_at = incoming.captured_at.clone();
    if incoming.source == Source::Detail {
        merged.source = Source::Detail;
    }

    merged
}

/// The canonical `id -> Listing` mapping behind a durable backend
///
/// All mutation goes through [`merge`]; the mapping is persisted as one
/// serialized record and only rewritten when an operation actually
/// changed something. Persistence failures bubble to the caller.
pub struct ListingStore<B: StoreBackend> {
    backend: B,
}

impl<B: StoreBackend> ListingStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    async fn load_map(&self) -> Result<HashMap<String, Listing>> {
        match self.backend.load().await? {
            Some(raw) => serde_json::from_str(&raw).context("Failed to parse stored listing mapping"),
            None => Ok(HashMap::new()),
        }
    }

    async fn save_map(&self, map: &HashMap<String, Listing>) -> Result<()> {
        let raw = serde_json::to_string(map).context("Failed to serialize listing mapping")?;
        self.backend.save(&raw).await
    }

    /// Insert or merge a batch of observed listings
    ///
    /// Items without an id are skipped. The mapping is persisted only if
    /// at least one record actually changed. Returns the updated mapping.
    pub async fn upsert(&self, incoming: &[Listing]) -> Result<HashMap<String, Listing>> {
        let mut map = self.load_map().await?;
        let mut changed = 0usize;

        for item in incoming {
            if item.id.is_empty() {
                debug!("Skipping listing without id (url: {})", item.url);
                continue;
            }
            let next = match map.get(&item.id) {
                Some(existing) => merge(existing, item),
                None => item.clone(),
            };
            if map.get(&item.id) != Some(&next) {
                map.insert(item.id.clone(), next);
                changed += 1;
            }
        }

        if changed > 0 {
            self.save_map(&map).await?;
            debug!("Upserted {} listings ({} changed)", incoming.len(), changed);
        }
        Ok(map)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Listing>> {
        Ok(self.load_map().await?.remove(id))
    }

    pub async fn load_all(&self) -> Result<HashMap<String, Listing>> {
        self.load_map().await
    }

    pub async fn count(&self) -> Result<usize> {
        Ok(self.load_map().await?.len())
    }

    /// Remove one listing; `false` if the id was unknown
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let mut map = self.load_map().await?;
        let removed = map.remove(id).is_some();
        if removed {
            self.save_map(&map).await?;
        }
        Ok(removed)
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.save_map(&HashMap::new()).await
    }

    /// Replace the whole mapping wholesale (import "replace" mode)
    pub async fn replace_all(&self, map: &HashMap<String, Listing>) -> Result<()> {
        self.save_map(map).await
    }

    /// Remove every listing last captured more than `days` days ago
    ///
    /// Listings whose `captured_at` does not parse are never pruned.
    /// Returns the number of removed records; 0 immediately when `days`
    /// is not a finite positive number.
    pub async fn prune_older_than(&self, days: f64) -> Result<usize> {
        if !days.is_finite() || days <= 0.0 {
            return Ok(0);
        }
        // a window reaching past the representable date range means
        // nothing can be old enough
        let Some(cutoff) =
            Utc::now().checked_sub_signed(Duration::milliseconds((days * 86_400_000.0) as i64))
        else {
            return Ok(0);
        };

        let mut map = self.load_map().await?;
        let before = map.len();
        map.retain(|_, listing| match parse_captured_at(&listing.captured_at) {
            Some(ts) => ts >= cutoff,
            None => true,
        });
        let removed = before - map.len();

        if removed > 0 {
            self.save_map(&map).await?;
            info!("Pruned {} listings older than {} days", removed, days);
        }
        Ok(removed)
    }
}

fn parse_captured_at(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

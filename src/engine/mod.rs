//! Comparable matching and price estimation.
//!
//! Pure functions over a snapshot of the listing mapping: no state, no
//! side effects, safe to call concurrently. The surrounding layer loads
//! the store once and hands the mapping in.

use crate::models::{Analysis, AnalysisFilters, Listing, Source};
use crate::text;
use std::collections::HashMap;

/// Below this many qualifying comparables the estimate falls back to a
/// plain median and the result is flagged as not-enough-data.
pub const MIN_COMPARABLES_FOR_WEIGHTED_ESTIMATE: usize = 10;

/// Maximum first-registration year gap between target and comparable
const YEAR_TOLERANCE: i32 = 2;

/// Maximum mileage gap, as a fraction of the target's mileage
const MILEAGE_TOLERANCE_RATIO: f64 = 0.25;

/// How many ranked comparables the analysis exposes
const TOP_COMPARABLES: usize = 5;

/// Whether two listings refer to the same underlying car
///
/// Equal canonical URLs, or an equal embedded numeric marketplace id
/// (the marketplace issues near-duplicate URLs for the same ad).
/// Ids are canonicalized here so ad-hoc targets carrying query strings
/// still match their stored record.
pub fn is_same_underlying_listing(a: &Listing, b: &Listing) -> bool {
    if text::canonical_url(&a.id) == text::canonical_url(&b.id) {
        return true;
    }
    let num_a = text::numeric_listing_id(&a.id).or_else(|| text::numeric_listing_id(&a.url));
    let num_b = text::numeric_listing_id(&b.id).or_else(|| text::numeric_listing_id(&b.url));
    matches!((num_a, num_b), (Some(x), Some(y)) if x == y)
}

fn attr_filter_passes(active: bool, item: &Option<String>, target: &Option<String>) -> bool {
    if !active {
        return true;
    }
    match (item, target) {
        (Some(a), Some(b)) => text::normalized_eq(a, b),
        _ => false,
    }
}

/// Select every stored listing comparable to the target
///
/// A candidate qualifies when it is a different underlying car of the
/// same brand/model/trim with a known price, within 2 years and 25%
/// mileage of the target, with exactly matching engine power — each
/// numeric rule skipped when either side lacks the attribute. Active
/// strict filters additionally restrict to detail-provenance candidates
/// with a matching attribute.
pub fn find_comparables<'a>(
    target: &Listing,
    listings: &'a HashMap<String, Listing>,
    filters: &AnalysisFilters,
) -> Vec<&'a Listing> {
    let (Some(t_brand), Some(t_model)) = (target.brand.as_deref(), target.model.as_deref()) else {
        return Vec::new();
    };
    let any_strict = filters.match_fuel || filters.match_drivetrain || filters.match_transmission;

    listings
        .values()
        .filter(|item| {
            if is_same_underlying_listing(item, target) {
                return false;
            }
            if item.brand.as_deref() != Some(t_brand) || item.model.as_deref() != Some(t_model) {
                return false;
            }
            // null trim is its own bucket: nulls match nulls
            if item.trim != target.trim {
                return false;
            }
            if any_strict && item.source != Source::Detail {
                return false;
            }
            if !attr_filter_passes(filters.match_fuel, &item.fuel, &target.fuel)
                || !attr_filter_passes(filters.match_drivetrain, &item.drivetrain, &target.drivetrain)
                || !attr_filter_passes(filters.match_transmission, &item.transmission, &target.transmission)
            {
                return false;
            }
            if let (Some(ty), Some(iy)) = (target.year, item.year) {
                if (ty - iy).abs() > YEAR_TOLERANCE {
                    return false;
                }
            }
            if let (Some(tm), Some(im)) = (target.mileage_km, item.mileage_km) {
                if (tm - im).abs() as f64 > tm as f64 * MILEAGE_TOLERANCE_RATIO {
                    return false;
                }
            }
            if let (Some(tp), Some(ip)) = (target.ps, item.ps) {
                if tp != ip {
                    return false;
                }
            }
            item.price_eur.is_some()
        })
        .collect()
}

fn median(prices: &[i64]) -> Option<f64> {
    if prices.is_empty() {
        return None;
    }
    let mut sorted = prices.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) as f64 / 2.0)
    } else {
        Some(sorted[mid] as f64)
    }
}

fn similarity_weight(target: &Listing, comp: &Listing) -> f64 {
    let year_dist = match (target.year, comp.year) {
        (Some(t), Some(c)) => (t - c).abs() as f64,
        _ => 2.0,
    };
    let mileage_ratio = match (target.mileage_km, comp.mileage_km) {
        (Some(t), Some(c)) => (t - c).abs() as f64 / t.max(1) as f64,
        _ => 0.25,
    };
    1.0 / (1.0 + year_dist + mileage_ratio * 4.0)
}

/// Expected market price for the target given its comparables
///
/// Sparse data (fewer than [`MIN_COMPARABLES_FOR_WEIGHTED_ESTIMATE`]
/// comparables) yields the plain median. With enough data the lowest and
/// highest 10% of prices are trimmed and the rest averaged, weighted by
/// similarity in year and mileage.
pub fn estimate_expected_price(target: &Listing, comps: &[&Listing]) -> Option<f64> {
    let prices: Vec<i64> = comps.iter().filter_map(|c| c.price_eur).collect();
    if comps.len() < MIN_COMPARABLES_FOR_WEIGHTED_ESTIMATE {
        return median(&prices);
    }

    let mut by_price: Vec<&Listing> = comps.to_vec();
    by_price.sort_by_key(|c| c.price_eur.unwrap_or(0));
    let cut = by_price.len() / 10;
    let trimmed: &[&Listing] = if by_price.len() > 2 * cut {
        &by_price[cut..by_price.len() - cut]
    } else {
        &by_price
    };

    let mut total_weight = 0.0;
    let mut weighted_sum = 0.0;
    for comp in trimmed {
        if let Some(price) = comp.price_eur {
            let w = similarity_weight(target, comp);
            weighted_sum += w * price as f64;
            total_weight += w;
        }
    }
    if total_weight == 0.0 {
        return median(&prices);
    }
    Some(weighted_sum / total_weight)
}

fn distance_score(target: &Listing, comp: &Listing) -> f64 {
    let year_diff = match (target.year, comp.year) {
        (Some(t), Some(c)) => (t - c).abs() as f64,
        _ => 10.0,
    };
    let mileage_diff = match (target.mileage_km, comp.mileage_km) {
        (Some(t), Some(c)) => (t - c).abs() as f64,
        _ => 999_999.0,
    };
    let ps_diff = match (target.ps, comp.ps) {
        (Some(t), Some(c)) => (t - c).abs() as f64,
        _ => 200.0,
    };
    2.0 * year_diff + mileage_diff / 1000.0 + ps_diff / 10.0
}

/// Rank all comparables by closeness to the target, top 5
///
/// Missing-value defaults push incomplete comparables to the back.
pub fn rank_comparables(target: &Listing, comps: &[&Listing]) -> Vec<Listing> {
    let mut ranked: Vec<&Listing> = comps.to_vec();
    ranked.sort_by(|a, b| distance_score(target, a).total_cmp(&distance_score(target, b)));
    ranked
        .into_iter()
        .take(TOP_COMPARABLES)
        .cloned()
        .collect()
}

/// Analyze one target listing against a snapshot of the store
pub fn analyze(
    target: &Listing,
    listings: &HashMap<String, Listing>,
    filters: &AnalysisFilters,
) -> Analysis {
    let comps = find_comparables(target, listings, filters);
    let expected_price = estimate_expected_price(target, &comps);
    let comparables = rank_comparables(target, &comps);

    let not_enough_data = comps.len() < MIN_COMPARABLES_FOR_WEIGHTED_ESTIMATE
        || expected_price.is_none()
        || target.price_eur.is_none();

    let mut analysis = Analysis {
        expected_price,
        diff_eur: None,
        diff_pct: None,
        deal_score: None,
        comparables_count: comps.len(),
        comparables,
        not_enough_data,
        applied_filters: *filters,
    };

    if !not_enough_data {
        if let (Some(expected), Some(price)) = (expected_price, target.price_eur) {
            let diff = expected - price as f64;
            let pct = diff / expected;
            analysis.diff_eur = Some(diff);
            analysis.diff_pct = Some(pct);
            analysis.deal_score = Some(pct);
        }
    }

    analysis
}

/// Analyze many targets against one snapshot of the store
///
/// Targets without a brand or model can never match anything; they come
/// back with `None` so the caller can skip them outright.
pub fn analyze_batch(
    targets: &[Listing],
    listings: &HashMap<String, Listing>,
    filters: &AnalysisFilters,
) -> Vec<(String, Option<Analysis>)> {
    targets
        .iter()
        .map(|target| {
            let analysis = if target.brand.is_some() && target.model.is_some() {
                Some(analyze(target, listings, filters))
            } else {
                None
            };
            (target.id.clone(), analysis)
        })
        .collect()
}

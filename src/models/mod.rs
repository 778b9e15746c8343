use serde::{Deserialize, Serialize};

/// Provenance of the most recent observation of a listing
///
/// Detail-page captures are higher fidelity: fuel, drivetrain and
/// transmission are only trustworthy when they came from a detail page.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    #[default]
    Search,
    Detail,
}

/// Performance-trim sub-classification within a brand/model bucket
///
/// Currently only distinguishes the RS variant of one model family;
/// every other listing carries no trim at all.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Trim {
    Rs,
    Standard,
}

/// One observed price with the time it was seen
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricePoint {
    pub price_eur: i64,
    /// ISO-8601 timestamp of the observation
    pub captured_at: String,
}

/// A single marketplace car advertisement, identified by canonical URL
///
/// Every field except `id`, `captured_at` and `source` is nullable:
/// search-result cards only expose a subset of the data, and even detail
/// pages are missing attributes often enough that nothing can be assumed.
/// Records are only ever mutated through [`crate::store::merge`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Listing {
    /// Canonical URL (origin + path, no query/fragment). Stable identity key.
    pub id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub price_eur: Option<i64>,
    /// Append-only chronological price history, distinct consecutive values only
    #[serde(default)]
    pub price_history: Vec<PricePoint>,
    /// Lowercased/normalized token derived from the title
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub trim: Option<Trim>,
    /// First-registration year, range [1980, 2035]
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub mileage_km: Option<i64>,
    /// Engine power
    #[serde(default)]
    pub ps: Option<i32>,
    /// Raw first-registration label (detail pages only)
    #[serde(default)]
    pub erstzulassung: Option<String>,
    #[serde(default)]
    pub fuel: Option<String>,
    #[serde(default)]
    pub drivetrain: Option<String>,
    #[serde(default)]
    pub transmission: Option<String>,
    /// ISO-8601 timestamp of the most recent observation. Kept as the raw
    /// string so records with a broken timestamp survive (they are simply
    /// never pruned).
    #[serde(default)]
    pub captured_at: String,
    #[serde(default)]
    pub source: Source,
}

impl Listing {
    /// Bare listing carrying only its identity, everything else absent
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            url: id.clone(),
            id,
            title: None,
            price_eur: None,
            price_history: Vec::new(),
            brand: None,
            model: None,
            trim: None,
            year: None,
            mileage_km: None,
            ps: None,
            erstzulassung: None,
            fuel: None,
            drivetrain: None,
            transmission: None,
            captured_at: String::new(),
            source: Source::Search,
        }
    }
}

/// Per-call toggles for the strict attribute filters
///
/// When any of these is enabled, only detail-provenance candidates
/// qualify, since the attributes are unreliable from search cards.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct AnalysisFilters {
    pub match_fuel: bool,
    pub match_drivetrain: bool,
    pub match_transmission: bool,
}

/// Result of analyzing one target listing against the store
///
/// Computed fresh on every request, never persisted. When
/// `not_enough_data` is set the score fields are all `None`, but
/// `expected_price` and the ranked comparables are still populated when
/// they could be computed — partial information is still useful.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub expected_price: Option<f64>,
    /// `expected_price - target price`; positive means underpriced
    pub diff_eur: Option<f64>,
    pub diff_pct: Option<f64>,
    /// Signed fractional deviation from the expected price. Unclamped;
    /// can exceed ±100% in extreme cases.
    pub deal_score: Option<f64>,
    pub comparables_count: usize,
    /// Top 5 comparables, closest first
    pub comparables: Vec<Listing>,
    pub not_enough_data: bool,
    pub applied_filters: AnalysisFilters,
}

/// Qualitative bucket for a deal score
///
/// These thresholds are the output contract consumers rely on:
/// great ≥ +10%, good ≥ +3%, fair ≥ -3%, everything below is overpriced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DealRating {
    Great,
    Good,
    Fair,
    Overpriced,
}

impl DealRating {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.10 {
            DealRating::Great
        } else if score >= 0.03 {
            DealRating::Good
        } else if score >= -0.03 {
            DealRating::Fair
        } else {
            DealRating::Overpriced
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DealRating::Great => "great deal",
            DealRating::Good => "good deal",
            DealRating::Fair => "fair price",
            DealRating::Overpriced => "overpriced",
        }
    }
}

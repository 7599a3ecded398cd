//! Canonical data types produced by the collection engine.
//!
//! Everything here is constructed by the [`normalize`](crate::normalize)
//! module and is immutable thereafter; these are plain serde-derived value
//! objects, not entities with repository-backed lifecycles.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inclusive lower/upper bound pair the remote service returns in lieu of an
/// exact count (impressions, spend, reach).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericRange {
    pub lower: Option<i64>,
    pub upper: Option<i64>,
    /// Only meaningful for spend ranges.
    pub currency: Option<String>,
}

impl NumericRange {
    pub fn new(lower: Option<i64>, upper: Option<i64>) -> Self {
        Self {
            lower,
            upper,
            currency: None,
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    /// `true` when both bounds are present and consistent (lower <= upper).
    pub fn is_consistent(&self) -> bool {
        match (self.lower, self.upper) {
            (Some(lo), Some(hi)) => lo <= hi,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageDescriptor {
    pub id: String,
    pub name: Option<String>,
    pub verified: bool,
    pub like_count: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CreativeVariant {
    pub body: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub link_url: Option<String>,
    pub image_url: Option<String>,
    pub video_urls: Vec<String>,
    pub thumbnail_url: Option<String>,
    pub call_to_action: Option<String>,
}

/// The canonical, normalized ad record. Constructed exclusively by
/// [`crate::normalize::normalize_ad`]; every field beyond `id` is optional
/// because the remote service's schema dialects drop fields freely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdRecord {
    pub id: String,
    pub page: Option<PageDescriptor>,
    pub is_active: Option<bool>,
    pub start_time: Option<DateTime<Utc>>,
    pub stop_time: Option<DateTime<Utc>>,
    pub creatives: Vec<CreativeVariant>,
    pub impressions: Option<NumericRange>,
    pub spend: Option<NumericRange>,
    pub reach: Option<NumericRange>,
    pub publisher_platforms: BTreeSet<String>,
    pub languages: Vec<String>,
    pub funding_entity: Option<String>,
    pub disclaimer: Option<String>,
    pub demographic_distribution: Vec<serde_json::Value>,
    pub regional_distribution: Vec<serde_json::Value>,
    pub category: Option<String>,
    pub collation_id: Option<String>,
    pub collation_count: Option<u32>,
    /// Transient: stamped at normalization time, excluded from idempotence
    /// comparisons (renormalizing a serialized record should reproduce every
    /// other field but will naturally get a fresh `collected_at`).
    pub collected_at: DateTime<Utc>,
}

impl AdRecord {
    /// Structural equality ignoring the transient `collected_at` stamp, used
    /// to check normalizer round-trip idempotence.
    pub fn eq_ignoring_collected_at(&self, other: &AdRecord) -> bool {
        let mut a = self.clone();
        let mut b = other.clone();
        a.collected_at = b.collected_at;
        a == b
    }
}

/// Supported ad types accepted by [`crate::collector::SearchParams`].
pub const AD_TYPES: &[&str] = &["political_and_issue_ads", "all", "housing_ads", "employment_ads"];
/// Supported ad statuses.
pub const AD_STATUSES: &[&str] = &["active", "inactive", "all"];
/// Supported search types.
pub const SEARCH_TYPES: &[&str] = &["keyword_unordered", "keyword_exact_phrase", "page"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_range_consistency() {
        assert!(NumericRange::new(Some(1), Some(2)).is_consistent());
        assert!(!NumericRange::new(Some(5), Some(1)).is_consistent());
        assert!(NumericRange::new(None, Some(1)).is_consistent());
        assert!(NumericRange::new(Some(1), None).is_consistent());
    }
}

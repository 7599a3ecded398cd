//! Filter predicate: a pure function over a normalized ad record.
//!
//! Policy: a record is rejected only when a filtered field is present on
//! the record and fails its configured bound. A record missing the field
//! being filtered on is always yielded (missing-data-inclusive).

use crate::models::AdRecord;

/// Caller-supplied bounds; any field left `None`/empty imposes no
/// constraint.
#[derive(Debug, Clone, Default)]
pub struct FilterConfig {
    pub min_impressions: Option<i64>,
    pub max_impressions: Option<i64>,
    pub min_spend: Option<i64>,
    pub max_spend: Option<i64>,
    pub active_only: bool,
    pub required_publisher_platforms: Vec<String>,
    pub required_languages: Vec<String>,
}

impl FilterConfig {
    pub fn new() -> Self {
        Self::default()
    }
}

/// `true` if `record` satisfies every bound in `config`.
pub fn passes(record: &AdRecord, config: &FilterConfig) -> bool {
    if config.active_only && record.is_active == Some(false) {
        return false;
    }

    let impressions_upper = record.impressions.as_ref().and_then(|r| r.upper);
    let impressions_lower = record.impressions.as_ref().and_then(|r| r.lower);
    let spend_upper = record.spend.as_ref().and_then(|r| r.upper);
    let spend_lower = record.spend.as_ref().and_then(|r| r.lower);

    if !bound_ok(impressions_upper, config.min_impressions, Ordering::Lower) {
        return false;
    }
    if !bound_ok(impressions_lower, config.max_impressions, Ordering::Upper) {
        return false;
    }
    if !bound_ok(spend_upper, config.min_spend, Ordering::Lower) {
        return false;
    }
    if !bound_ok(spend_lower, config.max_spend, Ordering::Upper) {
        return false;
    }

    if !config.required_publisher_platforms.is_empty() {
        let any_present = record.publisher_platforms.iter().next().is_some();
        if any_present
            && !config
                .required_publisher_platforms
                .iter()
                .any(|p| record.publisher_platforms.contains(p))
        {
            return false;
        }
    }

    if !config.required_languages.is_empty() && !record.languages.is_empty() {
        let any_match = config.required_languages.iter().any(|l| record.languages.contains(l));
        if !any_match {
            return false;
        }
    }

    true
}

enum Ordering {
    /// The record's value must be >= the configured bound.
    Lower,
    /// The record's value must be <= the configured bound.
    Upper,
}

/// Missing-data-inclusive bound check: `None` on either side imposes no
/// rejection.
fn bound_ok(value: Option<i64>, bound: Option<i64>, direction: Ordering) -> bool {
    match (value, bound) {
        (Some(v), Some(b)) => match direction {
            Ordering::Lower => v >= b,
            Ordering::Upper => v <= b,
        },
        _ => true,
    }
}

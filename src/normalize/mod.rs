//! Response normalizer
//!
//! The remote service emits ad records in multiple schema dialects:
//! snake_case and camelCase keys appear interchangeably, creative content
//! appears either as a `cards` array or as parallel `body`/`title` arrays,
//! and numeric ranges show up as structured objects, range-strings, or bare
//! scalars. Rather than branching on dialect, every field is described as a
//! declarative list of `(alias, parser)` attempts tried in order: the first
//! alias present on the raw value wins. Adding a new alias is a one-line
//! change to the relevant list, never a new branch.

mod range_string;

use std::collections::BTreeSet;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::models::{AdRecord, CreativeVariant, NumericRange, PageDescriptor};
pub use range_string::parse_range_string;

/// Try each alias in order against a JSON object, returning the first
/// present (non-null) value.
fn first_alias<'a>(value: &'a Value, aliases: &[&str]) -> Option<&'a Value> {
    let obj = value.as_object()?;
    for alias in aliases {
        if let Some(v) = obj.get(*alias) {
            if !v.is_null() {
                return Some(v);
            }
        }
    }
    None
}

fn first_str(value: &Value, aliases: &[&str]) -> Option<String> {
    first_alias(value, aliases)?.as_str().map(str::to_string)
}

fn first_bool(value: &Value, aliases: &[&str]) -> Option<bool> {
    first_alias(value, aliases)?.as_bool()
}

fn first_i64(value: &Value, aliases: &[&str]) -> Option<i64> {
    first_alias(value, aliases)?.as_i64()
}

/// Timestamps show up as ISO-8601 strings in some dialects, Unix integers
/// in others. Guard both shapes; anything else is left absent.
fn first_timestamp(value: &Value, aliases: &[&str]) -> Option<DateTime<Utc>> {
    let raw = first_alias(value, aliases)?;
    if let Some(s) = raw.as_str() {
        return DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc));
    }
    if let Some(n) = raw.as_i64() {
        return Utc.timestamp_opt(n, 0).single();
    }
    None
}

/// Numeric-range fields (impressions, spend, reach) show up as a structured
/// dict with explicit bounds, a human range-string, or a bare scalar.
fn parse_numeric_range_value(value: &Value) -> Option<NumericRange> {
    if let Some(obj) = value.as_object() {
        let lower = obj
            .get("lower_bound")
            .or_else(|| obj.get("lowerBound"))
            .and_then(Value::as_i64);
        let upper = obj
            .get("upper_bound")
            .or_else(|| obj.get("upperBound"))
            .and_then(Value::as_i64);
        let currency = obj
            .get("currency")
            .and_then(Value::as_str)
            .map(str::to_string);
        if lower.is_some() || upper.is_some() {
            let mut range = NumericRange::new(lower, upper);
            range.currency = currency;
            return Some(range);
        }
        return None;
    }
    if let Some(s) = value.as_str() {
        return parse_range_string(s);
    }
    if let Some(n) = value.as_i64() {
        return Some(NumericRange::new(Some(n), Some(n)));
    }
    None
}

fn first_numeric_range(value: &Value, aliases: &[&str]) -> Option<NumericRange> {
    let raw = first_alias(value, aliases)?;
    parse_numeric_range_value(raw)
}

/// `cards` array dialect, or parallel `body`/`title` arrays, whichever is
/// present wins; if neither is present, a single creative is synthesized
/// from top-level body/title fields (falling back to an empty variant when
/// even those are absent, since creatives is never itself load-bearing for
/// whether a record is usable).
fn extract_creatives(value: &Value) -> Vec<CreativeVariant> {
    if let Some(cards) = first_alias(value, &["cards", "ad_creative_cards"]).and_then(Value::as_array) {
        return cards.iter().map(creative_from_card).collect();
    }

    let bodies = first_alias(value, &["ad_creative_bodies", "bodies"]).and_then(Value::as_array);
    let titles = first_alias(value, &["ad_creative_link_titles", "titles"]).and_then(Value::as_array);
    if bodies.is_some() || titles.is_some() {
        let len = bodies.map(|a| a.len()).unwrap_or(0).max(titles.map(|a| a.len()).unwrap_or(0));
        return (0..len)
            .map(|i| CreativeVariant {
                body: bodies.and_then(|a| a.get(i)).and_then(Value::as_str).map(str::to_string),
                title: titles.and_then(|a| a.get(i)).and_then(Value::as_str).map(str::to_string),
                ..Default::default()
            })
            .collect();
    }

    let single = CreativeVariant {
        body: first_str(value, &["body", "ad_body"]),
        title: first_str(value, &["title", "ad_title"]),
        description: first_str(value, &["description", "link_description"]),
        link_url: first_str(value, &["link_url", "linkUrl"]),
        image_url: first_str(value, &["image_url", "imageUrl"]),
        video_urls: first_alias(value, &["video_urls", "videoUrls"])
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default(),
        thumbnail_url: first_str(value, &["video_preview_image_url", "thumbnail_url"]),
        call_to_action: first_str(value, &["cta_text", "call_to_action_text"]),
    };

    if single == CreativeVariant::default() {
        Vec::new()
    } else {
        vec![single]
    }
}

fn creative_from_card(card: &Value) -> CreativeVariant {
    CreativeVariant {
        body: first_str(card, &["body", "ad_body"]),
        title: first_str(card, &["title", "ad_title"]),
        description: first_str(card, &["link_description", "description"]),
        link_url: first_str(card, &["link_url", "linkUrl"]),
        image_url: first_str(card, &["original_image_url", "image_url"]),
        video_urls: first_alias(card, &["video_hd_url", "video_sd_url"])
            .and_then(Value::as_str)
            .map(|s| vec![s.to_string()])
            .unwrap_or_default(),
        thumbnail_url: first_str(card, &["video_preview_image_url", "thumbnail_url"]),
        call_to_action: first_str(card, &["cta_text", "call_to_action_text"]),
    }
}

/// Publisher platforms show up under singular or plural aliases and may be
/// a single string or an array; collapse everything into one set.
fn extract_publisher_platforms(value: &Value) -> BTreeSet<String> {
    let Some(raw) = first_alias(value, &["publisher_platform", "publisher_platforms"]) else {
        return BTreeSet::new();
    };
    if let Some(arr) = raw.as_array() {
        return arr.iter().filter_map(Value::as_str).map(str::to_string).collect();
    }
    if let Some(s) = raw.as_str() {
        return [s.to_string()].into_iter().collect();
    }
    BTreeSet::new()
}

fn extract_page(value: &Value) -> Option<PageDescriptor> {
    let id = first_str(value, &["page_id", "pageId"])?;
    Some(PageDescriptor {
        id,
        name: first_str(value, &["page_name", "pageName"]),
        verified: first_bool(value, &["page_is_verified", "is_verified"]).unwrap_or(false),
        like_count: first_i64(value, &["page_like_count", "pageLikeCount"]),
    })
}

/// Normalize one raw protocol record into the canonical [`AdRecord`].
/// Normalization is total: any input carrying an identifier produces a
/// record; anything without one produces nothing.
pub fn normalize_ad(raw: &Value) -> Option<AdRecord> {
    let id = first_str(raw, &["ad_archive_id", "adArchiveID", "id"])?;
    if id.is_empty() {
        return None;
    }

    Some(AdRecord {
        id,
        page: extract_page(raw),
        is_active: first_bool(raw, &["is_active", "isActive"]),
        start_time: first_timestamp(raw, &["start_date", "startDate", "ad_delivery_start_time"]),
        stop_time: first_timestamp(raw, &["end_date", "endDate", "ad_delivery_stop_time"]),
        creatives: extract_creatives(raw),
        impressions: first_numeric_range(raw, &["impressions", "impression_range"]),
        spend: first_numeric_range(raw, &["spend", "spend_range"]),
        reach: first_numeric_range(raw, &["reach_estimate", "reach"]),
        publisher_platforms: extract_publisher_platforms(raw),
        languages: first_alias(raw, &["languages", "ad_languages"])
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default(),
        funding_entity: first_str(raw, &["funding_entity", "fundingEntity"]),
        disclaimer: first_str(raw, &["disclaimer", "byline"]),
        demographic_distribution: first_alias(raw, &["demographic_distribution", "age_country_gender_reach_breakdown"])
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        regional_distribution: first_alias(raw, &["region_distribution", "delivery_by_region"])
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        category: first_str(raw, &["category", "political_countries"]),
        collation_id: first_str(raw, &["collation_id", "collationId"]),
        collation_count: first_i64(raw, &["collation_count", "collationCount"]).map(|n| n.max(0) as u32),
        collected_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_identifier_produces_nothing() {
        let raw = json!({ "page_name": "Acme" });
        assert!(normalize_ad(&raw).is_none());
    }

    #[test]
    fn snake_case_dialect() {
        let raw = json!({
            "ad_archive_id": "123",
            "page_id": "p1",
            "page_name": "Acme",
            "is_active": true,
            "impressions": { "lower_bound": "1000", "upper_bound": "2000" },
        });
        // lower/upper as strings should be ignored cleanly by as_i64 (None)
        let record = normalize_ad(&raw).unwrap();
        assert_eq!(record.id, "123");
        assert_eq!(record.page.unwrap().id, "p1");
        assert_eq!(record.is_active, Some(true));
    }

    #[test]
    fn camel_case_dialect_with_range_string_spend() {
        let raw = json!({
            "adArchiveID": "456",
            "spend": ">1M",
        });
        let record = normalize_ad(&raw).unwrap();
        assert_eq!(record.id, "456");
        let spend = record.spend.unwrap();
        assert_eq!(spend.lower, Some(1_000_000));
        assert_eq!(spend.upper, None);
    }

    #[test]
    fn unexpected_shape_is_absent_not_an_error() {
        let raw = json!({
            "ad_archive_id": "789",
            "impressions": "not-a-range-at-all-$$$",
        });
        let record = normalize_ad(&raw).unwrap();
        assert!(record.impressions.is_none());
    }

    #[test]
    fn cards_dialect_creatives() {
        let raw = json!({
            "ad_archive_id": "1",
            "cards": [
                { "body": "hello", "title": "t1" },
                { "body": "world", "title": "t2" },
            ],
        });
        let record = normalize_ad(&raw).unwrap();
        assert_eq!(record.creatives.len(), 2);
        assert_eq!(record.creatives[0].body.as_deref(), Some("hello"));
    }

    #[test]
    fn parallel_array_dialect_creatives() {
        let raw = json!({
            "ad_archive_id": "2",
            "ad_creative_bodies": ["a", "b"],
            "ad_creative_link_titles": ["ta", "tb"],
        });
        let record = normalize_ad(&raw).unwrap();
        assert_eq!(record.creatives.len(), 2);
        assert_eq!(record.creatives[1].title.as_deref(), Some("tb"));
    }

    #[test]
    fn publisher_platform_singular_and_plural_collapse() {
        let singular = json!({ "ad_archive_id": "1", "publisher_platform": "facebook" });
        let plural = json!({ "ad_archive_id": "2", "publisher_platforms": ["facebook", "instagram"] });
        assert_eq!(
            normalize_ad(&singular).unwrap().publisher_platforms,
            ["facebook".to_string()].into_iter().collect()
        );
        assert_eq!(
            normalize_ad(&plural).unwrap().publisher_platforms.len(),
            2
        );
    }

    #[test]
    fn idempotent_through_serialization() {
        let raw = json!({
            "ad_archive_id": "idem-1",
            "page_id": "p1",
            "impressions": ">1M",
        });
        let record = normalize_ad(&raw).unwrap();
        let serialized = serde_json::to_string(&record).unwrap();
        let roundtripped: AdRecord = serde_json::from_str(&serialized).unwrap();
        assert!(record.eq_ignoring_collected_at(&roundtripped));
    }
}

//! Search parameters validated once, eagerly, before any network call.

use crate::errors::{AppError, AppResult};
use crate::models::{AD_STATUSES, AD_TYPES, SEARCH_TYPES};

/// One search request: keywords or a page identifier, scoped to a country.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub country: String,
    pub query: String,
    pub ad_type: String,
    pub ad_status: String,
    pub search_type: String,
    pub page_id: Option<String>,
}

impl SearchParams {
    /// Country code well-formed (two-letter, uppercase-or-lowercase
    /// alphabetic), ad_type/status/search_type within their enumerated
    /// sets. Raises *InvalidParameter* naming the offending field, value,
    /// and allowed set.
    pub fn validate(&self) -> AppResult<()> {
        if self.country.len() != 2 || !self.country.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(AppError::invalid_parameter(
                "country",
                self.country.clone(),
                &["<ISO 3166-1 alpha-2>"],
            ));
        }
        if !AD_TYPES.contains(&self.ad_type.as_str()) {
            return Err(AppError::invalid_parameter("ad_type", self.ad_type.clone(), AD_TYPES));
        }
        if !AD_STATUSES.contains(&self.ad_status.as_str()) {
            return Err(AppError::invalid_parameter(
                "ad_status",
                self.ad_status.clone(),
                AD_STATUSES,
            ));
        }
        if !SEARCH_TYPES.contains(&self.search_type.as_str()) {
            return Err(AppError::invalid_parameter(
                "search_type",
                self.search_type.clone(),
                SEARCH_TYPES,
            ));
        }
        Ok(())
    }

    /// The GraphQL `variables` object for one page request at `cursor`
    /// requesting `page_size` records.
    pub fn to_variables(&self, cursor: Option<&str>, page_size: u32) -> serde_json::Value {
        serde_json::json!({
            "activeStatus": self.ad_status,
            "adType": self.ad_type,
            "countries": [self.country],
            "cursor": cursor,
            "pageIDs": self.page_id.as_ref().map(|id| vec![id.clone()]).unwrap_or_default(),
            "queryString": self.query,
            "searchType": self.search_type,
            "count": page_size,
        })
    }
}

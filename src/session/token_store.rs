//! Token store: the opaque short-lived values every GraphQL call must echo
//! back, plus the two GraphQL document ids. Extracted from the landing
//! page's script payloads by regex, with a declared alias priority order
//! per key (first match wins) and a build-time constant fallback when a key
//! is absent entirely.

use std::collections::HashMap;

use regex::Regex;

use crate::constants;
use crate::errors::{AppError, AppResult};

/// One `(name, patterns)` entry: the patterns are tried in order, first
/// match wins.
struct TokenSpec {
    key: &'static str,
    patterns: &'static [&'static str],
    fallback: &'static str,
    mandatory: bool,
}

const TOKEN_SPECS: &[TokenSpec] = &[
    TokenSpec {
        key: "lsd",
        patterns: &[
            r#""LSD"\s*,\s*\[\]\s*,\s*\{\s*"token"\s*:\s*"([^"]+)""#,
            r#"name="lsd"\s+value="([^"]+)""#,
            r#""lsd":"([^"]+)""#,
        ],
        fallback: "",
        mandatory: true,
    },
    TokenSpec {
        key: "fb_dtsg",
        patterns: &[
            r#""DTSGInitialData"\s*,\s*\[\]\s*,\s*\{\s*"token"\s*:\s*"([^"]+)""#,
            r#"name="fb_dtsg"\s+value="([^"]+)""#,
            r#""fb_dtsg":"([^"]+)""#,
        ],
        fallback: constants::FALLBACK_FB_DTSG,
        mandatory: false,
    },
    TokenSpec {
        key: "__rev",
        patterns: &[r#""__spin_r":(\d+)"#, r#""client_revision":(\d+)"#],
        fallback: constants::FALLBACK_REV,
        mandatory: false,
    },
    TokenSpec {
        key: "__spin_r",
        patterns: &[r#""__spin_r":(\d+)"#],
        fallback: constants::FALLBACK_SPIN_R,
        mandatory: false,
    },
    TokenSpec {
        key: "__spin_t",
        patterns: &[r#""__spin_t":(\d+)"#],
        fallback: constants::FALLBACK_SPIN_T,
        mandatory: false,
    },
    TokenSpec {
        key: "__hsi",
        patterns: &[r#""hsi":"(\d+)""#],
        fallback: constants::FALLBACK_HSI,
        mandatory: false,
    },
    TokenSpec {
        key: "__dyn",
        patterns: &[r#""__dyn":"([^"]+)""#],
        fallback: constants::FALLBACK_DYN,
        mandatory: false,
    },
    TokenSpec {
        key: "__csr",
        patterns: &[r#""__csr":"([^"]+)""#],
        fallback: constants::FALLBACK_CSR,
        mandatory: false,
    },
];

/// The two named GraphQL document ids, extracted separately from the token
/// set above since they're looked up by query name, not by a fixed key.
struct DocIdSpec {
    key: &'static str,
    patterns: &'static [&'static str],
    fallback: &'static str,
}

const DOC_ID_SPECS: &[DocIdSpec] = &[
    DocIdSpec {
        key: "ad_search_doc_id",
        patterns: &[
            r#""name":"AdLibrarySearchPaginationQuery"[^}]*"id":"(\d+)""#,
            r#""queryName":"AdLibrarySearchPaginationQuery"[^}]*"id":"(\d+)""#,
            r#"AdLibrarySearchPaginationQuery.{0,200}?(\d{15,20})"#,
        ],
        fallback: constants::FALLBACK_AD_SEARCH_DOC_ID,
    },
    DocIdSpec {
        key: "typeahead_doc_id",
        patterns: &[
            r#""name":"TypeaheadQuery"[^}]*"id":"(\d+)""#,
            r#""queryName":"TypeaheadQuery"[^}]*"id":"(\d+)""#,
            r#"TypeaheadQuery.{0,200}?(\d{15,20})"#,
        ],
        fallback: constants::FALLBACK_TYPEAHEAD_DOC_ID,
    },
];

/// Opaque mapping of token name to value, plus the two document ids.
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    values: HashMap<String, String>,
}

impl TokenStore {
    pub fn get(&self, key: &str) -> &str {
        self.values.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn ad_search_doc_id(&self) -> &str {
        self.get("ad_search_doc_id")
    }

    pub fn typeahead_doc_id(&self) -> &str {
        self.get("typeahead_doc_id")
    }

    pub fn lsd(&self) -> &str {
        self.get("lsd")
    }

    /// Extract every recognized token and document id from a landing-page
    /// body. Fails with `AuthenticationFailed` if the mandatory `lsd` token
    /// cannot be found.
    pub fn extract_from(body: &str) -> AppResult<Self> {
        let mut values = HashMap::new();

        for spec in TOKEN_SPECS {
            let extracted = extract_first_match(body, spec.patterns);
            match extracted {
                Some(v) => {
                    values.insert(spec.key.to_string(), v);
                }
                None if spec.mandatory => {
                    return Err(AppError::authentication_failed(format!(
                        "mandatory token '{}' not found in landing page",
                        spec.key
                    )));
                }
                None => {
                    values.insert(spec.key.to_string(), spec.fallback.to_string());
                }
            }
        }

        for spec in DOC_ID_SPECS {
            let extracted = extract_first_match(body, spec.patterns).unwrap_or_else(|| spec.fallback.to_string());
            values.insert(spec.key.to_string(), extracted);
        }

        if values.get("lsd").map(String::is_empty).unwrap_or(true) {
            return Err(AppError::authentication_failed("extracted lsd was empty"));
        }

        // jazoest may be computed deterministically from lsd when absent;
        // see SPEC_FULL.md §4.2A. This is the one documented stable case;
        // anything beyond it is explicitly out of scope.
        let jazoest = extract_first_match(body, &[r#""jazoest":"(\d+)""#, r#"name="jazoest"\s+value="(\d+)""#])
            .unwrap_or_else(|| derive_jazoest(values.get("lsd").unwrap()));
        values.insert("jazoest".to_string(), jazoest);

        Ok(Self { values })
    }
}

fn extract_first_match(body: &str, patterns: &[&str]) -> Option<String> {
    for pattern in patterns {
        // Patterns are a fixed, build-time literal table: compiling per
        // call keeps the priority-order, first-match-wins logic in one
        // place without a cache that could outlive a session.
        if let Ok(re) = Regex::new(pattern) {
            if let Some(caps) = re.captures(body) {
                if let Some(m) = caps.get(1) {
                    return Some(m.as_str().to_string());
                }
            }
        }
    }
    None
}

/// `jazoest` = `"2"` followed by the sum of the decimal byte value of every
/// character in `lsd`.
fn derive_jazoest(lsd: &str) -> String {
    let sum: u32 = lsd.bytes().map(u32::from).sum();
    format!("2{sum}")
}

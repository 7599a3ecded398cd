//! Build-time fallback values.
//!
//! These are process-wide read-only constants: initialized once, never
//! mutated, standing in for whatever the landing page's regex extraction
//! fails to find. Per the Design Notes, treat this as a constant table, not
//! mutable state: there is no `OnceCell` or `lazy_static` here because
//! nothing here is ever computed, only read.

/// Fallback GraphQL document id for the ad-search query.
pub const FALLBACK_AD_SEARCH_DOC_ID: &str = "1234567890123456";
/// Fallback GraphQL document id for the page-name typeahead query.
pub const FALLBACK_TYPEAHEAD_DOC_ID: &str = "2345678901234567";

/// Fallback values for optional tokens, used when the landing page's script
/// payloads omit them.
pub const FALLBACK_FB_DTSG: &str = "";
pub const FALLBACK_REV: &str = "1";
pub const FALLBACK_SPIN_R: &str = "1";
pub const FALLBACK_SPIN_T: &str = "0";
pub const FALLBACK_HSI: &str = "";
pub const FALLBACK_DYN: &str = "";
pub const FALLBACK_CSR: &str = "";

/// Maximum age of a session before it must be refreshed before dispatch.
pub const MAX_SESSION_AGE_SECS: u64 = 30 * 60;

/// Fixed GraphQL path on the remote host.
pub const GRAPHQL_PATH: &str = "/api/graphql/";

/// Root of the remote host, used for both the landing page and the
/// GraphQL path above.
pub const BASE_URL: &str = "https://www.facebook.com";

/// Path for the ad library front page landing fetch.
pub const LANDING_PATH: &str = "/ads/library/";

/// Substring marker that identifies a verification-challenge page body.
pub const CHALLENGE_MARKER: &str = "id=\"challenge\"";

/// Human-jitter delay bounds (seconds) applied once after initialization.
pub const POST_INIT_JITTER_MIN_SECS: f64 = 1.5;
pub const POST_INIT_JITTER_MAX_SECS: f64 = 3.0;

/// Substring marker identifying a rate-limit error inside a GraphQL
/// `errors[].message` body, case-insensitive.
pub const RATE_LIMIT_BODY_MARKER: &str = "please wait";

/// Default retry-after when the remote service signals a rate limit
/// without a `Retry-After` header.
pub const DEFAULT_RATE_LIMIT_RETRY_AFTER_SECS: u64 = 60;

/// `fb_api_caller_class` form field, constant across requests.
pub const FB_API_CALLER_CLASS: &str = "RelayModern";

//! Error type definitions for the ad library collector
//!
//! This module defines all error types the collection engine can raise,
//! using `thiserror` to provide automatic error trait implementations and
//! proper error chaining.

use std::time::Duration;

use thiserror::Error;

/// Top-level collector error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Bootstrap or token refresh could not obtain a working `lsd` after one
    /// challenge round and one retry.
    #[error("authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// Remote service signaled 429 or a rate-limit body marker.
    #[error("rate limited: retry after {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    /// Consecutive refresh failures exceeded the configured cap; the
    /// collector is unusable until reconstructed.
    #[error("session expired after {consecutive_failures} consecutive refresh failures")]
    SessionExpired { consecutive_failures: u32 },

    /// Proxy input malformed; raised at construction, not during collection.
    #[error("proxy unusable: {endpoint} - {message}")]
    ProxyUnusable { endpoint: String, message: String },

    /// The proxy pool has no configured endpoints.
    #[error("no proxy endpoints configured")]
    NoEndpointsConfigured,

    /// A supplied enumerated parameter is outside its allowed set.
    #[error("invalid parameter {field}: {value:?} not in {allowed:?}")]
    InvalidParameter {
        field: String,
        value: String,
        allowed: Vec<String>,
    },

    /// Response could not be parsed or lacked a `data` envelope after a
    /// successful HTTP response.
    #[error("protocol error: {message}")]
    ProtocolError { message: String, raw_body: String },

    /// Connection-level failure after retries.
    #[error("network error: {message}")]
    NetworkError { message: String },

    /// Database-related errors from the persistent dedup tracker.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP client errors surfaced directly from `reqwest`.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON (de)serialization errors.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors raised at collector construction.
    #[error("configuration error: {message}")]
    Configuration { message: String },
}

/// Convenience constructors
impl AppError {
    pub fn authentication_failed<S: Into<String>>(message: S) -> Self {
        Self::AuthenticationFailed {
            message: message.into(),
        }
    }

    pub fn rate_limited(retry_after: Duration) -> Self {
        Self::RateLimited { retry_after }
    }

    pub fn proxy_unusable<E: Into<String>, M: Into<String>>(endpoint: E, message: M) -> Self {
        Self::ProxyUnusable {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn invalid_parameter<F: Into<String>, V: Into<String>>(
        field: F,
        value: V,
        allowed: &[&str],
    ) -> Self {
        Self::InvalidParameter {
            field: field.into(),
            value: value.into(),
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn protocol_error<M: Into<String>, B: Into<String>>(message: M, raw_body: B) -> Self {
        Self::ProtocolError {
            message: message.into(),
            raw_body: raw_body.into(),
        }
    }

    pub fn network_error<M: Into<String>>(message: M) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    pub fn configuration<M: Into<String>>(message: M) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Whether this error should terminate an in-progress collection
    /// iterator cleanly (no propagation) rather than being re-raised.
    pub fn is_exhausted_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

pub type AppResult<T> = Result<T, AppError>;

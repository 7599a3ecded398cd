//! Request pipeline: issues a GraphQL POST, classifies the outcome, and
//! drives retry, refresh, or propagation per the classification table in
//! the Component Design notes.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::constants::{
    DEFAULT_RATE_LIMIT_RETRY_AFTER_SECS, FB_API_CALLER_CLASS, GRAPHQL_PATH, POST_INIT_JITTER_MAX_SECS,
    POST_INIT_JITTER_MIN_SECS, RATE_LIMIT_BODY_MARKER,
};
use crate::errors::{AppError, AppResult};
use crate::events::{EventEmitter, EventType, LifecycleEvent};
use crate::proxy::ProxyPool;
use crate::session::{bootstrap, SharedSession};

/// One outstanding GraphQL call's shape, independent of the search
/// semantics layered on top by the collector.
pub struct GraphQlCall {
    pub friendly_name: String,
    pub doc_id: String,
    pub variables: Value,
}

/// Friendly name the remote GraphQL endpoint uses to identify the
/// paginated ad-search query, echoed back in `fb_api_req_friendly_name`.
pub const AD_SEARCH_FRIENDLY_NAME: &str = "AdLibrarySearchPaginationQuery";

/// Context the pipeline needs beyond the call itself: which country/ad_type
/// to bootstrap the session against, and the tuning knobs from
/// [`crate::config::CollectorConfig`].
pub struct PipelineSettings {
    pub rate_limit_delay: f64,
    pub jitter: f64,
    pub timeout: Duration,
    pub max_retries: u32,
}

pub struct RequestPipeline {
    session: SharedSession,
    proxy_pool: Option<Arc<ProxyPool>>,
    settings: PipelineSettings,
    emitter: Arc<EventEmitter>,
}

impl RequestPipeline {
    pub fn new(
        session: SharedSession,
        proxy_pool: Option<Arc<ProxyPool>>,
        settings: PipelineSettings,
        emitter: Arc<EventEmitter>,
    ) -> Self {
        Self {
            session,
            proxy_pool,
            settings,
            emitter,
        }
    }

    /// Ensure the session is bootstrapped and not stale before dispatching
    /// any GraphQL call. A session that has never been bootstrapped runs a
    /// plain initialization (no `session_refreshed` event); a session that
    /// is ready but stale runs an actual refresh (emits one).
    async fn ensure_session_ready(&self, country: &str, ad_type: &str) -> AppResult<()> {
        if self.session.is_ready().await && !self.session.is_stale().await {
            return Ok(());
        }
        let is_refresh = self.session.is_ready().await;
        self.bootstrap_session(country, ad_type, is_refresh).await
    }

    /// Run the bootstrap state machine. `is_refresh` controls whether this
    /// emits `session_refreshed` — true for an actual refresh (staleness or
    /// a 403 recovery), false for the session's first-ever initialization.
    async fn bootstrap_session(&self, country: &str, ad_type: &str, is_refresh: bool) -> AppResult<()> {
        match bootstrap(&self.session, country, ad_type).await {
            Ok(()) => {
                tracing::info!(is_refresh, "session bootstrap succeeded");
                if is_refresh {
                    self.emitter.emit(LifecycleEvent::new(
                        EventType::SessionRefreshed,
                        serde_json::json!({ "country": country, "ad_type": ad_type }),
                    ));
                }
                sleep_uniform(POST_INIT_JITTER_MIN_SECS, POST_INIT_JITTER_MAX_SECS).await;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "session bootstrap failed");
                self.session.record_refresh_failure().await?;
                Err(err)
            }
        }
    }

    /// Request one page of the ad-search query, resolving the document id
    /// from the session's token store (refreshed as needed) rather than
    /// requiring the caller to know it up front.
    pub async fn search_ads_page(&self, country: &str, ad_type: &str, variables: Value) -> AppResult<Value> {
        self.ensure_session_ready(country, ad_type).await?;
        let doc_id = self.session.tokens().await.ad_search_doc_id().to_string();
        let call = GraphQlCall {
            friendly_name: AD_SEARCH_FRIENDLY_NAME.to_string(),
            doc_id,
            variables,
        };
        self.execute(country, ad_type, &call).await
    }

    /// Execute one GraphQL call, handling refresh, retry, and proxy
    /// rotation per the outcome classification table.
    pub async fn execute(&self, country: &str, ad_type: &str, call: &GraphQlCall) -> AppResult<Value> {
        self.ensure_session_ready(country, ad_type).await?;

        let mut refreshed_once = false;
        let mut current_proxy = self.next_proxy().await?;

        for attempt in 0..self.settings.max_retries {
            let response = self.dispatch(call, current_proxy.as_deref()).await;

            match response {
                Ok(RawOutcome::Success(body)) => {
                    if let Some(ref proxy) = current_proxy {
                        if let Some(pool) = &self.proxy_pool {
                            pool.mark_success(proxy).await;
                        }
                    }
                    return parse_success(&body);
                }
                Ok(RawOutcome::Forbidden) => {
                    if refreshed_once {
                        tracing::warn!("GraphQL call still forbidden after session refresh");
                        return Err(AppError::authentication_failed(
                            "GraphQL call still forbidden after session refresh",
                        ));
                    }
                    tracing::info!(attempt, "GraphQL call forbidden, refreshing session before retry");
                    refreshed_once = true;
                    self.bootstrap_session(country, ad_type, true).await?;
                    continue;
                }
                Ok(RawOutcome::RateLimited { retry_after }) => {
                    tracing::warn!(attempt, retry_after_secs = retry_after.as_secs(), "rate limited");
                    self.emitter.emit(LifecycleEvent::new(
                        EventType::RateLimited,
                        serde_json::json!({ "retry_after_secs": retry_after.as_secs(), "attempt": attempt }),
                    ));
                    if attempt + 1 >= self.settings.max_retries {
                        return Err(AppError::rate_limited(retry_after));
                    }
                    sleep_backoff(self.settings.rate_limit_delay, attempt, self.settings.jitter).await;
                    continue;
                }
                Ok(RawOutcome::ServerError) => {
                    tracing::warn!(attempt, proxy = ?current_proxy, "server error, rotating proxy before retry");
                    if let Some(ref proxy) = current_proxy {
                        if let Some(pool) = &self.proxy_pool {
                            pool.mark_failure(proxy).await;
                        }
                    }
                    if attempt + 1 >= self.settings.max_retries {
                        return Err(AppError::network_error("server error after exhausting retries"));
                    }
                    sleep_backoff(self.settings.rate_limit_delay, attempt, self.settings.jitter).await;
                    current_proxy = self.next_proxy().await?;
                    continue;
                }
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "request dispatch failed, rotating proxy before retry");
                    if let Some(ref proxy) = current_proxy {
                        if let Some(pool) = &self.proxy_pool {
                            pool.mark_failure(proxy).await;
                        }
                    }
                    if attempt + 1 >= self.settings.max_retries {
                        return Err(err);
                    }
                    sleep_backoff(self.settings.rate_limit_delay, attempt, self.settings.jitter).await;
                    current_proxy = self.next_proxy().await?;
                    continue;
                }
            }
        }

        Err(AppError::network_error("exhausted retries"))
    }

    async fn next_proxy(&self) -> AppResult<Option<String>> {
        match &self.proxy_pool {
            Some(pool) => Ok(Some(pool.next().await?)),
            None => Ok(None),
        }
    }

    async fn dispatch(&self, call: &GraphQlCall, proxy: Option<&str>) -> AppResult<RawOutcome> {
        let client = self.client_for(proxy)?;
        let tokens = self.session.tokens().await;
        let req = self.session.next_req();

        let variables = serde_json::to_string(&call.variables)?;
        let mut form: Vec<(String, String)> = vec![
            ("doc_id".into(), call.doc_id.to_string()),
            ("variables".into(), variables),
            ("fb_dtsg".into(), tokens.get("fb_dtsg").to_string()),
            ("jazoest".into(), tokens.get("jazoest").to_string()),
            ("lsd".into(), tokens.get("lsd").to_string()),
            ("__req".into(), req),
            ("__rev".into(), tokens.get("__rev").to_string()),
            ("__spin_r".into(), tokens.get("__spin_r").to_string()),
            ("__spin_t".into(), tokens.get("__spin_t").to_string()),
            ("__hsi".into(), tokens.get("__hsi").to_string()),
            ("__dyn".into(), tokens.get("__dyn").to_string()),
            ("__csr".into(), tokens.get("__csr").to_string()),
            ("fb_api_caller_class".into(), FB_API_CALLER_CLASS.to_string()),
            ("fb_api_req_friendly_name".into(), call.friendly_name.to_string()),
            ("server_timestamps".into(), "true".to_string()),
        ];
        form.retain(|(k, _)| !k.is_empty());

        let url = format!("{}{GRAPHQL_PATH}", self.session.base_url());
        let result = client
            .post(&url)
            .header("x-fb-lsd", tokens.lsd())
            .header("x-fb-friendly-name", call.friendly_name.as_str())
            .header("sec-fetch-site", "same-origin")
            .form(&form)
            .send()
            .await;

        let response = match result {
            Ok(r) => r,
            Err(_) => return Ok(RawOutcome::ServerError),
        };

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            return Ok(RawOutcome::Forbidden);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(DEFAULT_RATE_LIMIT_RETRY_AFTER_SECS);
            return Ok(RawOutcome::RateLimited {
                retry_after: Duration::from_secs(retry_after),
            });
        }
        if status.is_server_error() {
            return Ok(RawOutcome::ServerError);
        }

        let body = response.text().await.unwrap_or_default();
        if body.to_lowercase().contains(RATE_LIMIT_BODY_MARKER) {
            return Ok(RawOutcome::RateLimited {
                retry_after: Duration::from_secs(DEFAULT_RATE_LIMIT_RETRY_AFTER_SECS),
            });
        }

        Ok(RawOutcome::Success(body))
    }

    fn client_for(&self, proxy: Option<&str>) -> AppResult<Client> {
        match proxy {
            None => Ok(self.session.client.clone()),
            Some(url) => {
                let proxy = reqwest::Proxy::all(url).map_err(|e| AppError::proxy_unusable(url, e.to_string()))?;
                Client::builder()
                    .proxy(proxy)
                    .timeout(self.settings.timeout)
                    .cookie_store(true)
                    .build()
                    .map_err(|e| AppError::network_error(e.to_string()))
            }
        }
    }
}

enum RawOutcome {
    Success(String),
    Forbidden,
    RateLimited { retry_after: Duration },
    ServerError,
}

fn parse_success(body: &str) -> AppResult<Value> {
    let parsed: Value =
        serde_json::from_str(body).map_err(|_| AppError::protocol_error("response was not valid JSON", body))?;

    if let Some(errors) = parsed.get("errors").and_then(Value::as_array) {
        let has_rate_limit_marker = errors.iter().any(|e| {
            e.get("message")
                .and_then(Value::as_str)
                .map(|m| m.to_lowercase().contains(RATE_LIMIT_BODY_MARKER))
                .unwrap_or(false)
        });
        if has_rate_limit_marker {
            return Err(AppError::rate_limited(Duration::from_secs(
                DEFAULT_RATE_LIMIT_RETRY_AFTER_SECS,
            )));
        }
    }

    if parsed.get("data").is_some() {
        return Ok(parsed);
    }

    Err(AppError::protocol_error("response lacked a data envelope", body))
}

async fn sleep_uniform(min_secs: f64, max_secs: f64) {
    let delay = min_secs + fastrand::f64() * (max_secs - min_secs);
    tokio::time::sleep(Duration::from_secs_f64(delay)).await;
}

async fn sleep_backoff(base_delay: f64, attempt: u32, jitter: f64) {
    let backoff = base_delay * 2f64.powi(attempt as i32);
    let jittered = backoff + fastrand::f64() * jitter;
    tokio::time::sleep(Duration::from_secs_f64(jittered)).await;
}

/// Delay between successive GraphQL requests within the collection
/// iterator: `rate_limit_delay + uniform(0, jitter)`.
pub async fn inter_request_delay(rate_limit_delay: f64, jitter: f64) {
    sleep_uniform(rate_limit_delay, rate_limit_delay + jitter).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_requires_data_envelope() {
        let body = r#"{"data": {"ad_library_search": {}}}"#;
        assert!(parse_success(body).is_ok());
    }

    #[test]
    fn missing_data_envelope_is_protocol_error() {
        let body = r#"{"foo": "bar"}"#;
        assert!(matches!(parse_success(body), Err(AppError::ProtocolError { .. })));
    }

    #[test]
    fn rate_limit_marker_in_errors_array_is_rate_limited() {
        let body = r#"{"errors": [{"message": "Please wait a moment before trying again"}]}"#;
        assert!(matches!(parse_success(body), Err(AppError::RateLimited { .. })));
    }

    #[test]
    fn invalid_json_is_protocol_error() {
        let body = "not json at all";
        assert!(matches!(parse_success(body), Err(AppError::ProtocolError { .. })));
    }
}

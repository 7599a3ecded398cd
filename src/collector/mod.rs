//! Collector: the public entry point. Wires session, pipeline, proxy
//! pool, dedup tracker, and event emitter together and exposes the
//! collection iterator.

mod iterator;
mod params;

pub use iterator::CollectionIterator;
pub use params::SearchParams;

use std::sync::Arc;

use reqwest::Client;

use crate::config::CollectorConfig;
use crate::dedup::{DedupTracker, InMemoryDedupTracker, SqliteDedupStore};
use crate::events::{EventEmitter, EventType, LifecycleEvent};
use crate::filter::FilterConfig;
use crate::fingerprint::{BuiltinFingerprintSource, FingerprintSource};
use crate::pipeline::{PipelineSettings, RequestPipeline};
use crate::proxy::ProxyPool;
use crate::session::Session;

/// The collector owns the session, the event emitter, and the request
/// pipeline; it borrows the proxy pool, dedup tracker, and filter
/// predicate supplied at construction (or built from config defaults).
pub struct Collector {
    pipeline: Arc<RequestPipeline>,
    emitter: Arc<EventEmitter>,
    dedup: Arc<dyn DedupTracker>,
    config: CollectorConfig,
}

impl Collector {
    /// Build a collector from configuration, using the built-in
    /// fingerprint source and the dedup backing implied by
    /// `config.dedup_store_path`.
    pub async fn new(config: CollectorConfig) -> crate::errors::AppResult<Self> {
        let fingerprint_source = BuiltinFingerprintSource::new();
        let bundle = fingerprint_source.next_bundle().await;

        let client = Client::builder()
            .cookie_store(true)
            .timeout(config.timeout_duration())
            .build()
            .map_err(|e| crate::errors::AppError::network_error(e.to_string()))?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| crate::constants::BASE_URL.to_string());
        let session = Arc::new(Session::new(client, base_url, bundle, config.max_refresh_attempts));
        let proxy_pool: Option<Arc<ProxyPool>> = config.proxy.clone().into_pool()?.map(Arc::new);
        let emitter = Arc::new(EventEmitter::new());

        let settings = PipelineSettings {
            rate_limit_delay: config.rate_limit_delay,
            jitter: config.jitter,
            timeout: config.timeout_duration(),
            max_retries: config.max_retries,
        };
        let pipeline = Arc::new(RequestPipeline::new(session, proxy_pool, settings, emitter.clone()));

        let dedup: Arc<dyn DedupTracker> = match &config.dedup_store_path {
            Some(path) => Arc::new(SqliteDedupStore::connect(path).await?),
            None => Arc::new(InMemoryDedupTracker::new()),
        };

        Ok(Self {
            pipeline,
            emitter,
            dedup,
            config,
        })
    }

    /// Build a collector from an already-constructed pipeline and dedup
    /// tracker, primarily for tests that need to substitute a mock
    /// transport or a shared proxy pool/dedup tracker.
    pub fn from_parts(
        pipeline: Arc<RequestPipeline>,
        emitter: Arc<EventEmitter>,
        dedup: Arc<dyn DedupTracker>,
        config: CollectorConfig,
    ) -> Self {
        Self {
            pipeline,
            emitter,
            dedup,
            config,
        }
    }

    /// Register a lifecycle listener. Exceptions raised inside it are
    /// caught and logged; they never propagate to the caller.
    pub fn on<F>(&self, event_type: EventType, listener: F)
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.emitter.on(event_type, listener);
    }

    /// Start a collection run. Validates `params` eagerly (before any
    /// network call) and returns a lazy iterator over normalized records.
    pub fn collect(
        &self,
        params: SearchParams,
        filter: FilterConfig,
        max_results: Option<usize>,
    ) -> crate::errors::AppResult<CollectionIterator> {
        params.validate()?;
        Ok(CollectionIterator::new(
            self.pipeline.clone(),
            self.emitter.clone(),
            self.dedup.clone(),
            params,
            filter,
            self.config.page_size,
            self.config.rate_limit_delay,
            self.config.jitter,
            max_results,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn collector_rejects_invalid_params_before_any_network_call() {
        let config = CollectorConfig::default();
        let collector = Collector::new(config).await.unwrap();
        let params = SearchParams {
            country: "US".into(),
            query: "shoes".into(),
            ad_type: "not_a_real_type".into(),
            ad_status: "active".into(),
            search_type: "keyword_unordered".into(),
            page_id: None,
        };
        assert!(collector.collect(params, FilterConfig::new(), None).is_err());
    }
}

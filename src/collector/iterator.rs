//! Collection iterator: cursor-driven pagination with dedup, filtering,
//! and lifecycle events layered on top of the request pipeline.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use futures::Stream;
use serde_json::Value;

use crate::dedup::DedupTracker;
use crate::errors::{AppError, AppResult};
use crate::events::{EventEmitter, EventType, LifecycleEvent};
use crate::filter::{self, FilterConfig};
use crate::models::AdRecord;
use crate::normalize::normalize_ad;
use crate::pipeline::{inter_request_delay, RequestPipeline};

use super::SearchParams;

struct Page {
    records: Vec<Value>,
    end_cursor: Option<String>,
    has_next: bool,
}

/// Scan the `data` envelope for the search-results connection, tolerating
/// both naming dialects the rest of the normalizer already expects.
fn extract_page(data: &Value) -> AppResult<Page> {
    let connection = ["ad_library_main", "adLibraryMain"]
        .iter()
        .find_map(|k| data.get("data").and_then(|d| d.get(k)))
        .and_then(|main| {
            ["search_results_connection", "searchResultsConnection"]
                .iter()
                .find_map(|k| main.get(k))
        })
        .ok_or_else(|| AppError::protocol_error("response lacked a search-results connection", data.to_string()))?;

    let edges = connection
        .get("edges")
        .and_then(Value::as_array)
        .ok_or_else(|| AppError::protocol_error("search-results connection had no edges array", data.to_string()))?;

    let records = edges
        .iter()
        .filter_map(|edge| edge.get("node"))
        .cloned()
        .collect();

    let page_info = connection.get("page_info").or_else(|| connection.get("pageInfo"));
    let end_cursor = page_info
        .and_then(|p| p.get("end_cursor").or_else(|| p.get("endCursor")))
        .and_then(Value::as_str)
        .map(str::to_string);
    let has_next = page_info
        .and_then(|p| p.get("has_next_page").or_else(|| p.get("hasNextPage")))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    Ok(Page {
        records,
        end_cursor,
        has_next,
    })
}

/// Lazily-driven sequence of normalized, deduplicated, filtered ad
/// records. Resumable at page boundaries: dropping the iterator simply
/// stops consumption, with every record already yielded final.
pub struct CollectionIterator {
    pipeline: Arc<RequestPipeline>,
    emitter: Arc<EventEmitter>,
    dedup: Arc<dyn DedupTracker>,
    params: SearchParams,
    filter: FilterConfig,
    page_size: u32,
    rate_limit_delay: f64,
    jitter: f64,
    max_results: Option<usize>,

    cursor: Option<String>,
    pending: VecDeque<AdRecord>,
    page_index: usize,
    yielded: usize,
    no_more_pages: bool,
    started_at: Option<Instant>,
    finished: bool,
}

impl CollectionIterator {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        pipeline: Arc<RequestPipeline>,
        emitter: Arc<EventEmitter>,
        dedup: Arc<dyn DedupTracker>,
        params: SearchParams,
        filter: FilterConfig,
        page_size: u32,
        rate_limit_delay: f64,
        jitter: f64,
        max_results: Option<usize>,
    ) -> Self {
        Self {
            pipeline,
            emitter,
            dedup,
            params,
            filter,
            page_size,
            rate_limit_delay,
            jitter,
            max_results,
            cursor: None,
            pending: VecDeque::new(),
            page_index: 0,
            yielded: 0,
            no_more_pages: false,
            started_at: None,
            finished: false,
        }
    }

    /// Advance the iterator by exactly one record, or `None` once
    /// collection is finished. Drives pagination internally as needed.
    pub async fn next(&mut self) -> AppResult<Option<AdRecord>> {
        if self.finished {
            return Ok(None);
        }

        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
            self.emitter.emit(LifecycleEvent::new(
                EventType::CollectionStarted,
                serde_json::json!({
                    "country": self.params.country,
                    "query": self.params.query,
                    "ad_type": self.params.ad_type,
                }),
            ));
        }

        loop {
            while let Some(record) = self.pending.pop_front() {
                if self.dedup.has_seen(&record.id).await? {
                    continue;
                }
                self.dedup.mark_seen(&record.id).await?;
                if !filter::passes(&record, &self.filter) {
                    continue;
                }

                self.yielded += 1;
                self.emitter.emit(LifecycleEvent::new(
                    EventType::AdCollected,
                    serde_json::json!({ "id": record.id }),
                ));

                if self.max_results == Some(self.yielded) {
                    self.finish().await;
                }
                return Ok(Some(record));
            }

            if self.no_more_pages {
                self.finish().await;
                return Ok(None);
            }

            if self.page_index > 0 {
                inter_request_delay(self.rate_limit_delay, self.jitter).await;
            }

            let variables = self.params.to_variables(self.cursor.as_deref(), self.page_size);
            let fetch_result = self
                .pipeline
                .search_ads_page(&self.params.country, &self.params.ad_type, variables)
                .await;

            let data = match fetch_result {
                Ok(data) => data,
                Err(err) => {
                    self.emitter.emit(LifecycleEvent::new(
                        EventType::ErrorOccurred,
                        serde_json::json!({ "message": err.to_string() }),
                    ));
                    if err.is_exhausted_rate_limit() {
                        self.finish().await;
                        return Ok(None);
                    }
                    return Err(err);
                }
            };

            let page = extract_page(&data)?;
            self.page_index += 1;
            self.emitter.emit(LifecycleEvent::new(
                EventType::PageFetched,
                serde_json::json!({
                    "page_index": self.page_index,
                    "count": page.records.len(),
                    "has_next": page.has_next,
                }),
            ));

            self.cursor = page.end_cursor;
            self.no_more_pages = !page.has_next;
            self.pending = page.records.iter().filter_map(normalize_ad).collect();

            if self.pending.is_empty() && self.no_more_pages {
                self.finish().await;
                return Ok(None);
            }
        }
    }

    async fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let duration_secs = self.started_at.map(|t| t.elapsed().as_secs_f64()).unwrap_or(0.0);
        self.emitter.emit(LifecycleEvent::new(
            EventType::CollectionFinished,
            serde_json::json!({
                "total": self.yielded,
                "pages": self.page_index,
                "duration_secs": duration_secs,
            }),
        ));
        if self.dedup.update_collection_time().await.is_ok() {
            let _ = self.dedup.save().await;
        }
    }

    /// Adapt this iterator into a [`futures::Stream`], so it composes with
    /// the rest of the `futures` ecosystem the pipeline already depends on.
    pub fn into_stream(self) -> impl Stream<Item = AppResult<AdRecord>> {
        futures::stream::unfold((self, false), |(mut iter, done)| async move {
            if done {
                return None;
            }
            match iter.next().await {
                Ok(Some(record)) => Some((Ok(record), (iter, false))),
                Ok(None) => None,
                Err(err) => Some((Err(err), (iter, true))),
            }
        })
    }
}

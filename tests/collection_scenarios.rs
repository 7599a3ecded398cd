//! End-to-end scenarios driving a real [`Collector`] against a mock ad
//! library endpoint: pagination, session refresh, cross-run dedup,
//! missing-data filtering, and rate-limit termination.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ad_library_collector::{CollectorConfig, EventType};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Returns `steps[call_index]`, clamped to the last entry once exhausted.
/// Lets a single mounted mock stand in for "page 1, then page 2" or
/// "forbidden once, then succeeds" without juggling overlapping matchers.
struct Sequence {
    steps: Vec<ResponseTemplate>,
    calls: AtomicUsize,
}

impl Sequence {
    fn new(steps: Vec<ResponseTemplate>) -> Self {
        Self {
            steps,
            calls: AtomicUsize::new(0),
        }
    }
}

impl Respond for Sequence {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let idx = self.calls.fetch_add(1, Ordering::SeqCst);
        self.steps[idx.min(self.steps.len() - 1)].clone()
    }
}

const LANDING_BODY: &str = r#"<script>["LSD",[],{"token":"test-lsd-token"}]</script>"#;

async fn mount_landing(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/ads/library/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LANDING_BODY))
        .mount(server)
        .await;
}

fn ad_node(id: &str, impressions_upper: Option<i64>) -> Value {
    let mut node = json!({ "ad_archive_id": id, "page_id": "p1", "is_active": true });
    if let Some(upper) = impressions_upper {
        node["impressions"] = json!({ "lower_bound": 100, "upper_bound": upper });
    }
    node
}

fn page_response(nodes: Vec<Value>, end_cursor: Option<&str>, has_next: bool) -> Value {
    json!({
        "data": {
            "ad_library_main": {
                "search_results_connection": {
                    "edges": nodes.into_iter().map(|n| json!({ "node": n })).collect::<Vec<_>>(),
                    "page_info": { "end_cursor": end_cursor, "has_next_page": has_next },
                }
            }
        }
    })
}

fn test_config(base_url: String) -> CollectorConfig {
    CollectorConfig {
        rate_limit_delay: 0.01,
        jitter: 0.0,
        timeout: 5,
        base_url: Some(base_url),
        ..CollectorConfig::default()
    }
}

fn default_params() -> ad_library_collector::SearchParams {
    ad_library_collector::SearchParams {
        country: "US".into(),
        query: "shoes".into(),
        ad_type: "all".into(),
        ad_status: "active".into(),
        search_type: "keyword_unordered".into(),
        page_id: None,
    }
}

type RecordedEvents = Arc<Mutex<Vec<(EventType, Value)>>>;

fn record_all_events(collector: &ad_library_collector::Collector) -> RecordedEvents {
    let events: RecordedEvents = Arc::new(Mutex::new(Vec::new()));
    for event_type in [
        EventType::CollectionStarted,
        EventType::AdCollected,
        EventType::PageFetched,
        EventType::ErrorOccurred,
        EventType::RateLimited,
        EventType::SessionRefreshed,
        EventType::CollectionFinished,
    ] {
        let sink = events.clone();
        collector.on(event_type, move |event| {
            sink.lock().unwrap().push((event.event_type, event.payload.clone()));
        });
    }
    events
}

#[tokio::test]
async fn happy_path_paginates_and_emits_the_expected_event_sequence() {
    let server = MockServer::start().await;
    mount_landing(&server).await;

    let page1 = page_response(
        vec![ad_node("A1", None), ad_node("A2", None), ad_node("A3", None)],
        Some("cursor-1"),
        true,
    );
    let page2 = page_response(vec![ad_node("A4", None)], None, false);

    Mock::given(method("POST"))
        .and(path("/api/graphql/"))
        .respond_with(Sequence::new(vec![
            ResponseTemplate::new(200).set_body_json(page1),
            ResponseTemplate::new(200).set_body_json(page2),
        ]))
        .mount(&server)
        .await;

    let collector = ad_library_collector::Collector::new(test_config(server.uri())).await.unwrap();
    let events = record_all_events(&collector);

    let mut iter = collector
        .collect(default_params(), ad_library_collector::FilterConfig::new(), None)
        .unwrap();

    let mut ids = Vec::new();
    while let Some(record) = iter.next().await.unwrap() {
        ids.push(record.id);
    }

    assert_eq!(ids, vec!["A1", "A2", "A3", "A4"]);

    let recorded = events.lock().unwrap();
    let kinds: Vec<EventType> = recorded.iter().map(|(t, _)| *t).collect();
    assert_eq!(
        kinds,
        vec![
            EventType::CollectionStarted,
            EventType::PageFetched,
            EventType::AdCollected,
            EventType::AdCollected,
            EventType::AdCollected,
            EventType::PageFetched,
            EventType::AdCollected,
            EventType::CollectionFinished,
        ]
    );

    let finished = recorded.last().unwrap();
    assert_eq!(finished.1["total"], 4);
    assert_eq!(finished.1["pages"], 2);
}

#[tokio::test]
async fn forbidden_response_triggers_a_recovery_refresh_and_then_succeeds() {
    let server = MockServer::start().await;
    mount_landing(&server).await;

    let success = page_response(vec![ad_node("A1", None)], None, false);
    Mock::given(method("POST"))
        .and(path("/api/graphql/"))
        .respond_with(Sequence::new(vec![
            ResponseTemplate::new(403),
            ResponseTemplate::new(200).set_body_json(success),
        ]))
        .mount(&server)
        .await;

    let collector = ad_library_collector::Collector::new(test_config(server.uri())).await.unwrap();
    let events = record_all_events(&collector);

    let mut iter = collector
        .collect(default_params(), ad_library_collector::FilterConfig::new(), None)
        .unwrap();

    let record = iter.next().await.unwrap().unwrap();
    assert_eq!(record.id, "A1");
    assert!(iter.next().await.unwrap().is_none());

    // The collector's initial bootstrap doesn't count as a refresh; only the
    // 403-triggered recovery before the retried call does.
    let recorded = events.lock().unwrap();
    let refreshes = recorded.iter().filter(|(t, _)| *t == EventType::SessionRefreshed).count();
    assert_eq!(refreshes, 1);
}

#[tokio::test]
async fn dedup_tracker_persists_across_collector_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("dedup.sqlite");

    let server_a = MockServer::start().await;
    mount_landing(&server_a).await;
    let first_run = page_response(vec![ad_node("A1", None), ad_node("A2", None)], None, false);
    Mock::given(method("POST"))
        .and(path("/api/graphql/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(first_run))
        .mount(&server_a)
        .await;

    let mut config_a = test_config(server_a.uri());
    config_a.dedup_store_path = Some(db_path.clone());
    let collector_a = ad_library_collector::Collector::new(config_a).await.unwrap();
    let mut iter_a = collector_a
        .collect(default_params(), ad_library_collector::FilterConfig::new(), None)
        .unwrap();
    let mut run_a_ids = Vec::new();
    while let Some(record) = iter_a.next().await.unwrap() {
        run_a_ids.push(record.id);
    }
    assert_eq!(run_a_ids, vec!["A1", "A2"]);

    let server_b = MockServer::start().await;
    mount_landing(&server_b).await;
    let second_run = page_response(vec![ad_node("A2", None), ad_node("A3", None)], None, false);
    Mock::given(method("POST"))
        .and(path("/api/graphql/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(second_run))
        .mount(&server_b)
        .await;

    let mut config_b = test_config(server_b.uri());
    config_b.dedup_store_path = Some(db_path);
    let collector_b = ad_library_collector::Collector::new(config_b).await.unwrap();
    let mut iter_b = collector_b
        .collect(default_params(), ad_library_collector::FilterConfig::new(), None)
        .unwrap();
    let mut run_b_ids = Vec::new();
    while let Some(record) = iter_b.next().await.unwrap() {
        run_b_ids.push(record.id);
    }

    assert_eq!(run_b_ids, vec!["A3"]);
}

#[tokio::test]
async fn filter_with_missing_data_yields_the_record_that_never_declared_impressions() {
    let server = MockServer::start().await;
    mount_landing(&server).await;

    let page = page_response(
        vec![ad_node("below-threshold", Some(500)), ad_node("no-data", None)],
        None,
        false,
    );
    Mock::given(method("POST"))
        .and(path("/api/graphql/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page))
        .mount(&server)
        .await;

    let collector = ad_library_collector::Collector::new(test_config(server.uri())).await.unwrap();
    let mut filter = ad_library_collector::FilterConfig::new();
    filter.min_impressions = Some(1000);

    let mut iter = collector.collect(default_params(), filter, None).unwrap();
    let mut ids = Vec::new();
    while let Some(record) = iter.next().await.unwrap() {
        ids.push(record.id);
    }

    assert_eq!(ids, vec!["no-data"]);
}

#[tokio::test]
async fn rate_limit_exhausting_retries_terminates_the_collection_cleanly() {
    let server = MockServer::start().await;
    mount_landing(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/graphql/"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "5"))
        .mount(&server)
        .await;

    let mut config = test_config(server.uri());
    config.max_retries = 2;
    let collector = ad_library_collector::Collector::new(config).await.unwrap();
    let events = record_all_events(&collector);

    let mut iter = collector
        .collect(default_params(), ad_library_collector::FilterConfig::new(), None)
        .unwrap();

    assert!(iter.next().await.unwrap().is_none());

    let recorded = events.lock().unwrap();
    let rate_limited_count = recorded.iter().filter(|(t, _)| *t == EventType::RateLimited).count();
    assert_eq!(rate_limited_count, 2);

    let finished = recorded
        .iter()
        .find(|(t, _)| *t == EventType::CollectionFinished)
        .expect("collection_finished was never emitted");
    assert_eq!(finished.1["total"], 0);
}

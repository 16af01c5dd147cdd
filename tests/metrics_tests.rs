mod common;

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{counter, error_codes, status_response, MockTransport, Reply, URL};
use unleash_proxy_client::{
    Clock, DefaultCustomHeadersProvider, ErrorCode, EventBus, EventKind, Method, MetricsConfig,
    MetricsReporter,
};

/// Clock that advances one minute per reading, starting at 2022-12-24T23:00:00Z.
fn stepping_clock() -> Clock {
    let base: DateTime<Utc> = Utc.with_ymd_and_hms(2022, 12, 24, 23, 0, 0).unwrap();
    let step = Arc::new(AtomicI64::new(0));
    Arc::new(move || base + ChronoDuration::minutes(step.fetch_add(1, Ordering::SeqCst)))
}

fn reporter(transport: &Arc<MockTransport>, config: MetricsConfig) -> (MetricsReporter, Arc<EventBus>) {
    let events = Arc::new(EventBus::new());
    let reporter = MetricsReporter::with_components(
        config,
        transport.clone(),
        Arc::clone(&events),
        Arc::new(DefaultCustomHeadersProvider),
        stepping_clock(),
    );
    (reporter, events)
}

fn default_config() -> MetricsConfig {
    MetricsConfig::builder(URL, "SECRET").app_name("test-app").build()
}

fn sent_body(transport: &MockTransport) -> serde_json::Value {
    let requests = transport.requests();
    let body = requests[0].body.as_ref().expect("metrics request has a body");
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn test_counts_and_variants_are_posted() {
    let transport = MockTransport::with_replies(vec![status_response(202, None)]);
    let (reporter, events) = reporter(&transport, default_config());
    let sent = counter(&events, EventKind::Sent);

    reporter.count("t", true);
    reporter.count("t", true);
    reporter.count("t", false);
    reporter.count_variant("t", "A");
    reporter.count_variant("t", "A");
    reporter.count_variant("t", "B");

    reporter.send_metrics().await;

    let body = sent_body(&transport);
    assert_eq!(body["appName"], "test-app");
    assert_eq!(body["instanceId"], "rust");
    assert_eq!(body["bucket"]["start"], "2022-12-24T23:00:00Z");
    assert_eq!(body["bucket"]["stop"], "2022-12-24T23:01:00Z");
    assert_eq!(
        body["bucket"]["toggles"],
        serde_json::json!({"t": {"yes": 2, "no": 1, "variants": {"A": 2, "B": 1}}})
    );
    assert_eq!(sent.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_counts_without_variants_serialize_empty_map() {
    let transport = MockTransport::with_replies(vec![status_response(200, None)]);
    let (reporter, _events) = reporter(&transport, default_config());

    reporter.count("t", true);
    reporter.count("t", true);
    reporter.count("t", false);
    reporter.send_metrics().await;

    assert_eq!(
        sent_body(&transport)["bucket"]["toggles"],
        serde_json::json!({"t": {"yes": 2, "no": 1, "variants": {}}})
    );
}

#[tokio::test]
async fn test_request_shape() {
    let transport = MockTransport::with_replies(vec![status_response(200, None)]);
    let config = MetricsConfig::builder(URL, "SECRET")
        .app_name("test-app")
        .custom_header("X-Team", "mobile")
        .build();
    let connection_id = config.connection_id.to_string();
    let (reporter, _events) = reporter(&transport, config);

    reporter.count("t", true);
    reporter.send_metrics().await;

    let requests = transport.requests();
    let request = &requests[0];
    assert_eq!(request.method, Method::Post);
    assert_eq!(request.url, format!("{}/client/metrics", URL));
    assert_eq!(request.header_value("Accept"), Some("application/json"));
    assert_eq!(request.header_value("Cache"), Some("no-cache"));
    assert_eq!(request.header_value("Content-Type"), Some("application/json"));
    assert_eq!(request.header_value("Authorization"), Some("SECRET"));
    assert_eq!(request.header_value("unleash-appname"), Some("test-app"));
    assert_eq!(
        request.header_value("unleash-connection-id"),
        Some(connection_id.as_str())
    );
    assert!(request
        .header_value("unleash-sdk")
        .unwrap()
        .starts_with("unleash-client-rust:"));
    assert_eq!(request.header_value("X-Team"), Some("mobile"));
}

#[tokio::test]
async fn test_base_url_query_not_carried_to_metrics() {
    let transport = MockTransport::with_replies(vec![status_response(200, None)]);
    let config = MetricsConfig::builder(format!("{}?environment=dev", URL), "SECRET").build();
    let (reporter, events) = reporter(&transport, config);
    let sent = counter(&events, EventKind::Sent);

    reporter.count("t", true);
    reporter.send_metrics().await;

    assert_eq!(transport.requests()[0].url, format!("{}/client/metrics", URL));
    assert_eq!(sent.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_empty_bucket_is_not_sent() {
    let transport = MockTransport::new();
    let (reporter, events) = reporter(&transport, default_config());
    let sent = counter(&events, EventKind::Sent);
    let errors = counter(&events, EventKind::Error);
    let start = reporter.bucket_snapshot().start;

    reporter.send_metrics().await;

    assert_eq!(transport.request_count(), 0);
    assert_eq!(sent.load(Ordering::SeqCst), 0);
    assert_eq!(errors.load(Ordering::SeqCst), 0);
    // The open bucket keeps its window.
    assert_eq!(reporter.bucket_snapshot().start, start);
}

#[tokio::test]
async fn test_bucket_is_swapped_after_send() {
    let transport = MockTransport::with_replies(vec![status_response(200, None)]);
    let (reporter, _events) = reporter(&transport, default_config());

    reporter.count("t", true);
    reporter.send_metrics().await;

    let bucket = reporter.bucket_snapshot();
    assert!(bucket.is_empty());
    assert_eq!(bucket.start.to_rfc3339(), "2022-12-24T23:01:00+00:00");
}

#[tokio::test]
async fn test_disabled_reporter_is_inert() {
    let transport = MockTransport::new();
    let config = MetricsConfig::builder(URL, "SECRET")
        .disabled(true)
        .metrics_interval(Duration::from_millis(20))
        .build();
    let (reporter, events) = reporter(&transport, config);
    let sent = counter(&events, EventKind::Sent);

    for _ in 0..10 {
        reporter.count("t", true);
        reporter.count_variant("t", "A");
    }
    reporter.start();
    assert!(!reporter.is_running());

    reporter.send_metrics().await;
    tokio::time::sleep(Duration::from_millis(60)).await;
    reporter.stop();

    assert!(reporter.bucket_snapshot().is_empty());
    assert_eq!(transport.request_count(), 0);
    assert_eq!(sent.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_transport_failure_emits_error_and_drops_bucket() {
    let transport = MockTransport::with_replies(vec![Reply::NoResponse]);
    let (reporter, events) = reporter(&transport, default_config());
    let codes = error_codes(&events);
    let sent = counter(&events, EventKind::Sent);

    reporter.count("t", true);
    reporter.send_metrics().await;

    assert_eq!(*codes.lock(), vec![ErrorCode::NoResponse]);
    assert_eq!(sent.load(Ordering::SeqCst), 0);
    assert!(reporter.bucket_snapshot().is_empty());
}

#[tokio::test]
async fn test_error_status_emits_error() {
    let transport = MockTransport::with_replies(vec![status_response(500, None)]);
    let (reporter, events) = reporter(&transport, default_config());
    let codes = error_codes(&events);

    reporter.count("t", false);
    reporter.send_metrics().await;

    assert_eq!(*codes.lock(), vec![ErrorCode::MetricsSendFailed]);
}

#[tokio::test]
async fn test_timer_flushes_periodically() {
    let transport = MockTransport::new();
    let config = MetricsConfig::builder(URL, "SECRET")
        .metrics_interval(Duration::from_millis(50))
        .build();
    let (reporter, events) = reporter(&transport, config);
    let sent = counter(&events, EventKind::Sent);

    reporter.start();
    assert!(reporter.is_running());

    reporter.count("t", true);
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(transport.request_count(), 1);

    // Nothing counted since the last flush.
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(transport.request_count(), 1);

    reporter.stop();
    assert!(!reporter.is_running());
    reporter.count("t", true);
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert_eq!(transport.request_count(), 1);
    assert_eq!(sent.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrent_counting() {
    let transport = MockTransport::with_replies(vec![status_response(200, None)]);
    let (reporter, _events) = reporter(&transport, default_config());
    let reporter = Arc::new(reporter);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let reporter = Arc::clone(&reporter);
            std::thread::spawn(move || {
                for _ in 0..100 {
                    reporter.count("t", i % 2 == 0);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let bucket = reporter.bucket_snapshot();
    let metrics = &bucket.toggles["t"];
    assert_eq!(metrics.yes, 400);
    assert_eq!(metrics.no, 400);
}

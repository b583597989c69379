// tests/metrics.rs
//
// MetricsSink against a local debugging recorder, and the /metrics route.

use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use shuttle_axum::axum::{
    body::{self, Body},
    http::{Request, StatusCode},
};
use tower::ServiceExt;

use article_pipeline::metrics::Metrics;
use article_pipeline::telemetry::{Event, EventSink, MetricsSink};

fn counter_total(snapshot: &[(String, Vec<(String, String)>, DebugValue)], name: &str) -> u64 {
    snapshot
        .iter()
        .filter(|(n, _, _)| n == name)
        .map(|(_, _, v)| match v {
            DebugValue::Counter(c) => *c,
            _ => 0,
        })
        .sum()
}

fn capture(events: &[Event]) -> Vec<(String, Vec<(String, String)>, DebugValue)> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    metrics::with_local_recorder(&recorder, || {
        let sink = MetricsSink::new();
        for e in events {
            sink.emit(e);
        }
    });
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(key, _unit, _desc, value)| {
            let k = key.key();
            let labels = k
                .labels()
                .map(|l| (l.key().to_string(), l.value().to_string()))
                .collect();
            (k.name().to_string(), labels, value)
        })
        .collect()
}

#[test]
fn events_become_labelled_counters() {
    let snap = capture(&[
        Event::new("fetch_started").with("source", "Wired"),
        Event::new("fetch_started").with("source", "TechCrunch"),
        Event::new("source_completed").with("source", "Wired"),
    ]);
    assert_eq!(counter_total(&snap, "pipeline_events_total"), 3);
    let started = snap
        .iter()
        .find(|(n, labels, _)| {
            n == "pipeline_events_total" && labels.contains(&("event".into(), "fetch_started".into()))
        })
        .expect("fetch_started series");
    assert!(matches!(started.2, DebugValue::Counter(2)));
}

#[test]
fn fetch_durations_and_credits_are_recorded() {
    let snap = capture(&[
        Event::new("fetch_succeeded").with("duration_ms", 120u64),
        Event::new("fetch_failed").with("duration_ms", 3000u64),
        Event::new("credits_consumed").with("credits", 0.5),
        Event::new("credits_consumed").with("credits", 10.0),
    ]);
    let histograms: Vec<_> = snap
        .iter()
        .filter(|(n, _, _)| n == "fetch_duration_ms")
        .collect();
    assert_eq!(histograms.len(), 2, "one series per outcome");
    // centi-credits
    assert_eq!(counter_total(&snap, "credits_consumed_total"), 1050);
}

#[tokio::test]
async fn metrics_route_serves_exposition_text() {
    let app = Metrics::detached().router();
    let resp = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).expect("request"))
        .await
        .expect("oneshot /metrics");
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), 1024 * 1024).await.expect("body");
    assert!(String::from_utf8(bytes.to_vec()).is_ok());
}

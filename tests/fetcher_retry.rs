// tests/fetcher_retry.rs
//
// Retry policy on a paused clock: politeness delay before every attempt,
// linear backoff between attempts, permanent statuses fail immediately.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use article_pipeline::ingest::fetcher::{FetchError, FetchSettings, PageResponse, SourceFetcher, TransportError};
use article_pipeline::ingest::types::SourceDescriptor;
use article_pipeline::telemetry::MemorySink;

use common::ScriptedClient;

const URL: &str = "https://feeds.example.com/rss";

fn source() -> SourceDescriptor {
    SourceDescriptor::feed("Example", URL)
}

fn fetcher(client: Arc<ScriptedClient>, sink: Arc<MemorySink>) -> SourceFetcher {
    SourceFetcher::new(client, FetchSettings::default(), sink)
}

#[tokio::test(start_paused = true)]
async fn transient_statuses_are_retried_with_linear_backoff() {
    let client = ScriptedClient::new()
        .script(
            URL,
            vec![
                Ok(PageResponse::status(503)),
                Ok(PageResponse::status(429)),
                Ok(PageResponse::ok("<rss/>")),
            ],
        )
        .shared();
    let sink = Arc::new(MemorySink::new());
    let f = fetcher(client.clone(), sink.clone());

    let started = Instant::now();
    let body = f.fetch(&source()).await.expect("third attempt succeeds");
    assert_eq!(body, "<rss/>");
    assert_eq!(client.calls_to(URL), 3);

    // 3 × 1.5s politeness + 2s + 4s backoff
    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_millis(10_500) && elapsed < Duration::from_millis(10_600),
        "{elapsed:?}"
    );
    assert_eq!(sink.count("fetch_retry"), 2);
    assert_eq!(sink.count("fetch_succeeded"), 1);
    assert_eq!(
        sink.last("fetch_succeeded").and_then(|e| e.get("attempts").cloned()),
        Some(serde_json::json!(3))
    );
}

#[tokio::test(start_paused = true)]
async fn permanent_status_fails_without_retry() {
    let client = ScriptedClient::new().status(URL, 404).shared();
    let sink = Arc::new(MemorySink::new());
    let err = fetcher(client.clone(), sink.clone())
        .fetch(&source())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        FetchError::Permanent {
            source_name: "Example".into(),
            status: 404
        }
    );
    assert_eq!(client.calls_to(URL), 1);
    assert_eq!(sink.count("fetch_retry"), 0);
    assert_eq!(sink.count("fetch_failed"), 1);
}

#[tokio::test(start_paused = true)]
async fn exhausted_transport_errors_are_transient() {
    let client = ScriptedClient::new()
        .script(URL, vec![Err(TransportError::Timeout)])
        .shared();
    let sink = Arc::new(MemorySink::new());
    let err = fetcher(client.clone(), sink.clone())
        .fetch(&source())
        .await
        .unwrap_err();

    match &err {
        FetchError::Transient { attempts, cause, .. } => {
            assert_eq!(*attempts, 3);
            assert!(cause.contains("timed out"), "{cause}");
        }
        other => panic!("expected transient, got {other:?}"),
    }
    assert!(err.is_transient());
    assert_eq!(client.calls_to(URL), 3);
    let failed = sink.last("fetch_failed").expect("failure event");
    assert_eq!(failed.get("transient"), Some(&serde_json::json!(true)));
}

#[tokio::test(start_paused = true)]
async fn single_attempt_setting_never_backs_off() {
    let client = ScriptedClient::new().status(URL, 500).shared();
    let sink = Arc::new(MemorySink::new());
    let f = SourceFetcher::new(
        client.clone(),
        FetchSettings {
            max_attempts: 1,
            ..FetchSettings::default()
        },
        sink.clone(),
    );
    let started = Instant::now();
    assert!(f.fetch(&source()).await.is_err());
    assert_eq!(client.calls_to(URL), 1);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(1_500) && elapsed < Duration::from_millis(1_600));
}

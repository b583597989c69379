// src/ingest/fetcher.rs
//! One network retrieval per source, with a politeness delay before every
//! request and linear backoff on transient failures.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::ingest::types::SourceDescriptor;
use crate::telemetry::{Event, SharedSink};

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Raw HTTP outcome; status interpretation belongs to the fetcher.
#[derive(Debug, Clone)]
pub struct PageResponse {
    pub status: u16,
    pub body: String,
}

impl PageResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
        }
    }
}

/// Transport-level failure: the request never produced a status.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("transport error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

#[async_trait]
pub trait PageClient: Send + Sync {
    async fn get(&self, url: &str) -> Result<PageResponse, TransportError>;
}

/// Production transport on `reqwest` (gzip, redirects, browser-like headers).
pub struct HttpPageClient {
    client: reqwest::Client,
}

impl HttpPageClient {
    pub fn new(settings: &FetchSettings) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/rss+xml,application/atom+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .default_headers(headers)
            .timeout(settings.timeout)
            .gzip(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("building http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageClient for HttpPageClient {
    async fn get(&self, url: &str) -> Result<PageResponse, TransportError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        Ok(PageResponse { status, body })
    }
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub user_agent: String,
    pub timeout: Duration,
    /// Slept before every request attempt.
    pub request_delay: Duration,
    /// Backoff before attempt `n + 1` is `retry_base_delay × n`.
    pub retry_base_delay: Duration,
    /// Total attempts, including the first.
    pub max_attempts: u32,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
            request_delay: Duration::from_millis(1500),
            retry_base_delay: Duration::from_secs(2),
            max_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("{source_name}: gave up after {attempts} attempt(s): {cause}")]
    Transient {
        source_name: String,
        attempts: u32,
        cause: String,
    },
    #[error("{source_name}: HTTP {status}")]
    Permanent { source_name: String, status: u16 },
}

impl FetchError {
    pub fn source_name(&self) -> &str {
        match self {
            FetchError::Transient { source_name, .. } | FetchError::Permanent { source_name, .. } => {
                source_name
            }
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }
}

/// 429 and every 5xx are worth another attempt.
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

pub struct SourceFetcher {
    client: Arc<dyn PageClient>,
    settings: FetchSettings,
    events: SharedSink,
}

impl SourceFetcher {
    pub fn new(client: Arc<dyn PageClient>, settings: FetchSettings, events: SharedSink) -> Self {
        Self {
            client,
            settings,
            events,
        }
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    pub async fn fetch(&self, source: &SourceDescriptor) -> Result<String, FetchError> {
        self.fetch_url(&source.name, &source.endpoint).await
    }

    /// Fetch an arbitrary URL on behalf of `source_name` (article pages use this too).
    pub async fn fetch_url(&self, source_name: &str, url: &str) -> Result<String, FetchError> {
        let started = Instant::now();
        self.events.emit(
            &Event::new("fetch_started")
                .with("source", source_name)
                .with("url", url),
        );

        let max_attempts = self.settings.max_attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            if !self.settings.request_delay.is_zero() {
                sleep(self.settings.request_delay).await;
            }

            let cause = match self.client.get(url).await {
                Ok(resp) if (200..300).contains(&resp.status) => {
                    let ms = started.elapsed().as_millis() as u64;
                    debug!(target: "ingest", source = %source_name, attempt, bytes = resp.body.len(), "fetched");
                    self.events.emit(
                        &Event::new("fetch_succeeded")
                            .with("source", source_name)
                            .with("duration_ms", ms)
                            .with("bytes", resp.body.len())
                            .with("attempts", attempt),
                    );
                    return Ok(resp.body);
                }
                Ok(resp) if is_retryable_status(resp.status) => format!("HTTP {}", resp.status),
                Ok(resp) => {
                    let err = FetchError::Permanent {
                        source_name: source_name.to_string(),
                        status: resp.status,
                    };
                    self.emit_failed(source_name, started, &err);
                    return Err(err);
                }
                Err(e) => e.to_string(),
            };

            if attempt >= max_attempts {
                let err = FetchError::Transient {
                    source_name: source_name.to_string(),
                    attempts: attempt,
                    cause,
                };
                self.emit_failed(source_name, started, &err);
                return Err(err);
            }

            let delay = self.settings.retry_base_delay * attempt;
            warn!(
                target: "ingest",
                source = %source_name, attempt, delay_ms = delay.as_millis() as u64, %cause,
                "transient fetch failure; backing off"
            );
            self.events.emit(
                &Event::new("fetch_retry")
                    .with("source", source_name)
                    .with("attempt", attempt)
                    .with("delay_ms", delay.as_millis() as u64)
                    .with("cause", cause),
            );
            sleep(delay).await;
        }
    }

    fn emit_failed(&self, source_name: &str, started: Instant, err: &FetchError) {
        warn!(target: "ingest", source = %source_name, error = %err, "fetch failed");
        self.events.emit(
            &Event::new("fetch_failed")
                .with("source", source_name)
                .with("duration_ms", started.elapsed().as_millis() as u64)
                .with("transient", err.is_transient())
                .with("cause", err.to_string()),
        );
    }
}

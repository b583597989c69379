// tests/common/mod.rs
//
// Scripted transport shared by the integration tests: every URL maps to a
// queue of responses (the last one repeats), and every call is counted.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use article_pipeline::ingest::fetcher::{FetchSettings, PageClient, PageResponse, TransportError};

pub type Reply = Result<PageResponse, TransportError>;

#[derive(Default)]
pub struct ScriptedClient {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ok(self, url: &str, body: &str) -> Self {
        self.script(url, vec![Ok(PageResponse::ok(body))])
    }

    pub fn status(self, url: &str, status: u16) -> Self {
        self.script(url, vec![Ok(PageResponse::status(status))])
    }

    pub fn script(self, url: &str, replies: Vec<Reply>) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), replies.into_iter().collect());
        self
    }

    /// Hold every request to `url` for `delay` before answering.
    pub fn slow(self, url: &str, delay: Duration) -> Self {
        self.delays.lock().unwrap().insert(url.to_string(), delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl PageClient for ScriptedClient {
    async fn get(&self, url: &str) -> Result<PageResponse, TransportError> {
        self.calls.lock().unwrap().push(url.to_string());
        let delay = self.delays.lock().unwrap().get(url).copied();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        let reply = {
            let mut routes = self.routes.lock().unwrap();
            match routes.get_mut(url) {
                Some(q) if q.len() > 1 => q.pop_front(),
                Some(q) => q.front().cloned(),
                None => None,
            }
        };
        reply.unwrap_or_else(|| Ok(PageResponse::status(404)))
    }
}

/// No politeness delay, no backoff, single attempt.
pub fn fast_fetch() -> FetchSettings {
    FetchSettings {
        request_delay: Duration::ZERO,
        retry_base_delay: Duration::ZERO,
        max_attempts: 1,
        ..FetchSettings::default()
    }
}

pub fn fixture(name: &str) -> String {
    let path = format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("fixture {path}: {e}"))
}

/// RSS document with one `<item>` per `(title, link)`.
pub fn rss(items: &[(&str, &str)]) -> String {
    let mut out = String::from(r#"<?xml version="1.0"?><rss version="2.0"><channel><title>t</title>"#);
    for (title, link) in items {
        out.push_str(&format!(
            "<item><title>{title}</title><link>{link}</link><description>Coverage of {title}</description></item>"
        ));
    }
    out.push_str("</channel></rss>");
    out
}

/// Seed configuration pointed at scripted feeds, with network pacing off
/// and page extraction disabled.
pub fn feed_config(feeds: &[(&str, &str)], output_dir: &std::path::Path) -> article_pipeline::PipelineConfig {
    use article_pipeline::ingest::types::SourceDescriptor;

    let mut cfg = article_pipeline::PipelineConfig::seed();
    cfg.sources = feeds
        .iter()
        .map(|(name, url)| SourceDescriptor::feed(name, url))
        .collect();
    cfg.fetch.request_delay_ms = 0;
    cfg.fetch.retry_base_delay_ms = 0;
    cfg.fetch.max_attempts = 1;
    cfg.limits.extract_content = false;
    cfg.storage.output_dir = output_dir.to_path_buf();
    cfg
}

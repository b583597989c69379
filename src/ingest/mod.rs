// src/ingest/mod.rs
pub mod content;
pub mod dedup;
pub mod fetcher;
pub mod providers;
pub mod types;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::ingest::dedup::Deduplicator;
use crate::ingest::fetcher::SourceFetcher;
use crate::ingest::providers::{ArticleParser, Candidate};
use crate::ingest::types::{Article, SourceDescriptor};
use crate::relevance::RelevanceScorer;
use crate::telemetry::{Event, SharedSink};

/// Normalize text: decode entities, strip tags, fold quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[a-z!][^>]*>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace (nbsp included)
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"[\s\u{00A0}]+").unwrap());
    re_ws.replace_all(&out, " ").trim().to_string()
}

/// First `max` chars, trailing whitespace trimmed.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    s.chars().take(max).collect::<String>().trim_end().to_string()
}

#[derive(Debug, Clone)]
pub struct AcquisitionSettings {
    pub max_output_articles: usize,
    /// Whole-run budget; unfinished sources are aborted when it elapses.
    pub deadline: Option<Duration>,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            max_output_articles: 50,
            deadline: Some(Duration::from_secs(300)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "cause", rename_all = "snake_case")]
pub enum SourceStatus {
    Succeeded,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceOutcome {
    pub name: String,
    pub status: SourceStatus,
    /// Accepted (admitted and above threshold) before the output cap.
    pub articles: usize,
    pub skipped: usize,
    pub duplicates: usize,
    pub below_threshold: usize,
    pub duration_ms: u64,
}

impl SourceOutcome {
    fn failed(name: &str, cause: impl Into<String>, started: Instant) -> Self {
        Self {
            name: name.to_string(),
            status: SourceStatus::Failed(cause.into()),
            articles: 0,
            skipped: 0,
            duplicates: 0,
            below_threshold: 0,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == SourceStatus::Succeeded
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AcquisitionReport {
    pub successful: usize,
    pub failed: usize,
    /// In configuration order.
    pub per_source: Vec<SourceOutcome>,
    pub total_articles: usize,
    pub average_relevance: f32,
    pub max_relevance: f32,
}

#[derive(Debug, Clone, Default)]
pub struct Acquisition {
    pub articles: Vec<Article>,
    pub report: AcquisitionReport,
}

impl Acquisition {
    /// Nothing acquired: the run-level failure outcome.
    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }
}

struct SourceRun {
    outcome: SourceOutcome,
    articles: Vec<Article>,
}

/// Concurrent fetch → parse → score → dedup → threshold over all sources.
pub struct AcquisitionPipeline {
    fetcher: Arc<SourceFetcher>,
    parser: Arc<ArticleParser>,
    scorer: Arc<RelevanceScorer>,
    events: SharedSink,
    settings: AcquisitionSettings,
}

impl AcquisitionPipeline {
    pub fn new(
        fetcher: Arc<SourceFetcher>,
        parser: ArticleParser,
        scorer: RelevanceScorer,
        events: SharedSink,
        settings: AcquisitionSettings,
    ) -> Self {
        Self {
            fetcher,
            parser: Arc::new(parser),
            scorer: Arc::new(scorer),
            events,
            settings,
        }
    }

    pub fn fetcher(&self) -> Arc<SourceFetcher> {
        self.fetcher.clone()
    }

    /// Acquire with a fresh run-scoped deduplicator.
    pub async fn run(&self, sources: &[SourceDescriptor]) -> Acquisition {
        self.run_with(sources, Arc::new(Deduplicator::new())).await
    }

    pub async fn run_with(&self, sources: &[SourceDescriptor], dedup: Arc<Deduplicator>) -> Acquisition {
        let started = Instant::now();
        self.events.emit(&Event::new("acquisition_started").with("sources", sources.len()));

        let mut set = JoinSet::new();
        for (idx, source) in sources.iter().cloned().enumerate() {
            let fetcher = self.fetcher.clone();
            let parser = self.parser.clone();
            let scorer = self.scorer.clone();
            let dedup = dedup.clone();
            let events = self.events.clone();
            set.spawn(async move {
                let task_started = Instant::now();
                let name = source.name.clone();
                let run = AssertUnwindSafe(acquire_source(source, fetcher, parser, scorer, dedup, events))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| SourceRun {
                        outcome: SourceOutcome::failed(&name, "task panicked", task_started),
                        articles: Vec::new(),
                    });
                (idx, run)
            });
        }

        let mut slots: Vec<Option<SourceRun>> = (0..sources.len()).map(|_| None).collect();
        let collect = async {
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((idx, run)) => slots[idx] = Some(run),
                    Err(e) => warn!(target: "ingest", error = %e, "source task did not complete"),
                }
            }
        };
        let timed_out = match self.settings.deadline {
            Some(d) => tokio::time::timeout(d, collect).await.is_err(),
            None => {
                collect.await;
                false
            }
        };
        if timed_out {
            warn!(target: "ingest", "acquisition deadline exceeded; aborting unfinished sources");
            set.shutdown().await;
        }

        // Merge in configuration order.
        let mut per_source = Vec::with_capacity(sources.len());
        let mut articles = Vec::new();
        for (source, slot) in sources.iter().zip(slots) {
            match slot {
                Some(run) => {
                    per_source.push(run.outcome);
                    articles.extend(run.articles);
                }
                None => {
                    self.events.emit(
                        &Event::new("source_failed")
                            .with("source", source.name.as_str())
                            .with("cause", "deadline exceeded"),
                    );
                    per_source.push(SourceOutcome::failed(&source.name, "deadline exceeded", started));
                }
            }
        }

        // Stable: equal relevance keeps source order.
        articles.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        articles.truncate(self.settings.max_output_articles);

        let successful = per_source.iter().filter(|o| o.is_success()).count();
        let report = AcquisitionReport {
            successful,
            failed: per_source.len() - successful,
            per_source,
            total_articles: articles.len(),
            average_relevance: if articles.is_empty() {
                0.0
            } else {
                articles.iter().map(|a| a.relevance).sum::<f32>() / articles.len() as f32
            },
            max_relevance: articles.iter().map(|a| a.relevance).fold(0.0, f32::max),
        };

        info!(
            target: "ingest",
            successful = report.successful,
            failed = report.failed,
            articles = report.total_articles,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "acquisition finished"
        );
        self.events.emit(
            &Event::new("acquisition_finished")
                .with("successful", report.successful)
                .with("failed", report.failed)
                .with("articles", report.total_articles)
                .with("duration_ms", started.elapsed().as_millis() as u64),
        );

        Acquisition { articles, report }
    }
}

/// One source, strictly sequential.
async fn acquire_source(
    source: SourceDescriptor,
    fetcher: Arc<SourceFetcher>,
    parser: Arc<ArticleParser>,
    scorer: Arc<RelevanceScorer>,
    dedup: Arc<Deduplicator>,
    events: SharedSink,
) -> SourceRun {
    let started = Instant::now();

    let raw = match fetcher.fetch(&source).await {
        Ok(raw) => raw,
        Err(e) => {
            return SourceRun {
                outcome: SourceOutcome::failed(&source.name, e.to_string(), started),
                articles: Vec::new(),
            }
        }
    };

    let candidates = match parser.parse(&raw, &source) {
        Ok(c) => c,
        Err(e) => {
            warn!(target: "ingest", source = %source.name, error = %e, "parse failed");
            events.emit(
                &Event::new("parse_failed")
                    .with("source", source.name.as_str())
                    .with("cause", e.to_string()),
            );
            return SourceRun {
                outcome: SourceOutcome::failed(&source.name, e.to_string(), started),
                articles: Vec::new(),
            };
        }
    };

    let mut outcome = SourceOutcome {
        name: source.name.clone(),
        status: SourceStatus::Succeeded,
        articles: 0,
        skipped: 0,
        duplicates: 0,
        below_threshold: 0,
        duration_ms: 0,
    };
    let mut accepted = Vec::new();

    for candidate in candidates {
        let mut article = match candidate {
            Candidate::Parsed(a) => a,
            Candidate::Skipped(reason) => {
                tracing::debug!(target: "ingest", source = %source.name, %reason, "candidate skipped");
                outcome.skipped += 1;
                continue;
            }
        };

        let rel = scorer.score(&article);
        article.relevance = rel.score;
        article.matched_terms = rel.matched;

        let decision = if !dedup.admit(&article.link) {
            outcome.duplicates += 1;
            "duplicate"
        } else if !scorer.passes(article.relevance) {
            outcome.below_threshold += 1;
            "below_threshold"
        } else {
            "accepted"
        };
        events.emit(
            &Event::new("article_scored")
                .with("source", source.name.as_str())
                .with("link", article.link.as_str())
                .with("relevance", article.relevance)
                .with("decision", decision),
        );
        if decision == "accepted" {
            accepted.push(article);
        }
    }

    outcome.articles = accepted.len();
    outcome.duration_ms = started.elapsed().as_millis() as u64;
    info!(
        target: "ingest",
        source = %source.name,
        articles = outcome.articles,
        skipped = outcome.skipped,
        duplicates = outcome.duplicates,
        below_threshold = outcome.below_threshold,
        "source done"
    );
    events.emit(
        &Event::new("source_completed")
            .with("source", source.name.as_str())
            .with("articles", outcome.articles)
            .with("duration_ms", outcome.duration_ms),
    );

    SourceRun {
        outcome,
        articles: accepted,
    }
}

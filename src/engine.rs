//! # Run Engine
//! One end-to-end run: estimate → pre-flight check → acquire → extract →
//! analyze (budget-truncated) → rank → synthesize → save.
//!
//! Every billable step goes through [`CreditLedger::charge`], which checks and
//! consumes atomically before the work starts. A refused charge truncates the
//! remaining work of that stage and is reported as a degradation; only an empty
//! acquisition (or a failed pre-flight check) makes the run unsuccessful.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use futures::{stream, StreamExt};
use serde::Serialize;
use serde_json::json;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::analyze::rank::{categorize, top, PriorityRanker, TierCounts};
use crate::analyze::DynAnalyzer;
use crate::config::PipelineConfig;
use crate::ingest::content::ContentExtractor;
use crate::ingest::fetcher::{PageClient, SourceFetcher};
use crate::ingest::providers::ArticleParser;
use crate::ingest::types::{Analysis, Article, SourceDescriptor};
use crate::ingest::{Acquisition, AcquisitionPipeline, AcquisitionReport};
use crate::ledger::{actions, meta, ActionBreakdown, BudgetExceeded, CreditLedger, Estimate};
use crate::storage::{short_hash, PostStore, RunMetadata, StoredArtifacts, StoredPost};
use crate::telemetry::{Event, SharedSink};

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub top_n: usize,
    pub analysis_concurrency: usize,
    pub extract_concurrency: usize,
    /// Articles assumed by the pre-flight estimate.
    pub estimated_articles: u32,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            top_n: 10,
            analysis_concurrency: 4,
            extract_concurrency: 4,
            estimated_articles: 15,
        }
    }
}

/// A stage that lost work (budget, collaborator failure) without failing the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Degradation {
    pub stage: &'static str,
    pub subject: String,
    pub reason: String,
}

impl Degradation {
    fn new(stage: &'static str, subject: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            stage,
            subject: subject.into(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CreditSummary {
    pub run_cost: f64,
    pub usage: f64,
    pub remaining: f64,
    pub daily_limit: f64,
    pub breakdown: BTreeMap<String, ActionBreakdown>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub estimate: Estimate,
    pub acquisition: AcquisitionReport,
    pub articles_acquired: usize,
    pub articles_extracted: usize,
    pub articles_analyzed: usize,
    pub analysis_failures: usize,
    pub skipped_for_budget: usize,
    pub tiers: TierCounts,
    pub top_posts: Vec<StoredPost>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub degraded: Vec<Degradation>,
    pub credits: CreditSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<StoredArtifacts>,
}

impl RunReport {
    fn new(run_id: String, started_at: DateTime<Utc>) -> Self {
        Self {
            success: false,
            error: None,
            run_id,
            started_at,
            duration_secs: 0.0,
            estimate: Estimate::default(),
            acquisition: AcquisitionReport::default(),
            articles_acquired: 0,
            articles_extracted: 0,
            articles_analyzed: 0,
            analysis_failures: 0,
            skipped_for_budget: 0,
            tiers: TierCounts::default(),
            top_posts: Vec::new(),
            summary: None,
            degraded: Vec::new(),
            credits: CreditSummary::default(),
            artifacts: None,
        }
    }
}

/// Acquisition-only result (`POST /scrape`).
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeReport {
    pub report: AcquisitionReport,
    pub articles: Vec<Article>,
    pub degraded: Vec<Degradation>,
}

/// Caller-supplied batch ranked outside a run (`POST /prioritize`).
#[derive(Debug, Clone, Serialize)]
pub struct Prioritized {
    pub total_articles: usize,
    pub tiers: TierCounts,
    pub top_articles: Vec<Article>,
}

pub struct RunEngine {
    sources: Vec<SourceDescriptor>,
    acquisition: AcquisitionPipeline,
    extractor: Option<ContentExtractor>,
    analyzer: DynAnalyzer,
    ranker: PriorityRanker,
    ledger: Arc<CreditLedger>,
    store: Arc<dyn PostStore>,
    events: SharedSink,
    settings: RunSettings,
}

impl RunEngine {
    /// Wire every stage from one immutable configuration.
    pub fn from_config(
        cfg: &PipelineConfig,
        client: Arc<dyn PageClient>,
        analyzer: DynAnalyzer,
        store: Arc<dyn PostStore>,
        ledger: Arc<CreditLedger>,
        events: SharedSink,
    ) -> Self {
        let fetcher = Arc::new(SourceFetcher::new(client, cfg.fetch_settings(), events.clone()));
        let acquisition = AcquisitionPipeline::new(
            fetcher.clone(),
            ArticleParser::new(cfg.parse_settings()),
            cfg.scorer(),
            events.clone(),
            cfg.acquisition_settings(),
        );
        let extractor = cfg
            .limits
            .extract_content
            .then(|| ContentExtractor::new(fetcher, cfg.limits.content_chars));
        let ranker = PriorityRanker::new(
            cfg.priority_weights,
            cfg.source_quality.clone(),
            cfg.engagement.keywords.clone(),
            events.clone(),
        );
        let settings = RunSettings {
            top_n: cfg.limits.top_n,
            analysis_concurrency: cfg.limits.analysis_concurrency.max(1),
            extract_concurrency: cfg.limits.analysis_concurrency.max(1),
            estimated_articles: cfg.limits.estimated_articles,
        };
        Self {
            sources: cfg.sources.clone(),
            acquisition,
            extractor,
            analyzer,
            ranker,
            ledger,
            store,
            events,
            settings,
        }
    }

    pub fn ledger(&self) -> &Arc<CreditLedger> {
        &self.ledger
    }

    pub fn store(&self) -> &Arc<dyn PostStore> {
        &self.store
    }

    pub fn sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }

    /// Planned work for the pre-flight check.
    pub fn estimate(&self) -> Estimate {
        let analyses = if self.analyzer.is_enabled() {
            self.settings.estimated_articles
        } else {
            0
        };
        self.ledger.estimate(&[
            (actions::SCRAPE_SOURCE, self.sources.len() as u32),
            (actions::ANALYZE_ARTICLE, analyses),
            (actions::PRIORITIZE_BATCH, 1),
        ])
    }

    /// Charge per source, then acquire from the sources that were affordable.
    async fn acquire(&self, degraded: &mut Vec<Degradation>) -> Acquisition {
        let mut affordable = Vec::with_capacity(self.sources.len());
        for s in &self.sources {
            match self
                .ledger
                .charge(actions::SCRAPE_SOURCE, meta(json!({ "source": s.name })))
            {
                Ok(_) => affordable.push(s.clone()),
                Err(e) => degraded.push(Degradation::new("acquire", s.name.as_str(), e)),
            }
        }
        self.acquisition.run(&affordable).await
    }

    pub async fn scrape(&self) -> ScrapeReport {
        let mut degraded = Vec::new();
        let acq = self.acquire(&mut degraded).await;
        ScrapeReport {
            report: acq.report,
            articles: acq.articles,
            degraded,
        }
    }

    /// Rank an externally supplied batch; billed as one prioritization.
    pub fn prioritize(&self, articles: Vec<Article>, top_n: Option<usize>) -> Result<Prioritized, BudgetExceeded> {
        self.ledger.charge(
            actions::PRIORITIZE_BATCH,
            meta(json!({ "articles": articles.len(), "external": true })),
        )?;
        let total_articles = articles.len();
        let mut ranked = self.ranker.rank(articles, Utc::now());
        let tiers = categorize(&ranked);
        ranked.truncate(top_n.unwrap_or(self.settings.top_n));
        info!(target: "engine", total_articles, returned = ranked.len(), "external batch prioritized");
        Ok(Prioritized {
            total_articles,
            tiers,
            top_articles: ranked,
        })
    }

    pub async fn run(&self) -> RunReport {
        let clock = Instant::now();
        let started_at = Utc::now();
        let run_id = short_hash(&format!(
            "{}:{}",
            started_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
            self.sources.len()
        ));
        let cost_before = self.ledger.session_cost();
        let mut report = RunReport::new(run_id.clone(), started_at);

        info!(target: "engine", %run_id, sources = self.sources.len(), analyzer = self.analyzer.provider_name(), "run started");
        self.events.emit(
            &Event::new("run_started")
                .with("run_id", run_id.as_str())
                .with("sources", self.sources.len()),
        );
        self.ledger.record(
            actions::PIPELINE_START,
            meta(json!({ "run_id": run_id, "sources": self.sources.len() })),
        );

        // 1) pre-flight
        report.estimate = self.estimate();
        if !self.ledger.check_limit(report.estimate.total) {
            let msg = format!(
                "daily credit limit would be exceeded: estimated {:.1}, remaining {:.1}",
                report.estimate.total,
                self.ledger.remaining()
            );
            return self.finish(report, Some(msg), clock, cost_before);
        }

        // 2) acquire
        let acquisition = self.acquire(&mut report.degraded).await;
        report.acquisition = acquisition.report.clone();
        report.articles_acquired = acquisition.articles.len();
        if acquisition.is_empty() {
            return self.finish(
                report,
                Some("no articles acquired from any source".to_string()),
                clock,
                cost_before,
            );
        }
        let mut articles = acquisition.articles;

        // 3) extract
        if let Some(extractor) = &self.extractor {
            let budgeted = self.reserve(actions::EXTRACT_CONTENT, "extract", &articles, &mut report.degraded);
            // futures are built up front so no borrowing closure lives in the run future
            let pending: Vec<_> = articles
                .iter_mut()
                .take(budgeted)
                .map(|a| extractor.extract(a))
                .collect();
            let outcomes: Vec<bool> = stream::iter(pending)
                .buffer_unordered(self.settings.extract_concurrency)
                .collect()
                .await;
            report.articles_extracted = outcomes.into_iter().filter(|ok| *ok).count();
        }

        // 4) analyze
        if self.analyzer.is_enabled() {
            self.analyze(&mut articles, &mut report).await;
        } else {
            info!(target: "engine", "analysis disabled; ranking with neutral relevance");
        }

        // 5) rank
        if let Err(e) = self
            .ledger
            .charge(actions::PRIORITIZE_BATCH, meta(json!({ "articles": articles.len() })))
        {
            report.degraded.push(Degradation::new("rank", "batch", e));
        }
        let ranked = self.ranker.rank(articles, Utc::now());
        report.tiers = categorize(&ranked);
        let best = top(&ranked, self.settings.top_n);

        // 6) synthesize
        if self.analyzer.is_enabled() && !best.is_empty() {
            match self
                .ledger
                .charge(actions::GENERATE_SUMMARY, meta(json!({ "articles": best.len() })))
            {
                Ok(_) => match self.analyzer.synthesize(best).await {
                    Ok(s) => report.summary = Some(s),
                    Err(e) => report.degraded.push(Degradation::new("synthesize", "top articles", e)),
                },
                Err(e) => report.degraded.push(Degradation::new("synthesize", "top articles", e)),
            }
        }
        report.top_posts = best.iter().map(StoredPost::from_article).collect();

        // 7) save
        let run_meta = RunMetadata {
            run_id: run_id.clone(),
            started_at,
            duration_secs: clock.elapsed().as_secs_f64(),
            articles_acquired: report.articles_acquired,
            articles_analyzed: report.articles_analyzed,
            total_cost: self.ledger.session_cost() - cost_before,
            remaining_balance: self.ledger.remaining(),
            summary: report.summary.clone(),
        };
        match self.store.save(&report.top_posts, &run_meta).await {
            Ok(a) => report.artifacts = Some(a),
            Err(e) => {
                error!(target: "engine", %run_id, error = ?e, "saving run output failed");
                report.degraded.push(Degradation::new("store", run_id.as_str(), format!("{e:#}")));
            }
        }

        self.finish(report, None, clock, cost_before)
    }

    /// Charge `action` once per article, in order, until the ledger refuses.
    /// Returns how many articles were paid for.
    fn reserve(
        &self,
        action: &str,
        stage: &'static str,
        articles: &[Article],
        degraded: &mut Vec<Degradation>,
    ) -> usize {
        for (i, a) in articles.iter().enumerate() {
            if let Err(e) = self.ledger.charge(action, meta(json!({ "link": a.link }))) {
                let left = articles.len() - i;
                warn!(target: "engine", action, paid = i, left, "budget exhausted; truncating stage");
                degraded.push(Degradation::new(stage, format!("{left} article(s)"), e));
                return i;
            }
        }
        articles.len()
    }

    async fn analyze(&self, articles: &mut [Article], report: &mut RunReport) {
        let budgeted = self.reserve(actions::ANALYZE_ARTICLE, "analyze", articles, &mut report.degraded);
        report.skipped_for_budget = articles.len() - budgeted;

        let pending: Vec<_> = articles[..budgeted]
            .iter()
            .map(|a| self.analyzer.analyze(a))
            .collect();
        let replies: Vec<_> = stream::iter(pending)
            .buffered(self.settings.analysis_concurrency)
            .collect()
            .await;
        let results = replies.into_iter().map(|r| match r {
            Ok(out) => Analysis::scored(out.score, out.text),
            Err(e) => Analysis::failed(e.to_string()),
        });

        for (a, analysis) in articles.iter_mut().zip(results) {
            if let Some(cause) = analysis.error() {
                warn!(target: "engine", link = %a.link, %cause, "analysis failed; article degraded");
                report.analysis_failures += 1;
                report
                    .degraded
                    .push(Degradation::new("analyze", a.link.as_str(), cause));
            }
            a.analysis = analysis;
        }
        // failures were attempted but produced no analysis
        report.articles_analyzed = budgeted - report.analysis_failures;
    }

    fn finish(
        &self,
        mut report: RunReport,
        failure: Option<String>,
        clock: Instant,
        cost_before: f64,
    ) -> RunReport {
        report.success = failure.is_none();
        report.error = failure;
        report.duration_secs = clock.elapsed().as_secs_f64();
        report.credits = CreditSummary {
            run_cost: self.ledger.session_cost() - cost_before,
            usage: self.ledger.usage(),
            remaining: self.ledger.remaining(),
            daily_limit: self.ledger.daily_limit(),
            breakdown: self.ledger.breakdown(),
        };

        match &report.error {
            None => info!(
                target: "engine",
                run_id = %report.run_id,
                acquired = report.articles_acquired,
                analyzed = report.articles_analyzed,
                degraded = report.degraded.len(),
                cost = report.credits.run_cost,
                "run complete"
            ),
            Some(e) => warn!(target: "engine", run_id = %report.run_id, error = %e, "run failed"),
        }
        self.events.emit(
            &Event::new("run_completed")
                .with("run_id", report.run_id.as_str())
                .with("success", report.success)
                .with("articles", report.articles_acquired)
                .with("cost", report.credits.run_cost)
                .with("duration_ms", (report.duration_secs * 1000.0) as u64),
        );
        report
    }
}

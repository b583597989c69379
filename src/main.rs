//! Article Pipeline: binary entrypoint.
//! Boots the Axum control plane, wiring configuration, the credit ledger,
//! the analysis client, storage and observability.

use std::sync::Arc;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use article_pipeline::analyze::ai_adapter::build_analyzer_from_env;
use article_pipeline::api::{self, AppState};
use article_pipeline::config::PipelineConfig;
use article_pipeline::engine::RunEngine;
use article_pipeline::ingest::fetcher::HttpPageClient;
use article_pipeline::ledger::CreditLedger;
use article_pipeline::metrics::Metrics;
use article_pipeline::storage::FileStore;
use article_pipeline::telemetry::{FanoutSink, MetricsSink, SharedSink, TracingSink};

/// `RUST_LOG` filter (default `info`); `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    // Shuttle may already have installed a subscriber; keep whichever came first.
    let _ = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = PipelineConfig::load_default().context("loading pipeline config")?;
    let metrics = Metrics::init(cfg.credits.daily_limit)?;

    let events: SharedSink = Arc::new(FanoutSink::new(vec![
        Arc::new(TracingSink),
        Arc::new(MetricsSink::new()),
    ]));
    let ledger = Arc::new(CreditLedger::new(
        cfg.credits.costs.clone(),
        cfg.credits.daily_limit,
        events.clone(),
    ));
    let analyzer = build_analyzer_from_env()?;
    let store = Arc::new(FileStore::new(cfg.storage.output_dir.clone()).with_retention(cfg.storage.keep_last));
    let client = Arc::new(HttpPageClient::new(&cfg.fetch_settings())?);

    info!(
        topic = %cfg.topic,
        sources = cfg.sources.len(),
        analyzer = analyzer.provider_name(),
        daily_limit = cfg.credits.daily_limit,
        output_dir = %cfg.storage.output_dir.display(),
        "pipeline configured"
    );

    let engine = RunEngine::from_config(&cfg, client, analyzer, store, ledger, events);
    let router = api::router(AppState::new(Arc::new(engine))).merge(metrics.router());

    Ok(router.into())
}

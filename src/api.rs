//! HTTP control plane: trigger runs, inspect budget and past output.

use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use shuttle_axum::axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::engine::{RunEngine, RunReport};
use crate::ingest::types::Article;
use crate::ledger::CreditLedger;

#[derive(Clone)]
pub struct AppState {
    engine: Arc<RunEngine>,
    last_run: Arc<RwLock<Option<RunReport>>>,
    // one run (or scrape) at a time
    run_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(engine: Arc<RunEngine>) -> Self {
        Self {
            engine,
            last_run: Arc::new(RwLock::new(None)),
            run_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn ledger(&self) -> &Arc<CreditLedger> {
        self.engine.ledger()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/run", post(run))
        .route("/scrape", post(scrape))
        .route("/status", get(status))
        .route("/runs", get(runs))
        .route("/runs/latest", get(latest_run))
        .route("/prioritize", post(prioritize))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error(code: StatusCode, msg: impl Into<String>) -> Response {
    (code, Json(ErrorBody { error: msg.into() })).into_response()
}

fn conflict() -> Response {
    error(StatusCode::CONFLICT, "a run is already in progress")
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn run(State(state): State<AppState>) -> Response {
    let Ok(_guard) = state.run_lock.try_lock() else {
        warn!(target: "api", "run rejected: already running");
        return conflict();
    };
    info!(target: "api", "run triggered");
    let report = state.engine.run().await;
    let code = if report.success {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    *state.last_run.write().expect("rwlock poisoned") = Some(report.clone());
    (code, Json(report)).into_response()
}

async fn scrape(State(state): State<AppState>) -> Response {
    let Ok(_guard) = state.run_lock.try_lock() else {
        return conflict();
    };
    Json(state.engine.scrape().await).into_response()
}

#[derive(Serialize)]
struct StatusOut {
    running: bool,
    sources: usize,
    daily_limit: f64,
    usage: f64,
    remaining: f64,
    session_cost: f64,
    last_run: Option<LastRunOut>,
}

#[derive(Serialize)]
struct LastRunOut {
    run_id: String,
    success: bool,
    started_at: String,
    articles_acquired: usize,
    articles_analyzed: usize,
    run_cost: f64,
}

async fn status(State(state): State<AppState>) -> Json<StatusOut> {
    let ledger = state.ledger();
    let last_run = state
        .last_run
        .read()
        .expect("rwlock poisoned")
        .as_ref()
        .map(|r| LastRunOut {
            run_id: r.run_id.clone(),
            success: r.success,
            started_at: r.started_at.to_rfc3339(),
            articles_acquired: r.articles_acquired,
            articles_analyzed: r.articles_analyzed,
            run_cost: r.credits.run_cost,
        });
    Json(StatusOut {
        running: state.run_lock.try_lock().is_err(),
        sources: state.engine.sources().len(),
        daily_limit: ledger.daily_limit(),
        usage: ledger.usage(),
        remaining: ledger.remaining(),
        session_cost: ledger.session_cost(),
        last_run,
    })
}

async fn runs(State(state): State<AppState>) -> Response {
    match state.engine.store().list_runs().await {
        Ok(paths) => {
            let names: Vec<String> = paths
                .iter()
                .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                .collect();
            Json(names).into_response()
        }
        Err(e) => error(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")),
    }
}

async fn latest_run(State(state): State<AppState>) -> Response {
    match state.engine.store().latest_run().await {
        Ok(Some(run)) => Json(run).into_response(),
        Ok(None) => error(StatusCode::NOT_FOUND, "no saved runs"),
        Err(e) => error(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")),
    }
}

#[derive(Deserialize)]
struct PrioritizeIn {
    articles: Vec<Article>,
    #[serde(default)]
    top_count: Option<usize>,
}

#[derive(Serialize)]
struct PrioritizeOut {
    total_articles: usize,
    top_articles_count: usize,
    tiers: crate::analyze::TierCounts,
    top_articles: Vec<Article>,
    timestamp: String,
}

async fn prioritize(State(state): State<AppState>, Json(body): Json<PrioritizeIn>) -> Response {
    if body.articles.is_empty() {
        return error(StatusCode::BAD_REQUEST, "`articles` must not be empty");
    }
    match state.engine.prioritize(body.articles, body.top_count) {
        Ok(p) => Json(PrioritizeOut {
            total_articles: p.total_articles,
            top_articles_count: p.top_articles.len(),
            tiers: p.tiers,
            top_articles: p.top_articles,
            timestamp: Utc::now().to_rfc3339(),
        })
        .into_response(),
        Err(e) => {
            warn!(target: "api", error = %e, "prioritize refused");
            error(StatusCode::PAYMENT_REQUIRED, e.to_string())
        }
    }
}

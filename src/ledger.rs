// src/ledger.rs
//! Credit accounting: per-action costs, estimates, a daily consumption window
//! and an append-only audit trail.
//!
//! Two consumption styles:
//! - [`CreditLedger::consume`] increments unconditionally. Callers wanting hard
//!   enforcement must call [`CreditLedger::check_limit`] first.
//! - [`CreditLedger::try_consume`] checks and increments under one lock, so two
//!   concurrent callers can never both pass a check that only one fits.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::telemetry::{Event, SharedSink};

/// Action names used by the pipeline.
pub mod actions {
    pub const PIPELINE_START: &str = "pipeline_start";
    pub const SCRAPE_SOURCE: &str = "scrape_source";
    pub const EXTRACT_CONTENT: &str = "extract_content";
    pub const ANALYZE_ARTICLE: &str = "analyze_article";
    pub const GENERATE_SUMMARY: &str = "generate_summary";
    pub const PRIORITIZE_BATCH: &str = "prioritize_batch";
    pub const API_CALL: &str = "api_call";
}

/// Cost of any action missing from the table.
pub const UNKNOWN_ACTION_COST: f64 = 1.0;
pub const DEFAULT_DAILY_LIMIT: f64 = 1000.0;

pub fn default_costs() -> BTreeMap<String, f64> {
    [
        (actions::PIPELINE_START, 0.0),
        (actions::SCRAPE_SOURCE, 1.0),
        (actions::EXTRACT_CONTENT, 0.5),
        (actions::ANALYZE_ARTICLE, 10.0),
        (actions::GENERATE_SUMMARY, 15.0),
        (actions::PRIORITIZE_BATCH, 2.0),
        (actions::API_CALL, 5.0),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// Today's date in local time; swapped out in tests.
pub type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

pub fn local_clock() -> Clock {
    Arc::new(|| Local::now().date_naive())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    pub action: String,
    pub unit_cost: f64,
    pub at: DateTime<Utc>,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EstimateLine {
    pub action: String,
    pub count: u32,
    pub unit_cost: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Estimate {
    pub lines: Vec<EstimateLine>,
    pub total: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ActionBreakdown {
    pub count: u32,
    pub unit_cost: f64,
    pub total_cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("credit budget exceeded: {required} requested, {remaining} of {limit} remaining")]
pub struct BudgetExceeded {
    pub required: f64,
    pub remaining: f64,
    pub limit: f64,
}

#[derive(Debug)]
struct Window {
    day: NaiveDate,
    usage: f64,
}

pub struct CreditLedger {
    costs: BTreeMap<String, f64>,
    daily_limit: f64,
    window: Mutex<Window>,
    entries: Mutex<Vec<LedgerEntry>>,
    clock: Clock,
    events: SharedSink,
}

impl CreditLedger {
    pub fn new(costs: BTreeMap<String, f64>, daily_limit: f64, events: SharedSink) -> Self {
        Self::with_clock(costs, daily_limit, events, local_clock())
    }

    pub fn with_clock(
        costs: BTreeMap<String, f64>,
        daily_limit: f64,
        events: SharedSink,
        clock: Clock,
    ) -> Self {
        let day = clock();
        Self {
            costs,
            daily_limit: daily_limit.max(0.0),
            window: Mutex::new(Window { day, usage: 0.0 }),
            entries: Mutex::new(Vec::new()),
            clock,
            events,
        }
    }

    pub fn unit_cost(&self, action: &str) -> f64 {
        self.costs.get(action).copied().unwrap_or(UNKNOWN_ACTION_COST)
    }

    pub fn daily_limit(&self) -> f64 {
        self.daily_limit
    }

    /// Pure: planned `(action, count)` pairs → per-line and total cost.
    pub fn estimate(&self, planned: &[(&str, u32)]) -> Estimate {
        let lines: Vec<EstimateLine> = planned
            .iter()
            .map(|&(action, count)| {
                let unit_cost = self.unit_cost(action);
                EstimateLine {
                    action: action.to_string(),
                    count,
                    unit_cost,
                    total: unit_cost * count as f64,
                }
            })
            .collect();
        let total = lines.iter().map(|l| l.total).sum();
        Estimate { lines, total }
    }

    /// Start a fresh window when the local date has moved on.
    fn roll(&self, w: &mut Window) -> bool {
        let today = (self.clock)();
        if today != w.day {
            w.day = today;
            w.usage = 0.0;
            true
        } else {
            false
        }
    }

    fn lock_window(&self) -> (std::sync::MutexGuard<'_, Window>, bool) {
        let mut w = self.window.lock().expect("ledger window poisoned");
        let rolled = self.roll(&mut w);
        (w, rolled)
    }

    fn note_rollover(&self, rolled: bool) {
        if rolled {
            info!(target: "ledger", "daily credit window reset");
            self.events.emit(&Event::new("window_reset"));
        }
    }

    /// `usage + required <= limit` for today's window.
    pub fn check_limit(&self, required: f64) -> bool {
        let (w, rolled) = self.lock_window();
        let usage = w.usage;
        drop(w);
        self.note_rollover(rolled);

        let ok = usage + required <= self.daily_limit;
        if !ok {
            warn!(target: "ledger", required, usage, limit = self.daily_limit, "daily credit limit would be exceeded");
            self.events.emit(
                &Event::new("limit_exceeded")
                    .with("required", required)
                    .with("usage", usage)
                    .with("limit", self.daily_limit),
            );
        }
        ok
    }

    /// Unconditional increment; pair with [`Self::check_limit`] for enforcement.
    pub fn consume(&self, credits: f64) {
        let (mut w, rolled) = self.lock_window();
        w.usage += credits;
        let usage = w.usage;
        drop(w);
        self.note_rollover(rolled);
        self.emit_consumed(credits, usage);
    }

    /// Check and increment atomically.
    pub fn try_consume(&self, credits: f64) -> Result<(), BudgetExceeded> {
        let (mut w, rolled) = self.lock_window();
        if w.usage + credits > self.daily_limit {
            let err = BudgetExceeded {
                required: credits,
                remaining: (self.daily_limit - w.usage).max(0.0),
                limit: self.daily_limit,
            };
            drop(w);
            self.note_rollover(rolled);
            warn!(target: "ledger", error = %err, "credit consumption refused");
            self.events.emit(
                &Event::new("limit_exceeded")
                    .with("required", credits)
                    .with("remaining", err.remaining)
                    .with("limit", self.daily_limit),
            );
            return Err(err);
        }
        w.usage += credits;
        let usage = w.usage;
        drop(w);
        self.note_rollover(rolled);
        self.emit_consumed(credits, usage);
        Ok(())
    }

    fn emit_consumed(&self, credits: f64, usage: f64) {
        debug!(target: "ledger", credits, usage, "credits consumed");
        self.events.emit(
            &Event::new("credits_consumed")
                .with("credits", credits)
                .with("usage", usage)
                .with("remaining", (self.daily_limit - usage).max(0.0)),
        );
    }

    /// Append an audit entry for `action` at its unit cost.
    pub fn record(&self, action: &str, metadata: Map<String, Value>) -> LedgerEntry {
        let entry = LedgerEntry {
            action: action.to_string(),
            unit_cost: self.unit_cost(action),
            at: Utc::now(),
            metadata,
        };
        let cumulative = {
            let mut entries = self.entries.lock().expect("ledger entries poisoned");
            entries.push(entry.clone());
            entries.iter().map(|e| e.unit_cost).sum::<f64>()
        };
        debug!(target: "ledger", action, cost = entry.unit_cost, cumulative, "action recorded");
        self.events.emit(
            &Event::new("action_recorded")
                .with("action", action)
                .with("cost", entry.unit_cost)
                .with("cumulative_cost", cumulative),
        );
        entry
    }

    /// `try_consume(unit_cost(action))` followed by `record`.
    pub fn charge(&self, action: &str, metadata: Map<String, Value>) -> Result<LedgerEntry, BudgetExceeded> {
        self.try_consume(self.unit_cost(action))?;
        Ok(self.record(action, metadata))
    }

    pub fn usage(&self) -> f64 {
        let (w, rolled) = self.lock_window();
        let usage = w.usage;
        drop(w);
        self.note_rollover(rolled);
        usage
    }

    pub fn remaining(&self) -> f64 {
        (self.daily_limit - self.usage()).max(0.0)
    }

    /// Sum of unit costs over every recorded entry.
    pub fn session_cost(&self) -> f64 {
        self.entries
            .lock()
            .expect("ledger entries poisoned")
            .iter()
            .map(|e| e.unit_cost)
            .sum()
    }

    pub fn breakdown(&self) -> BTreeMap<String, ActionBreakdown> {
        let entries = self.entries.lock().expect("ledger entries poisoned");
        let mut out: BTreeMap<String, ActionBreakdown> = BTreeMap::new();
        for e in entries.iter() {
            let b = out.entry(e.action.clone()).or_default();
            b.count += 1;
            b.unit_cost = e.unit_cost;
            b.total_cost += e.unit_cost;
        }
        out
    }

    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries.lock().expect("ledger entries poisoned").clone()
    }
}

/// `serde_json::Map` from `json!({...})`; non-objects give an empty map.
pub fn meta(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(m) => m,
        _ => Map::new(),
    }
}

//! # Telemetry
//! Observability port for the pipeline.
//!
//! Components never talk to a concrete tracking client. They receive a
//! [`SharedSink`] at construction and emit one named [`Event`] per state
//! transition (fetch start/success/failure, scoring/dedup outcome, ledger
//! check/consume, rank completion). Sinks are fire-and-forget: the pipeline
//! behaves identically with [`NoopSink`].

use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::info;

/// A named event with a small attribute map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub name: &'static str,
    pub attrs: BTreeMap<&'static str, Value>,
}

impl Event {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            attrs: BTreeMap::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with(mut self, key: &'static str, value: impl Into<Value>) -> Self {
        self.attrs.insert(key, value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attrs.get(key)
    }
}

/// Structured-event sink. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &Event);
}

pub type SharedSink = Arc<dyn EventSink>;

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: &Event) {}
}

/// Convenience constructor for components built in tests or without telemetry.
pub fn noop() -> SharedSink {
    Arc::new(NoopSink)
}

/// Logs every event on the `events` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &Event) {
        let attrs = serde_json::to_string(&event.attrs).unwrap_or_default();
        info!(target: "events", event = event.name, %attrs);
    }
}

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "pipeline_events_total",
            "Structured pipeline events, labelled by event name."
        );
        describe_histogram!(
            "fetch_duration_ms",
            "Wall time of one source fetch including retries, in milliseconds."
        );
        describe_counter!(
            "credits_consumed_total",
            "Credits consumed against the daily window."
        );
    });
}

/// Turns events into `metrics` counters/histograms.
#[derive(Debug, Clone, Copy)]
pub struct MetricsSink;

impl MetricsSink {
    pub fn new() -> Self {
        ensure_metrics_described();
        Self
    }
}

impl Default for MetricsSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for MetricsSink {
    fn emit(&self, event: &Event) {
        counter!("pipeline_events_total", "event" => event.name).increment(1);

        if matches!(event.name, "fetch_succeeded" | "fetch_failed") {
            if let Some(ms) = event.get("duration_ms").and_then(Value::as_f64) {
                histogram!("fetch_duration_ms", "outcome" => event.name).record(ms);
            }
        }
        if event.name == "credits_consumed" {
            if let Some(c) = event.get("credits").and_then(Value::as_f64) {
                // counters are integral; keep centi-credits so 0.5 costs survive
                counter!("credits_consumed_total").increment((c * 100.0).round() as u64);
            }
        }
    }
}

/// Broadcasts to several sinks.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<SharedSink>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<SharedSink>) -> Self {
        Self { sinks }
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: &Event) {
        for s in &self.sinks {
            s.emit(event);
        }
    }
}

/// In-memory sink for tests and diagnostics.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("memory sink poisoned").clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.name).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events().iter().filter(|e| e.name == name).count()
    }

    pub fn last(&self, name: &str) -> Option<Event> {
        self.events().into_iter().rev().find(|e| e.name == name)
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &Event) {
        self.events
            .lock()
            .expect("memory sink poisoned")
            .push(event.clone());
    }
}

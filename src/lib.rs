// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod config;
pub mod engine;
pub mod ledger;
pub mod metrics;
pub mod relevance;
pub mod source_quality;
pub mod storage;
pub mod telemetry;

// Acquisition: fetch, parse, score, dedup
pub mod ingest;

// Post-acquisition: analysis and priority ranking
pub mod analyze;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::config::PipelineConfig;
pub use crate::engine::{RunEngine, RunReport};
pub use crate::ledger::CreditLedger;

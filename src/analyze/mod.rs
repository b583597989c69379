// src/analyze/mod.rs
//! Post-acquisition stages: paid analysis and priority ranking.

pub mod ai_adapter;
pub mod rank;
pub mod scoring;
pub mod weights;

// Re-export convenient types.
pub use crate::analyze::ai_adapter::{
    AnalysisError, AnalysisOutput, Analyzer, DisabledAnalyzer, DynAnalyzer, MockAnalyzer,
    OpenAiAnalyzer,
};
pub use crate::analyze::rank::{categorize, top, PriorityRanker, PriorityTier, TierCounts};
pub use crate::analyze::scoring::{PriorityFactors, ScoringError};
pub use crate::analyze::weights::PriorityWeights;

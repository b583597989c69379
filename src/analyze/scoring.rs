//! Priority factors, each on a 0..=10 scale.
//!
//! composite = Σ factor × weight × 10, clamped to 0..=100.

use chrono::{DateTime, Utc};

use super::PriorityWeights;

/// Relevance factor when no analysis is present.
pub const DEFAULT_RELEVANCE_FACTOR: f32 = 5.0;
/// Recency factor when the capture time is unknown.
pub const DEFAULT_RECENCY_FACTOR: f32 = 5.0;
/// Assigned when the composite cannot be computed for one article.
pub const FALLBACK_PRIORITY: f32 = 50.0;

pub const DEFAULT_ENGAGEMENT_KEYWORDS: [&str; 12] = [
    "breakthrough",
    "revolutionary",
    "game-changing",
    "announces",
    "launches",
    "unveils",
    "first",
    "new",
    "innovative",
    "record",
    "major",
    "significant",
];

pub fn default_engagement_keywords() -> Vec<String> {
    DEFAULT_ENGAGEMENT_KEYWORDS.iter().map(|k| k.to_string()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("non-finite {factor} factor ({value})")]
pub struct ScoringError {
    pub factor: &'static str,
    pub value: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PriorityFactors {
    pub relevance: f32,
    pub recency: f32,
    pub source_quality: f32,
    pub engagement: f32,
}

impl PriorityFactors {
    pub fn composite(&self, w: &PriorityWeights) -> Result<f32, ScoringError> {
        for (factor, value) in [
            ("relevance", self.relevance),
            ("recency", self.recency),
            ("source_quality", self.source_quality),
            ("engagement", self.engagement),
        ] {
            if !value.is_finite() {
                return Err(ScoringError { factor, value });
            }
        }
        let raw = self.relevance * w.relevance
            + self.recency * w.recency
            + self.source_quality * w.source_quality
            + self.engagement * w.engagement;
        Ok((raw * 10.0).clamp(0.0, 100.0))
    }
}

/// Age buckets: <6h → 10, <24h → 8, <48h → 6, <72h → 4, else 2.
pub fn recency_score(captured_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f32 {
    let Some(at) = captured_at else {
        return DEFAULT_RECENCY_FACTOR;
    };
    let age_hours = (now - at).num_seconds() as f64 / 3600.0;
    match age_hours {
        h if h < 6.0 => 10.0,
        h if h < 24.0 => 8.0,
        h if h < 48.0 => 6.0,
        h if h < 72.0 => 4.0,
        _ => 2.0,
    }
}

/// Base 5; +0.5 per distinct keyword found in title or analysis text;
/// +1 for a question in the text, +0.5 for a hashtag; capped at 10.
pub fn engagement_score(title: &str, analysis_text: &str, keywords: &[String]) -> f32 {
    let hay = format!("{} {}", title.to_lowercase(), analysis_text.to_lowercase());
    let hits = keywords
        .iter()
        .filter(|k| !k.is_empty() && hay.contains(&k.to_lowercase()))
        .count();

    let mut score = 5.0 + 0.5 * hits as f32;
    if analysis_text.contains('?') {
        score += 1.0;
    }
    if analysis_text.contains('#') {
        score += 0.5;
    }
    score.min(10.0)
}

// src/analyze/rank.rs
//! Priority ranking: composite score per article, stable descending sort,
//! 1-based ranks.
//!
//! - A per-article scoring failure assigns [`FALLBACK_PRIORITY`] and the
//!   batch continues.
//! - Equal scores keep their input order.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::scoring::{
    engagement_score, recency_score, PriorityFactors, ScoringError, DEFAULT_RELEVANCE_FACTOR,
    FALLBACK_PRIORITY,
};
use super::PriorityWeights;
use crate::ingest::types::Article;
use crate::source_quality::SourceQualityConfig;
use crate::telemetry::{Event, SharedSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityTier {
    High,
    Medium,
    Low,
}

impl PriorityTier {
    /// high ≥ 80, medium ≥ 60, otherwise low.
    pub fn for_score(score: f32) -> Self {
        if score >= 80.0 {
            PriorityTier::High
        } else if score >= 60.0 {
            PriorityTier::Medium
        } else {
            PriorityTier::Low
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierCounts {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

pub fn categorize(articles: &[Article]) -> TierCounts {
    articles
        .iter()
        .fold(TierCounts::default(), |mut acc, a| {
            match PriorityTier::for_score(a.priority_score) {
                PriorityTier::High => acc.high += 1,
                PriorityTier::Medium => acc.medium += 1,
                PriorityTier::Low => acc.low += 1,
            }
            acc
        })
}

/// The first `n` of an already ranked slice.
pub fn top(articles: &[Article], n: usize) -> &[Article] {
    &articles[..n.min(articles.len())]
}

pub struct PriorityRanker {
    weights: PriorityWeights,
    quality: SourceQualityConfig,
    engagement_keywords: Vec<String>,
    events: SharedSink,
}

impl PriorityRanker {
    pub fn new(
        weights: PriorityWeights,
        quality: SourceQualityConfig,
        engagement_keywords: Vec<String>,
        events: SharedSink,
    ) -> Self {
        Self {
            weights,
            quality: quality.normalized(),
            engagement_keywords,
            events,
        }
    }

    pub fn factors(&self, article: &Article, now: DateTime<Utc>) -> PriorityFactors {
        PriorityFactors {
            relevance: article.analysis.score().unwrap_or(DEFAULT_RELEVANCE_FACTOR),
            recency: recency_score(article.captured_at, now),
            source_quality: self.quality.quality_for(&article.source),
            engagement: engagement_score(
                &article.title,
                article.analysis.text(),
                &self.engagement_keywords,
            ),
        }
    }

    pub fn priority_score(&self, article: &Article, now: DateTime<Utc>) -> Result<f32, ScoringError> {
        self.factors(article, now).composite(&self.weights)
    }

    /// Score, sort descending (stable), assign ranks 1..=N.
    pub fn rank(&self, mut articles: Vec<Article>, now: DateTime<Utc>) -> Vec<Article> {
        let mut fallbacks = 0usize;
        for a in articles.iter_mut() {
            a.priority_score = match self.priority_score(a, now) {
                Ok(s) => s,
                Err(e) => {
                    warn!(target: "rank", link = %a.link, error = %e, "priority scoring failed; using fallback");
                    fallbacks += 1;
                    FALLBACK_PRIORITY
                }
            };
        }

        articles.sort_by(|a, b| {
            b.priority_score
                .partial_cmp(&a.priority_score)
                .unwrap_or(Ordering::Equal)
        });
        for (i, a) in articles.iter_mut().enumerate() {
            a.priority_rank = i as u32 + 1;
        }

        let tiers = categorize(&articles);
        let top_score = articles.first().map(|a| a.priority_score).unwrap_or(0.0);
        info!(
            target: "rank",
            articles = articles.len(),
            top_score,
            high = tiers.high,
            medium = tiers.medium,
            low = tiers.low,
            fallbacks,
            "ranking complete"
        );
        self.events.emit(
            &Event::new("rank_completed")
                .with("articles", articles.len())
                .with("top_score", top_score)
                .with("fallbacks", fallbacks),
        );
        articles
    }
}

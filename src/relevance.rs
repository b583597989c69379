// src/relevance.rs
//! Topical relevance: keyword categories, position-weighted matching and
//! the acceptance threshold.
//!
//! Every term of every category is checked. A term found in the title adds
//! `weight × title_multiplier`; otherwise a term found in the excerpt adds
//! `weight`. The raw sum is divided by a normalization constant, capped at
//! 1.0 and rounded to three decimals.

use crate::ingest::types::Article;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_NORMALIZATION: f32 = 50.0;
pub const DEFAULT_MIN_RELEVANCE: f32 = 0.3;
pub const DEFAULT_TITLE_MULTIPLIER: f32 = 2.0;

/// Result of relevance evaluation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Relevance {
    pub score: f32,
    /// `category:position:term` for every contributing term.
    pub matched: Vec<String>,
}

/* ----------------------------
Config schema (from TOML)
---------------------------- */

fn default_weight() -> f32 {
    1.0
}

fn default_title_multiplier() -> f32 {
    DEFAULT_TITLE_MULTIPLIER
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordCategory {
    #[serde(default)]
    pub terms: Vec<String>,
    #[serde(default = "default_weight")]
    pub weight: f32,
    #[serde(default = "default_title_multiplier")]
    pub title_multiplier: f32,
}

impl Default for KeywordCategory {
    fn default() -> Self {
        Self {
            terms: Vec::new(),
            weight: default_weight(),
            title_multiplier: default_title_multiplier(),
        }
    }
}

impl KeywordCategory {
    pub fn new(terms: &[&str], weight: f32) -> Self {
        Self {
            terms: terms.iter().map(|t| t.to_string()).collect(),
            weight,
            title_multiplier: DEFAULT_TITLE_MULTIPLIER,
        }
    }

    /// Lower-case, trim, drop empties and duplicates (first occurrence wins).
    fn normalized(mut self) -> Self {
        let mut seen = std::collections::HashSet::new();
        self.terms = self
            .terms
            .into_iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty() && seen.insert(t.clone()))
            .collect();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CategoryKind {
    Primary,
    Secondary,
    Tertiary,
    Domain,
    Business,
}

impl CategoryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CategoryKind::Primary => "primary",
            CategoryKind::Secondary => "secondary",
            CategoryKind::Tertiary => "tertiary",
            CategoryKind::Domain => "domain",
            CategoryKind::Business => "business",
        }
    }
}

/// Ordered keyword partition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeywordCategories {
    #[serde(default)]
    pub primary: KeywordCategory,
    #[serde(default)]
    pub secondary: KeywordCategory,
    #[serde(default)]
    pub tertiary: KeywordCategory,
    #[serde(default, alias = "technology")]
    pub domain: KeywordCategory,
    #[serde(default)]
    pub business: KeywordCategory,
}

impl KeywordCategories {
    pub fn iter(&self) -> impl Iterator<Item = (CategoryKind, &KeywordCategory)> {
        [
            (CategoryKind::Primary, &self.primary),
            (CategoryKind::Secondary, &self.secondary),
            (CategoryKind::Tertiary, &self.tertiary),
            (CategoryKind::Domain, &self.domain),
            (CategoryKind::Business, &self.business),
        ]
        .into_iter()
    }

    pub fn normalized(self) -> Self {
        Self {
            primary: self.primary.normalized(),
            secondary: self.secondary.normalized(),
            tertiary: self.tertiary.normalized(),
            domain: self.domain.normalized(),
            business: self.business.normalized(),
        }
    }

    /// Weights and multipliers must be finite and non-negative.
    pub fn validate(&self) -> Result<(), String> {
        for (kind, cat) in self.iter() {
            if !cat.weight.is_finite() || cat.weight < 0.0 {
                return Err(format!(
                    "keywords.{}: weight must be >= 0 (got {})",
                    kind.as_str(),
                    cat.weight
                ));
            }
            if !cat.title_multiplier.is_finite() || cat.title_multiplier < 0.0 {
                return Err(format!(
                    "keywords.{}: title_multiplier must be >= 0 (got {})",
                    kind.as_str(),
                    cat.title_multiplier
                ));
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.iter().all(|(_, c)| c.terms.is_empty())
    }

    /// Built-in seed for the AI / agentic-commerce topic.
    pub fn seed() -> Self {
        Self {
            primary: KeywordCategory::new(
                &[
                    "agentic commerce",
                    "ai agent",
                    "autonomous agent",
                    "agentic ai",
                    "ai marketplace",
                ],
                10.0,
            ),
            secondary: KeywordCategory::new(
                &[
                    "artificial intelligence",
                    "machine learning",
                    "llm",
                    "large language model",
                    "generative ai",
                ],
                5.0,
            ),
            tertiary: KeywordCategory::new(&["automation", "chatbot", "copilot", "assistant"], 2.0),
            domain: KeywordCategory::new(&["openai", "anthropic", "gpt", "neural", "transformer"], 1.0),
            business: KeywordCategory::new(
                &["commerce", "e-commerce", "payments", "checkout", "retail", "startup", "funding"],
                1.0,
            ),
        }
        .normalized()
    }
}

/* ----------------------------
Scorer
---------------------------- */

#[derive(Debug, Clone)]
pub struct RelevanceScorer {
    categories: KeywordCategories,
    normalization: f32,
    min_relevance: f32,
}

impl RelevanceScorer {
    /// Non-positive or non-finite normalization falls back to the default.
    pub fn new(categories: KeywordCategories, normalization: f32, min_relevance: f32) -> Self {
        let normalization = if normalization.is_finite() && normalization > 0.0 {
            normalization
        } else {
            DEFAULT_NORMALIZATION
        };
        Self {
            categories: categories.normalized(),
            normalization,
            min_relevance: if min_relevance.is_finite() {
                min_relevance.clamp(0.0, 1.0)
            } else {
                DEFAULT_MIN_RELEVANCE
            },
        }
    }

    pub fn with_defaults(categories: KeywordCategories) -> Self {
        Self::new(categories, DEFAULT_NORMALIZATION, DEFAULT_MIN_RELEVANCE)
    }

    pub fn categories(&self) -> &KeywordCategories {
        &self.categories
    }

    pub fn min_relevance(&self) -> f32 {
        self.min_relevance
    }

    pub fn score(&self, article: &Article) -> Relevance {
        self.score_text(&article.title, &article.excerpt)
    }

    pub fn score_text(&self, title: &str, excerpt: &str) -> Relevance {
        let title = title.to_lowercase();
        let excerpt = excerpt.to_lowercase();

        let mut raw = 0.0f32;
        let mut matched = Vec::new();

        for (kind, cat) in self.categories.iter() {
            for term in &cat.terms {
                // title first; a term never counts twice
                if title.contains(term.as_str()) {
                    raw += cat.weight * cat.title_multiplier;
                    matched.push(format!("{}:title:{}", kind.as_str(), term));
                } else if excerpt.contains(term.as_str()) {
                    raw += cat.weight;
                    matched.push(format!("{}:excerpt:{}", kind.as_str(), term));
                }
            }
        }

        if matched.is_empty() {
            return Relevance::default();
        }

        let score = round3((raw / self.normalization).clamp(0.0, 1.0));
        debug!(target: "relevance", score, raw, matched = ?matched, "scored");
        Relevance { score, matched }
    }

    pub fn passes(&self, score: f32) -> bool {
        score >= self.min_relevance
    }
}

fn round3(x: f32) -> f32 {
    (x * 1000.0).round() / 1000.0
}

/* ----------------------------
Tests
---------------------------- */

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> RelevanceScorer {
        RelevanceScorer::with_defaults(KeywordCategories {
            primary: KeywordCategory::new(&["agentic commerce"], 10.0),
            secondary: KeywordCategory::new(&["llm"], 5.0),
            tertiary: KeywordCategory::new(&["automation"], 2.0),
            ..Default::default()
        })
    }

    #[test]
    fn no_match_is_exactly_zero() {
        let r = scorer().score_text("Weather report for Tuesday", "Sunny with clouds");
        assert_eq!(r.score, 0.0);
        assert!(r.matched.is_empty());
    }

    #[test]
    fn title_beats_excerpt() {
        let s = scorer();
        let in_title = s.score_text("Agentic commerce arrives", "");
        let in_excerpt = s.score_text("Shopping news", "agentic commerce arrives");
        assert!(in_title.score > in_excerpt.score);
        assert_eq!(in_title.score, 0.4);
        assert_eq!(in_excerpt.score, 0.2);
    }

    #[test]
    fn term_in_title_and_excerpt_counts_once() {
        let r = scorer().score_text("Agentic commerce", "agentic commerce everywhere");
        assert_eq!(r.score, 0.4);
        assert_eq!(r.matched, vec!["primary:title:agentic commerce".to_string()]);
    }

    #[test]
    fn every_matching_term_in_a_category_adds() {
        let s = RelevanceScorer::with_defaults(KeywordCategories {
            primary: KeywordCategory::new(&["ai agent", "agentic commerce"], 10.0),
            ..Default::default()
        });
        let r = s.score_text("AI agent powers agentic commerce", "");
        // (10*2 + 10*2) / 50
        assert_eq!(r.score, 0.8);
        assert_eq!(
            r.matched,
            vec![
                "primary:title:ai agent".to_string(),
                "primary:title:agentic commerce".to_string(),
            ]
        );

        let mixed = s.score_text("AI agent news", "a step toward agentic commerce");
        // 10*2 + 10
        assert_eq!(mixed.score, 0.6);
    }

    #[test]
    fn score_is_capped_and_rounded() {
        let s = RelevanceScorer::new(
            KeywordCategories {
                primary: KeywordCategory::new(&["x"], 100.0),
                ..Default::default()
            },
            50.0,
            0.3,
        );
        assert_eq!(s.score_text("x marks", "").score, 1.0);

        let r = scorer().score_text("LLM tools", "automation");
        // (5*2 + 2) / 50
        assert_eq!(r.score, 0.24);
    }

    #[test]
    fn terms_are_lowercased_on_load() {
        let s = RelevanceScorer::with_defaults(KeywordCategories {
            primary: KeywordCategory::new(&["  OpenAI "], 10.0),
            ..Default::default()
        });
        assert_eq!(s.categories().primary.terms, vec!["openai".to_string()]);
        assert!(s.score_text("OPENAI ships", "").score > 0.0);
    }

    #[test]
    fn negative_weight_is_rejected() {
        let cats = KeywordCategories {
            secondary: KeywordCategory::new(&["a"], -1.0),
            ..Default::default()
        };
        assert!(cats.validate().is_err());
        assert!(KeywordCategories::seed().validate().is_ok());
    }

    #[test]
    fn threshold_is_inclusive() {
        let s = scorer();
        assert!(s.passes(0.3));
        assert!(!s.passes(0.299));
    }

    #[test]
    fn technology_alias_maps_to_domain() {
        let cats: KeywordCategories = toml::from_str(
            r#"
            [technology]
            terms = ["gpu"]
            weight = 1.5
            "#,
        )
        .unwrap();
        assert_eq!(cats.domain.terms, vec!["gpu".to_string()]);
        assert_eq!(cats.domain.weight, 1.5);
        assert_eq!(cats.domain.title_multiplier, DEFAULT_TITLE_MULTIPLIER);
    }
}

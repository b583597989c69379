// src/ingest/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a source is fetched and parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchKind {
    /// HTML listing page; article blocks picked with a CSS selector.
    #[serde(alias = "web", alias = "html")]
    Listing,
    /// RSS 2.0 or Atom syndication feed.
    #[serde(alias = "rss", alias = "atom")]
    Feed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTier {
    High,
    #[default]
    Medium,
    Low,
}

/// One configured source. `name` is the unique key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub name: String,
    #[serde(alias = "url")]
    pub endpoint: String,
    #[serde(alias = "type")]
    pub kind: FetchKind,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default, alias = "priority")]
    pub tier: SourceTier,
}

impl SourceDescriptor {
    pub fn listing(name: &str, endpoint: &str, selector: &str) -> Self {
        Self {
            name: name.to_string(),
            endpoint: endpoint.to_string(),
            kind: FetchKind::Listing,
            selector: Some(selector.to_string()),
            tier: SourceTier::default(),
        }
    }

    pub fn feed(name: &str, endpoint: &str) -> Self {
        Self {
            name: name.to_string(),
            endpoint: endpoint.to_string(),
            kind: FetchKind::Feed,
            selector: None,
            tier: SourceTier::default(),
        }
    }

    pub fn with_tier(mut self, tier: SourceTier) -> Self {
        self.tier = tier;
        self
    }
}

/// Result of the paid analysis step for one article.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Analysis {
    #[default]
    Absent,
    Present {
        score: f32,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl Analysis {
    /// Successful analysis; score is clamped to 0..=10.
    pub fn scored(score: f32, text: impl Into<String>) -> Self {
        let score = if score.is_finite() {
            score.clamp(0.0, 10.0)
        } else {
            0.0
        };
        Analysis::Present {
            score,
            text: text.into(),
            error: None,
        }
    }

    /// Degraded analysis: zero score, empty text, cause kept.
    pub fn failed(cause: impl Into<String>) -> Self {
        Analysis::Present {
            score: 0.0,
            text: String::new(),
            error: Some(cause.into()),
        }
    }

    pub fn score(&self) -> Option<f32> {
        match self {
            Analysis::Absent => None,
            Analysis::Present { score, .. } => Some(*score),
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Analysis::Absent => "",
            Analysis::Present { text, .. } => text,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Analysis::Present { error: Some(e), .. } => Some(e),
            _ => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Analysis::Present { .. })
    }
}

/// A normalized article record, independent of the source shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    /// Canonical link; the dedup key.
    pub link: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub content: String,
    pub source: String,
    #[serde(default)]
    pub captured_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub relevance: f32,
    #[serde(default)]
    pub matched_terms: Vec<String>,
    #[serde(default)]
    pub analysis: Analysis,
    #[serde(default)]
    pub priority_score: f32,
    /// 1-based; 0 means not ranked yet.
    #[serde(default)]
    pub priority_rank: u32,
}

impl Article {
    pub fn new(title: &str, link: &str, excerpt: &str, source: &str) -> Self {
        Self {
            title: title.to_string(),
            link: link.to_string(),
            excerpt: excerpt.to_string(),
            content: String::new(),
            source: source.to_string(),
            captured_at: Some(Utc::now()),
            published_at: None,
            relevance: 0.0,
            matched_terms: Vec::new(),
            analysis: Analysis::Absent,
            priority_score: 0.0,
            priority_rank: 0,
        }
    }

    /// Body text for downstream analysis: extracted content, else the excerpt.
    pub fn body(&self) -> &str {
        if self.content.trim().is_empty() {
            &self.excerpt
        } else {
            &self.content
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_analysis_is_zero_and_empty() {
        let a = Analysis::failed("timeout");
        assert_eq!(a.score(), Some(0.0));
        assert_eq!(a.text(), "");
        assert_eq!(a.error(), Some("timeout"));
    }

    #[test]
    fn scored_analysis_clamps() {
        assert_eq!(Analysis::scored(14.0, "x").score(), Some(10.0));
        assert_eq!(Analysis::scored(-1.0, "x").score(), Some(0.0));
        assert_eq!(Analysis::scored(f32::NAN, "x").score(), Some(0.0));
        assert_eq!(Analysis::Absent.score(), None);
    }

    #[test]
    fn descriptor_accepts_legacy_keys() {
        let src: SourceDescriptor = toml::from_str(
            r#"
            name = "TechCrunch"
            url = "https://techcrunch.com/category/artificial-intelligence/"
            type = "web"
            selector = "article"
            priority = "high"
            "#,
        )
        .unwrap();
        assert_eq!(src.kind, FetchKind::Listing);
        assert_eq!(src.tier, SourceTier::High);
        assert_eq!(src.selector.as_deref(), Some("article"));
    }

    #[test]
    fn body_prefers_content() {
        let mut a = Article::new("Title long enough", "https://x/1", "short excerpt", "X");
        assert_eq!(a.body(), "short excerpt");
        a.content = "full body".into();
        assert_eq!(a.body(), "full body");
    }
}

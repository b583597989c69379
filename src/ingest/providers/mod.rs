// src/ingest/providers/mod.rs
//! Turns a raw page or feed body into uniform article candidates.
//! Parsing is pure: no network, no shared state.

pub mod html_listing;
pub mod rss_feed;

use std::fmt;

use crate::ingest::types::{Article, FetchKind, SourceDescriptor};
use crate::ingest::{normalize_text, truncate_chars};

#[derive(Debug, Clone)]
pub struct ParseSettings {
    pub min_title_length: usize,
    pub max_articles_per_source: usize,
    pub max_feed_items: usize,
    pub excerpt_chars: usize,
}

impl Default for ParseSettings {
    fn default() -> Self {
        Self {
            min_title_length: 10,
            max_articles_per_source: 30,
            max_feed_items: 50,
            excerpt_chars: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingTitle,
    MissingLink,
    TitleTooShort { len: usize, min: usize },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingTitle => write!(f, "missing title"),
            SkipReason::MissingLink => write!(f, "missing link"),
            SkipReason::TitleTooShort { len, min } => {
                write!(f, "title too short ({len} < {min} chars)")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Candidate {
    Parsed(Article),
    Skipped(SkipReason),
}

impl Candidate {
    pub fn article(&self) -> Option<&Article> {
        match self {
            Candidate::Parsed(a) => Some(a),
            Candidate::Skipped(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("listing source `{0}` has no selector")]
    MissingSelector(String),
    #[error("invalid selector `{selector}`: {reason}")]
    InvalidSelector { selector: String, reason: String },
    #[error("invalid endpoint `{0}`")]
    InvalidEndpoint(String),
    #[error("malformed feed: {0}")]
    MalformedFeed(String),
}

#[derive(Debug, Clone, Default)]
pub struct ArticleParser {
    settings: ParseSettings,
}

impl ArticleParser {
    pub fn new(settings: ParseSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ParseSettings {
        &self.settings
    }

    pub fn parse(&self, raw: &str, source: &SourceDescriptor) -> Result<Vec<Candidate>, ParseError> {
        match source.kind {
            FetchKind::Listing => html_listing::parse_listing(raw, source, &self.settings),
            FetchKind::Feed => rss_feed::parse_feed(raw, source, &self.settings),
        }
    }
}

/// Shared skip rules: title first, then link, then title length.
pub(crate) fn build_candidate(
    title: Option<&str>,
    link: Option<String>,
    excerpt: &str,
    source: &SourceDescriptor,
    settings: &ParseSettings,
) -> Candidate {
    let title = title.map(normalize_text).unwrap_or_default();
    if title.is_empty() {
        return Candidate::Skipped(SkipReason::MissingTitle);
    }
    let link = match link.map(|l| l.trim().to_string()) {
        Some(l) if !l.is_empty() => l,
        _ => return Candidate::Skipped(SkipReason::MissingLink),
    };
    let len = title.chars().count();
    if len < settings.min_title_length {
        return Candidate::Skipped(SkipReason::TitleTooShort {
            len,
            min: settings.min_title_length,
        });
    }
    let excerpt = truncate_chars(&normalize_text(excerpt), settings.excerpt_chars);
    Candidate::Parsed(Article::new(&title, &link, &excerpt, &source.name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src() -> SourceDescriptor {
        SourceDescriptor::feed("Test", "https://example.com/feed")
    }

    #[test]
    fn skip_rules_in_order() {
        let s = ParseSettings::default();
        assert_eq!(
            build_candidate(None, None, "", &src(), &s),
            Candidate::Skipped(SkipReason::MissingTitle)
        );
        assert_eq!(
            build_candidate(Some("   "), Some("https://x/1".into()), "", &src(), &s),
            Candidate::Skipped(SkipReason::MissingTitle)
        );
        assert_eq!(
            build_candidate(Some("A perfectly fine title"), Some(" ".into()), "", &src(), &s),
            Candidate::Skipped(SkipReason::MissingLink)
        );
        assert_eq!(
            build_candidate(Some("Short"), Some("https://x/1".into()), "", &src(), &s),
            Candidate::Skipped(SkipReason::TitleTooShort { len: 5, min: 10 })
        );
    }

    #[test]
    fn excerpt_is_normalized_and_capped() {
        let s = ParseSettings {
            excerpt_chars: 12,
            ..Default::default()
        };
        let c = build_candidate(
            Some("An &amp; title that is long"),
            Some("https://x/1".into()),
            "<b>Hello</b>   world and more words",
            &src(),
            &s,
        );
        let a = c.article().expect("parsed");
        assert_eq!(a.title, "An & title that is long");
        assert_eq!(a.excerpt, "Hello world");
        assert_eq!(a.source, "Test");
    }
}

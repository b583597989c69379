// src/ingest/providers/rss_feed.rs
use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use super::{build_candidate, Candidate, ParseError, ParseSettings};
use crate::ingest::types::SourceDescriptor;

/* ---- RSS 2.0 ---- */

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

/* ---- Atom ---- */

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<AtomText>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    summary: Option<AtomText>,
    content: Option<AtomText>,
    published: Option<String>,
    updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomText {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: String,
    #[serde(rename = "@rel", default)]
    rel: Option<String>,
}

impl AtomEntry {
    /// `rel="alternate"` (or no rel) is the article itself.
    fn article_link(&self) -> Option<String> {
        self.links
            .iter()
            .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
            .or_else(|| self.links.first())
            .map(|l| l.href.clone())
    }
}

/// HTML named entities are not valid XML; fold the common ones first.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&hellip;", "...")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

/// RFC 2822 (RSS) or RFC 3339 (Atom) → UTC.
pub fn parse_feed_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    let parsed = OffsetDateTime::parse(raw, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(raw, &Rfc3339))
        .ok()?;
    DateTime::<Utc>::from_timestamp(parsed.unix_timestamp(), parsed.nanosecond())
}

/// Parse an RSS 2.0 or Atom document into candidates.
pub fn parse_feed(
    raw: &str,
    source: &SourceDescriptor,
    settings: &ParseSettings,
) -> Result<Vec<Candidate>, ParseError> {
    let xml = scrub_html_entities_for_xml(raw);

    if xml.contains("<rss") {
        let rss: Rss = from_str(&xml).map_err(|e| ParseError::MalformedFeed(e.to_string()))?;
        return Ok(rss
            .channel
            .items
            .into_iter()
            .take(settings.max_feed_items)
            .map(|it| {
                let mut c = build_candidate(
                    it.title.as_deref(),
                    it.link,
                    it.description.as_deref().unwrap_or_default(),
                    source,
                    settings,
                );
                if let Candidate::Parsed(a) = &mut c {
                    a.published_at = it.pub_date.as_deref().and_then(parse_feed_date);
                }
                c
            })
            .collect());
    }

    if xml.contains("<feed") {
        let feed: AtomFeed = from_str(&xml).map_err(|e| ParseError::MalformedFeed(e.to_string()))?;
        return Ok(feed
            .entries
            .into_iter()
            .take(settings.max_feed_items)
            .map(|e| {
                let link = e.article_link();
                let excerpt = e
                    .summary
                    .as_ref()
                    .or(e.content.as_ref())
                    .map(|t| t.value.as_str())
                    .unwrap_or_default();
                let mut c = build_candidate(
                    e.title.as_ref().map(|t| t.value.as_str()),
                    link,
                    excerpt,
                    source,
                    settings,
                );
                if let Candidate::Parsed(a) = &mut c {
                    a.published_at = e
                        .published
                        .as_deref()
                        .or(e.updated.as_deref())
                        .and_then(parse_feed_date);
                }
                c
            })
            .collect());
    }

    Err(ParseError::MalformedFeed(
        "neither an RSS channel nor an Atom feed".into(),
    ))
}

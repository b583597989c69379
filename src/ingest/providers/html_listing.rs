// src/ingest/providers/html_listing.rs
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::{build_candidate, Candidate, ParseError, ParseSettings};
use crate::ingest::types::SourceDescriptor;

static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("h1, h2, h3, a").unwrap());
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static EXCERPT_HOSTS: Lazy<Selector> = Lazy::new(|| Selector::parse("p, div").unwrap());
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());

const EXCERPT_CLASS_HINTS: [&str; 3] = ["excerpt", "description", "summary"];

/// Parse an HTML listing page into candidates, one per selected block.
pub fn parse_listing(
    raw: &str,
    source: &SourceDescriptor,
    settings: &ParseSettings,
) -> Result<Vec<Candidate>, ParseError> {
    let selector_src = source
        .selector
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ParseError::MissingSelector(source.name.clone()))?;
    let blocks = Selector::parse(selector_src).map_err(|e| ParseError::InvalidSelector {
        selector: selector_src.to_string(),
        reason: e.to_string(),
    })?;
    let base =
        Url::parse(&source.endpoint).map_err(|_| ParseError::InvalidEndpoint(source.endpoint.clone()))?;

    let document = Html::parse_document(raw);
    let out = document
        .select(&blocks)
        .take(settings.max_articles_per_source)
        .map(|block| {
            let title = block_title(block);
            let link = block_link(block, &base);
            let excerpt = block_excerpt(block);
            build_candidate(title.as_deref(), link, &excerpt, source, settings)
        })
        .collect();
    Ok(out)
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ")
}

fn block_title(block: ElementRef<'_>) -> Option<String> {
    block
        .select(&TITLE)
        .map(element_text)
        .find(|t| !t.trim().is_empty())
        .or_else(|| {
            // the block may itself be the anchor
            (block.value().name() == "a").then(|| element_text(block))
        })
}

fn block_link(block: ElementRef<'_>, base: &Url) -> Option<String> {
    let href = block
        .select(&LINK)
        .filter_map(|a| a.value().attr("href"))
        .next()
        .or_else(|| block.value().attr("href"))?;
    resolve_link(base, href)
}

/// Resolve against the listing URL; only http(s) survives, fragments dropped.
pub fn resolve_link(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let mut url = base.join(href).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url.to_string())
}

fn block_excerpt(block: ElementRef<'_>) -> String {
    let hinted = block.select(&EXCERPT_HOSTS).find(|el| {
        el.value().attr("class").is_some_and(|class| {
            let class = class.to_ascii_lowercase();
            EXCERPT_CLASS_HINTS.iter().any(|h| class.contains(h))
        })
    });
    hinted
        .or_else(|| block.select(&PARAGRAPH).next())
        .map(element_text)
        .unwrap_or_default()
}

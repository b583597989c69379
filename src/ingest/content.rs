// src/ingest/content.rs
//! Optional full-text harvest for admitted articles.

use std::sync::Arc;

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::ingest::fetcher::SourceFetcher;
use crate::ingest::types::Article;
use crate::ingest::{normalize_text, truncate_chars};

static MAIN: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(
        "article, main, [role=main], div[class*=content], div[class*=article], div[class*=post-body]",
    )
    .unwrap()
});
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());

/// Paragraph text under `nav`, `header`, `footer` or `aside` is page chrome.
fn is_chrome(p: ElementRef<'_>) -> bool {
    p.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| matches!(a.value().name(), "nav" | "header" | "footer" | "aside"))
}

/// Collect paragraph text from the main content container (or the whole
/// page when none is found), capped at `max_chars`.
pub fn extract_main_text(html: &str, max_chars: usize) -> String {
    let doc = Html::parse_document(html);
    let root = doc.select(&MAIN).next().unwrap_or_else(|| doc.root_element());

    let mut out = String::new();
    for p in root.select(&PARAGRAPH).filter(|p| !is_chrome(*p)) {
        let text = normalize_text(&p.text().collect::<Vec<_>>().join(" "));
        if text.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(&text);
        if out.chars().count() >= max_chars {
            break;
        }
    }
    truncate_chars(&out, max_chars)
}

pub struct ContentExtractor {
    fetcher: Arc<SourceFetcher>,
    max_chars: usize,
}

impl ContentExtractor {
    pub fn new(fetcher: Arc<SourceFetcher>, max_chars: usize) -> Self {
        Self { fetcher, max_chars }
    }

    /// Fill `article.content`. Falls back to the excerpt on any failure;
    /// returns whether real page text was extracted.
    pub async fn extract(&self, article: &mut Article) -> bool {
        let page = match self.fetcher.fetch_url(&article.source, &article.link).await {
            Ok(page) => page,
            Err(e) => {
                debug!(target: "ingest", link = %article.link, error = %e, "content fetch failed; keeping excerpt");
                article.content = article.excerpt.clone();
                return false;
            }
        };
        let text = extract_main_text(&page, self.max_chars);
        if text.is_empty() {
            article.content = article.excerpt.clone();
            false
        } else {
            article.content = text;
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_article_container_and_skips_chrome() {
        let html = r#"
            <html><body>
              <nav><p>Home | About</p></nav>
              <p>Sidebar teaser</p>
              <article>
                <header><p>By Staff</p></header>
                <p>First paragraph.</p>
                <p>Second &amp; last.</p>
              </article>
              <script>var x = "<p>not text</p>";</script>
            </body></html>"#;
        assert_eq!(
            extract_main_text(html, 5000),
            "First paragraph.\n\nSecond & last."
        );
    }

    #[test]
    fn falls_back_to_whole_page_and_caps() {
        let html = "<html><body><p>alpha beta gamma</p><p>delta</p></body></html>";
        assert_eq!(extract_main_text(html, 10), "alpha beta");
        assert_eq!(extract_main_text("<html></html>", 100), "");
    }
}

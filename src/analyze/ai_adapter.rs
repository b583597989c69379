//! Analysis collaborator: per-article scoring + post drafting, and batch synthesis.
//!
//! The pipeline only sees the [`Analyzer`] trait. Providers:
//! - [`OpenAiAnalyzer`]: chat-completions call, parses `RELEVANCE_SCORE: n`.
//! - [`MockAnalyzer`]: deterministic, for tests and local runs.
//! - [`DisabledAnalyzer`]: always errors; the engine skips analysis when it sees it.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::ingest::truncate_chars;
use crate::ingest::types::Article;

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

pub const ENV_AI_PROVIDER: &str = "AI_PROVIDER";
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_OPENAI_MODEL: &str = "OPENAI_MODEL";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Score used when the provider's reply has no parsable score line.
pub const DEFAULT_ANALYSIS_SCORE: f32 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutput {
    /// 0..=10
    pub score: f32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    #[error("analysis is disabled")]
    Disabled,
    #[error("missing API key for {0}")]
    MissingApiKey(&'static str),
    #[error("request failed: {0}")]
    Http(String),
    #[error("provider returned HTTP {0}")]
    Status(u16),
    #[error("provider returned an empty reply")]
    EmptyResponse,
    #[error("mock failure for {0}")]
    Mock(String),
}

pub type AnalysisFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, AnalysisError>> + Send + 'a>>;

pub trait Analyzer: Send + Sync {
    /// Score one article (0..=10) and draft its post text.
    fn analyze<'a>(&'a self, article: &'a Article) -> AnalysisFuture<'a, AnalysisOutput>;
    /// One digest over the top articles of a run.
    fn synthesize<'a>(&'a self, articles: &'a [Article]) -> AnalysisFuture<'a, String>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;

    fn is_enabled(&self) -> bool {
        true
    }
}

pub type DynAnalyzer = Arc<dyn Analyzer>;

/// Factory from environment.
///
/// * `AI_PROVIDER=mock` → [`MockAnalyzer`]
/// * `AI_PROVIDER=openai` → [`OpenAiAnalyzer`] (model from `OPENAI_MODEL`)
/// * anything else → [`DisabledAnalyzer`]
pub fn build_analyzer_from_env() -> anyhow::Result<DynAnalyzer> {
    let provider = std::env::var(ENV_AI_PROVIDER)
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let analyzer: DynAnalyzer = match provider.as_str() {
        "mock" => Arc::new(MockAnalyzer::default()),
        "openai" => {
            let model = std::env::var(ENV_OPENAI_MODEL).ok();
            Arc::new(OpenAiAnalyzer::new(model.as_deref())?)
        }
        _ => Arc::new(DisabledAnalyzer),
    };
    tracing::info!(provider = analyzer.provider_name(), "analysis provider selected");
    Ok(analyzer)
}

// ------------------------------------------------------------
// Reply parsing
// ------------------------------------------------------------

static SCORE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)RELEVANCE_SCORE:\s*\[?\s*(-?[0-9]+(?:\.[0-9]+)?)").unwrap());

/// Parse the score line and clamp to 0..=10; default when missing.
pub fn extract_relevance_score(reply: &str) -> f32 {
    SCORE_LINE
        .captures(reply)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f32>().ok())
        .filter(|s| s.is_finite())
        .map(|s| s.clamp(0.0, 10.0))
        .unwrap_or(DEFAULT_ANALYSIS_SCORE)
}

/// Text after the `---` separator; without one, everything but the score line.
pub fn extract_post_text(reply: &str) -> String {
    if let Some((_, post)) = reply.split_once("\n---") {
        return post.trim_start_matches('-').trim().to_string();
    }
    reply
        .lines()
        .filter(|l| !SCORE_LINE.is_match(l))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

// ------------------------------------------------------------
// Providers
// ------------------------------------------------------------

pub struct OpenAiAnalyzer {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiAnalyzer {
    /// `model_override`: e.g. Some("gpt-4o"); defaults to gpt-4o-mini.
    pub fn new(model_override: Option<&str>) -> anyhow::Result<Self> {
        let api_key = std::env::var(ENV_OPENAI_API_KEY).unwrap_or_default();
        let http = reqwest::Client::builder()
            .user_agent(concat!("article-pipeline/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            api_key,
            model: model_override.unwrap_or(DEFAULT_OPENAI_MODEL).to_string(),
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    async fn complete(&self, system: &str, user: &str, max_tokens: u32) -> Result<String, AnalysisError> {
        if self.api_key.is_empty() {
            return Err(AnalysisError::MissingApiKey("openai"));
        }

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: Option<String>,
        }

        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: system,
                },
                Msg {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.7,
            max_tokens,
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| AnalysisError::Http(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(AnalysisError::Status(resp.status().as_u16()));
        }
        let body: Resp = resp
            .json()
            .await
            .map_err(|e| AnalysisError::Http(e.to_string()))?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(AnalysisError::EmptyResponse)
    }
}

const ANALYZE_SYSTEM: &str = "You are a technology news analyst. Rate how relevant the article is to AI agents, agentic commerce and AI marketplaces, then draft a short social post about it.";
const SYNTH_SYSTEM: &str = "You are a technology news editor. Write a concise digest of the most important stories.";

fn analysis_prompt(article: &Article) -> String {
    format!(
        "Title: {}\nSource: {}\nLink: {}\n\n{}\n\nReply exactly in this format:\nRELEVANCE_SCORE: [0-10]\n---\n[post text, under 280 characters, may end with a question and hashtags]",
        article.title,
        article.source,
        article.link,
        truncate_chars(article.body(), 2000)
    )
}

fn synthesis_prompt(articles: &[Article]) -> String {
    let mut out = String::from("Summarize these stories in one short paragraph per story:\n\n");
    for a in articles {
        out.push_str(&format!(
            "{}. {} ({})\n{}\n\n",
            a.priority_rank,
            a.title,
            a.source,
            a.analysis.text()
        ));
    }
    out
}

impl Analyzer for OpenAiAnalyzer {
    fn analyze<'a>(&'a self, article: &'a Article) -> AnalysisFuture<'a, AnalysisOutput> {
        Box::pin(async move {
            let reply = self
                .complete(ANALYZE_SYSTEM, &analysis_prompt(article), 400)
                .await?;
            Ok(AnalysisOutput {
                score: extract_relevance_score(&reply),
                text: extract_post_text(&reply),
            })
        })
    }

    fn synthesize<'a>(&'a self, articles: &'a [Article]) -> AnalysisFuture<'a, String> {
        Box::pin(async move { self.complete(SYNTH_SYSTEM, &synthesis_prompt(articles), 1200).await })
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

/// Always errors with [`AnalysisError::Disabled`].
pub struct DisabledAnalyzer;

impl Analyzer for DisabledAnalyzer {
    fn analyze<'a>(&'a self, _article: &'a Article) -> AnalysisFuture<'a, AnalysisOutput> {
        Box::pin(async { Err(AnalysisError::Disabled) })
    }

    fn synthesize<'a>(&'a self, _articles: &'a [Article]) -> AnalysisFuture<'a, String> {
        Box::pin(async { Err(AnalysisError::Disabled) })
    }

    fn provider_name(&self) -> &'static str {
        "disabled"
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Deterministic analyzer: fixed score, text derived from the title.
/// Links registered with [`MockAnalyzer::fail_for`] return an error.
#[derive(Clone)]
pub struct MockAnalyzer {
    pub score: f32,
    failing: HashSet<String>,
}

impl Default for MockAnalyzer {
    fn default() -> Self {
        Self {
            score: 7.0,
            failing: HashSet::new(),
        }
    }
}

impl MockAnalyzer {
    pub fn with_score(score: f32) -> Self {
        Self {
            score,
            ..Default::default()
        }
    }

    pub fn fail_for(mut self, link: &str) -> Self {
        self.failing.insert(link.to_string());
        self
    }
}

impl Analyzer for MockAnalyzer {
    fn analyze<'a>(&'a self, article: &'a Article) -> AnalysisFuture<'a, AnalysisOutput> {
        let out = if self.failing.contains(&article.link) {
            Err(AnalysisError::Mock(article.link.clone()))
        } else {
            Ok(AnalysisOutput {
                score: self.score,
                text: format!("{} (mock)", article.title),
            })
        };
        Box::pin(async move { out })
    }

    fn synthesize<'a>(&'a self, articles: &'a [Article]) -> AnalysisFuture<'a, String> {
        let out = format!("Digest of {} articles (mock)", articles.len());
        Box::pin(async move { Ok(out) })
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

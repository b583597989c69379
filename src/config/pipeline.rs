// src/config/pipeline.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::analyze::scoring::default_engagement_keywords;
use crate::analyze::PriorityWeights;
use crate::ingest::fetcher::{FetchSettings, DEFAULT_USER_AGENT};
use crate::ingest::providers::ParseSettings;
use crate::ingest::types::{FetchKind, SourceDescriptor, SourceTier};
use crate::ingest::AcquisitionSettings;
use crate::ledger::{default_costs, DEFAULT_DAILY_LIMIT};
use crate::relevance::{KeywordCategories, RelevanceScorer, DEFAULT_MIN_RELEVANCE, DEFAULT_NORMALIZATION};
use crate::source_quality::SourceQualityConfig;

pub const DEFAULT_PIPELINE_CONFIG_PATH: &str = "config/pipeline.toml";

pub const ENV_PIPELINE_CONFIG_PATH: &str = "PIPELINE_CONFIG_PATH";
pub const ENV_DAILY_CREDIT_LIMIT: &str = "DAILY_CREDIT_LIMIT";
pub const ENV_OUTPUT_DIR: &str = "PIPELINE_OUTPUT_DIR";
pub const DEFAULT_KEEP_LAST: usize = 10;

/* ----------------------------
Sections
---------------------------- */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringSection {
    pub normalization: f32,
    pub min_relevance: f32,
    pub min_title_length: usize,
}

impl Default for ScoringSection {
    fn default() -> Self {
        Self {
            normalization: DEFAULT_NORMALIZATION,
            min_relevance: DEFAULT_MIN_RELEVANCE,
            min_title_length: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSection {
    pub user_agent: String,
    pub timeout_secs: u64,
    pub request_delay_ms: u64,
    pub retry_base_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 30,
            request_delay_ms: 1500,
            retry_base_delay_ms: 2000,
            max_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsSection {
    pub max_articles_per_source: usize,
    pub max_feed_items: usize,
    pub max_output_articles: usize,
    pub excerpt_chars: usize,
    pub content_chars: usize,
    /// 0 disables the deadline.
    pub acquisition_deadline_secs: u64,
    pub top_n: usize,
    pub analysis_concurrency: usize,
    pub extract_content: bool,
    /// Articles assumed by the pre-flight estimate.
    pub estimated_articles: u32,
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            max_articles_per_source: 30,
            max_feed_items: 50,
            max_output_articles: 50,
            excerpt_chars: 500,
            content_chars: 5000,
            acquisition_deadline_secs: 300,
            top_n: 10,
            analysis_concurrency: 4,
            extract_content: true,
            estimated_articles: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreditsSection {
    pub daily_limit: f64,
    /// Overrides merged over the built-in cost table.
    pub costs: BTreeMap<String, f64>,
}

impl Default for CreditsSection {
    fn default() -> Self {
        Self {
            daily_limit: DEFAULT_DAILY_LIMIT,
            costs: default_costs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngagementSection {
    pub keywords: Vec<String>,
}

impl Default for EngagementSection {
    fn default() -> Self {
        Self {
            keywords: default_engagement_keywords(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub output_dir: PathBuf,
    /// Runs kept on disk; older ones are pruned after each save. Unset keeps all.
    pub keep_last: Option<usize>,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            keep_last: Some(DEFAULT_KEEP_LAST),
        }
    }
}

/* ----------------------------
Root
---------------------------- */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub sources: Vec<SourceDescriptor>,
    #[serde(default)]
    pub keywords: KeywordCategories,
    #[serde(default)]
    pub scoring: ScoringSection,
    #[serde(default)]
    pub fetch: FetchSection,
    #[serde(default)]
    pub limits: LimitsSection,
    #[serde(default)]
    pub credits: CreditsSection,
    #[serde(default)]
    pub priority_weights: PriorityWeights,
    #[serde(default)]
    pub source_quality: SourceQualityConfig,
    #[serde(default)]
    pub engagement: EngagementSection,
    #[serde(default)]
    pub storage: StorageSection,
}

impl PipelineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: PipelineConfig = toml::from_str(s).context("parsing pipeline config")?;
        cfg.keywords = cfg.keywords.normalized();
        cfg.source_quality = cfg.source_quality.normalized();
        // file entries override built-in costs, unlisted actions keep theirs
        let mut costs = default_costs();
        costs.extend(std::mem::take(&mut cfg.credits.costs));
        cfg.credits.costs = costs;
        Ok(cfg)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config from {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("in {}", path.display()))
    }

    /// Load using env var + fallbacks, then apply env overrides and validate:
    /// 1) $PIPELINE_CONFIG_PATH (must exist)
    /// 2) config/pipeline.toml
    /// 3) built-in seed
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_PIPELINE_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!(
                    "{ENV_PIPELINE_CONFIG_PATH} points to non-existent path {}",
                    pb.display()
                ));
            }
            Self::load_from_file(&pb)?
        } else {
            let default_path = Path::new(DEFAULT_PIPELINE_CONFIG_PATH);
            if default_path.exists() {
                Self::load_from_file(default_path)?
            } else {
                tracing::info!("no pipeline config found; using built-in seed");
                Self::seed()
            }
        };
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(raw) = std::env::var(ENV_DAILY_CREDIT_LIMIT) {
            let limit: f64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_DAILY_CREDIT_LIMIT} must be a number (got {raw:?})"))?;
            self.credits.daily_limit = limit;
        }
        if let Ok(dir) = std::env::var(ENV_OUTPUT_DIR) {
            if !dir.trim().is_empty() {
                self.storage.output_dir = PathBuf::from(dir.trim());
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            bail!("no sources configured");
        }
        let mut names = HashSet::new();
        for s in &self.sources {
            if s.name.trim().is_empty() {
                bail!("source with endpoint {} has an empty name", s.endpoint);
            }
            if !names.insert(s.name.as_str()) {
                bail!("duplicate source name `{}`", s.name);
            }
            Url::parse(&s.endpoint)
                .with_context(|| format!("source `{}`: invalid endpoint `{}`", s.name, s.endpoint))?;
            if s.kind == FetchKind::Listing
                && s.selector.as_deref().map_or(true, |sel| sel.trim().is_empty())
            {
                bail!("listing source `{}` needs a selector", s.name);
            }
        }
        self.keywords.validate().map_err(|e| anyhow!(e))?;
        self.priority_weights.validate().map_err(|e| anyhow!(e))?;
        self.source_quality.validate().map_err(|e| anyhow!(e))?;
        if !self.credits.daily_limit.is_finite() || self.credits.daily_limit < 0.0 {
            bail!("credits.daily_limit must be >= 0");
        }
        if let Some((k, _)) = self.credits.costs.iter().find(|(_, v)| !v.is_finite() || **v < 0.0) {
            bail!("credits.costs.{k} must be >= 0");
        }
        if !self.scoring.normalization.is_finite() || self.scoring.normalization <= 0.0 {
            bail!("scoring.normalization must be > 0");
        }
        if !(0.0..=1.0).contains(&self.scoring.min_relevance) {
            bail!("scoring.min_relevance must be within 0..=1");
        }
        if self.storage.keep_last == Some(0) {
            bail!("storage.keep_last must be >= 1 (omit it to keep every run)");
        }
        Ok(())
    }

    /* ---- projections into component settings ---- */

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            user_agent: self.fetch.user_agent.clone(),
            timeout: Duration::from_secs(self.fetch.timeout_secs.max(1)),
            request_delay: Duration::from_millis(self.fetch.request_delay_ms),
            retry_base_delay: Duration::from_millis(self.fetch.retry_base_delay_ms),
            max_attempts: self.fetch.max_attempts.max(1),
        }
    }

    pub fn parse_settings(&self) -> ParseSettings {
        ParseSettings {
            min_title_length: self.scoring.min_title_length,
            max_articles_per_source: self.limits.max_articles_per_source,
            max_feed_items: self.limits.max_feed_items,
            excerpt_chars: self.limits.excerpt_chars,
        }
    }

    pub fn acquisition_settings(&self) -> AcquisitionSettings {
        AcquisitionSettings {
            max_output_articles: self.limits.max_output_articles,
            deadline: match self.limits.acquisition_deadline_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }

    pub fn scorer(&self) -> RelevanceScorer {
        RelevanceScorer::new(
            self.keywords.clone(),
            self.scoring.normalization,
            self.scoring.min_relevance,
        )
    }

    /// Built-in configuration used when no file is present.
    pub fn seed() -> Self {
        Self {
            topic: "AI agents and agentic commerce".to_string(),
            sources: vec![
                SourceDescriptor::listing(
                    "TechCrunch",
                    "https://techcrunch.com/category/artificial-intelligence/",
                    "article, div.post-block, li.wp-block-post",
                )
                .with_tier(SourceTier::High),
                SourceDescriptor::feed("VentureBeat AI", "https://venturebeat.com/category/ai/feed/")
                    .with_tier(SourceTier::High),
                SourceDescriptor::feed(
                    "MIT Technology Review",
                    "https://www.technologyreview.com/topic/artificial-intelligence/feed",
                )
                .with_tier(SourceTier::High),
                SourceDescriptor::feed("The Verge", "https://www.theverge.com/rss/ai-artificial-intelligence/index.xml"),
                SourceDescriptor::feed("Wired", "https://www.wired.com/feed/tag/ai/latest/rss"),
            ],
            keywords: KeywordCategories::seed(),
            scoring: ScoringSection::default(),
            fetch: FetchSection::default(),
            limits: LimitsSection::default(),
            credits: CreditsSection::default(),
            priority_weights: PriorityWeights::default(),
            source_quality: SourceQualityConfig::default_seed(),
            engagement: EngagementSection::default(),
            storage: StorageSection::default(),
        }
    }
}

// src/storage.rs
//! Append-only run output: one JSON file, one combined text digest and one
//! text file per ranked post for every run.
//!
//! Layout under the output root:
//! - `json/posts_<ts>_<id>.json`
//! - `combined/posts_<ts>_<id>.txt`
//! - `text/batch_<ts>_<id>/NN_<slug>.txt`
//!
//! Files are written to a temp name and renamed into place. With a retention
//! of `keep_last`, older runs are pruned after each save.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::analyze::rank::PriorityTier;
use crate::ingest::types::Article;

/// Flat projection of one ranked article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPost {
    pub rank: u32,
    pub title: String,
    pub source: String,
    pub link: String,
    /// Two decimals.
    pub priority_score: f32,
    /// Analysis score, 0..=10 (0 when not analyzed).
    pub relevance_score: f32,
    pub text: String,
    pub tier: PriorityTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_error: Option<String>,
}

impl StoredPost {
    pub fn from_article(a: &Article) -> Self {
        Self {
            rank: a.priority_rank,
            title: a.title.clone(),
            source: a.source.clone(),
            link: a.link.clone(),
            priority_score: (a.priority_score * 100.0).round() / 100.0,
            relevance_score: a.analysis.score().unwrap_or(0.0),
            text: a.analysis.text().to_string(),
            tier: PriorityTier::for_score(a.priority_score),
            analysis_error: a.analysis.error().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub articles_acquired: usize,
    pub articles_analyzed: usize,
    pub total_cost: f64,
    pub remaining_balance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredArtifacts {
    pub run_id: String,
    pub json_file: PathBuf,
    pub combined_text_file: PathBuf,
    /// One per post, in rank order.
    #[serde(default)]
    pub text_files: Vec<PathBuf>,
}

/// Shape of the JSON run file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRun {
    pub generated_at: DateTime<Utc>,
    pub metadata: RunMetadata,
    pub total_posts: usize,
    pub posts: Vec<StoredPost>,
}

#[async_trait]
pub trait PostStore: Send + Sync {
    async fn save(&self, posts: &[StoredPost], meta: &RunMetadata) -> Result<StoredArtifacts>;

    /// Previously written run files, newest first.
    async fn list_runs(&self) -> Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }

    /// Most recent saved run, if any.
    async fn latest_run(&self) -> Result<Option<StoredRun>> {
        Ok(None)
    }
}

pub struct FileStore {
    root: PathBuf,
    keep_last: Option<usize>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            keep_last: None,
        }
    }

    /// Keep only the newest `keep_last` runs after each save; `None` keeps all.
    pub fn with_retention(mut self, keep_last: Option<usize>) -> Self {
        self.keep_last = keep_last.filter(|n| *n > 0);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn load_run(path: &Path) -> Result<StoredRun> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading run file {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing run file {}", path.display()))
    }
}

async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, contents)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("renaming into {}", path.display()))?;
    Ok(())
}

/// Filename-safe slug: lower-case, spaces to `_`, only `[a-z0-9_-]`, at most 50 chars.
pub fn slugify(title: &str) -> String {
    title
        .trim()
        .to_lowercase()
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-')
        .take(50)
        .collect()
}

/// Standalone text for one ranked post.
pub fn render_post(post: &StoredPost) -> String {
    let rule = "-".repeat(40);
    let body = if post.text.is_empty() {
        "(no post text)"
    } else {
        post.text.as_str()
    };
    format!(
        "POST #{}\n\nTitle: {}\nSource: {}\nLink: {}\nPriority Score: {:.2}/100\nRelevance Score: {:.1}/10\n\n{rule}\n{body}\n{rule}\n",
        post.rank, post.title, post.source, post.link, post.priority_score, post.relevance_score
    )
}

/// Entries of `dir` whose file name starts with `prefix`, newest first.
/// Names embed the run timestamp, so name order is chronological.
async fn entries_newest_first(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let mut rd = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("listing {}", dir.display())),
    };
    let mut out = Vec::new();
    while let Some(entry) = rd.next_entry().await? {
        let path = entry.path();
        let keep = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(prefix) && !n.ends_with(".tmp"));
        if keep {
            out.push(path);
        }
    }
    out.sort();
    out.reverse();
    Ok(out)
}

/// Human-readable digest of one run.
pub fn render_combined(posts: &[StoredPost], meta: &RunMetadata) -> String {
    let rule = "=".repeat(72);
    let mut out = String::new();
    out.push_str(&format!("{rule}\nRUN {}\n{rule}\n", meta.run_id));
    out.push_str(&format!("Started:   {}\n", meta.started_at.to_rfc3339()));
    out.push_str(&format!("Duration:  {:.1}s\n", meta.duration_secs));
    out.push_str(&format!(
        "Articles:  {} acquired, {} analyzed\n",
        meta.articles_acquired, meta.articles_analyzed
    ));
    out.push_str(&format!(
        "Credits:   {:.1} spent, {:.1} remaining\n\n",
        meta.total_cost, meta.remaining_balance
    ));
    if let Some(summary) = &meta.summary {
        out.push_str(&format!("SUMMARY\n{summary}\n\n"));
    }
    for p in posts {
        out.push_str(&format!("#{} {}\n", p.rank, p.title));
        out.push_str(&format!(
            "Source: {} | Priority: {:.2} ({:?}) | Relevance: {:.1}\n",
            p.source, p.priority_score, p.tier, p.relevance_score
        ));
        out.push_str(&format!("Link: {}\n", p.link));
        if !p.text.is_empty() {
            out.push_str(&format!("\n{}\n", p.text));
        }
        out.push_str(&format!("{}\n", "-".repeat(72)));
    }
    out
}

#[async_trait]
impl PostStore for FileStore {
    async fn save(&self, posts: &[StoredPost], meta: &RunMetadata) -> Result<StoredArtifacts> {
        let json_dir = self.root.join("json");
        let combined_dir = self.root.join("combined");
        for dir in [&json_dir, &combined_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating {}", dir.display()))?;
        }

        let tag = format!("{}_{}", meta.started_at.format("%Y-%m-%d_%H-%M-%S"), meta.run_id);
        let stem = format!("posts_{tag}");
        let json_file = json_dir.join(format!("{stem}.json"));
        let combined_text_file = combined_dir.join(format!("{stem}.txt"));

        let run = StoredRun {
            generated_at: Utc::now(),
            metadata: meta.clone(),
            total_posts: posts.len(),
            posts: posts.to_vec(),
        };
        let json = serde_json::to_vec_pretty(&run).context("serializing run")?;
        write_atomic(&json_file, &json).await?;
        write_atomic(&combined_text_file, render_combined(posts, meta).as_bytes()).await?;

        let batch_dir = self.root.join("text").join(format!("batch_{tag}"));
        tokio::fs::create_dir_all(&batch_dir)
            .await
            .with_context(|| format!("creating {}", batch_dir.display()))?;
        let mut text_files = Vec::with_capacity(posts.len());
        for (i, p) in posts.iter().enumerate() {
            let slug = match slugify(&p.title) {
                s if s.is_empty() => format!("post_{}", i + 1),
                s => s,
            };
            let path = batch_dir.join(format!("{:02}_{slug}.txt", i + 1));
            write_atomic(&path, render_post(p).as_bytes()).await?;
            text_files.push(path);
        }

        info!(target: "storage", run_id = %meta.run_id, posts = posts.len(), file = %json_file.display(), "run saved");

        if let Some(keep) = self.keep_last {
            // a pruning failure does not fail the save
            if let Err(e) = self.prune(keep).await {
                warn!(target: "storage", error = ?e, keep, "pruning old runs failed");
            }
        }

        Ok(StoredArtifacts {
            run_id: meta.run_id.clone(),
            json_file,
            combined_text_file,
            text_files,
        })
    }

    async fn list_runs(&self) -> Result<Vec<PathBuf>> {
        let mut runs = entries_newest_first(&self.root.join("json"), "posts_").await?;
        runs.retain(|p| p.extension().is_some_and(|e| e == "json"));
        Ok(runs)
    }

    async fn latest_run(&self) -> Result<Option<StoredRun>> {
        match self.list_runs().await?.first() {
            Some(path) => Ok(Some(Self::load_run(path).await?)),
            None => Ok(None),
        }
    }
}

impl FileStore {
    /// Delete everything but the newest `keep_last` runs in each output
    /// directory. Returns how many entries were removed.
    pub async fn prune(&self, keep_last: usize) -> Result<usize> {
        let mut removed = 0;
        for (dir, prefix) in [("json", "posts_"), ("combined", "posts_"), ("text", "batch_")] {
            let entries = entries_newest_first(&self.root.join(dir), prefix).await?;
            for old in entries.into_iter().skip(keep_last) {
                let is_dir = tokio::fs::metadata(&old)
                    .await
                    .with_context(|| format!("inspecting {}", old.display()))?
                    .is_dir();
                let res = if is_dir {
                    tokio::fs::remove_dir_all(&old).await
                } else {
                    tokio::fs::remove_file(&old).await
                };
                res.with_context(|| format!("removing {}", old.display()))?;
                removed += 1;
            }
        }
        if removed > 0 {
            info!(target: "storage", removed, keep_last, "old runs pruned");
        }
        Ok(removed)
    }
}

/// Short hex id from a SHA-256 over `text`.
pub fn short_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

//! # Source Quality
//!
//! Maps publication names (e.g. "TechCrunch", "MIT Technology Review") to a
//! quality score on a `0.0..=10.0` scale, used as one factor of the
//! priority composite.
//!
//! - Case-insensitive lookup with normalization of punctuation and dashes.
//! - Aliases map alternative spellings to canonical names.
//! - Fallback order: aliases → exact match → longest substring match → default.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_SOURCE_QUALITY: f32 = 7.0;

fn default_quality() -> f32 {
    DEFAULT_SOURCE_QUALITY
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceQualityConfig {
    /// Score used when nothing matches.
    #[serde(default = "default_quality")]
    pub default: f32,
    /// Canonical source name → score.
    #[serde(default)]
    pub scores: HashMap<String, f32>,
    /// Non-canonical name → canonical name.
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

impl Default for SourceQualityConfig {
    fn default() -> Self {
        Self::default_seed()
    }
}

impl SourceQualityConfig {
    /// Re-key both maps in normalized form so config files may use any casing.
    pub fn normalized(self) -> Self {
        Self {
            default: self.default,
            scores: self
                .scores
                .into_iter()
                .map(|(k, v)| (normalize(&k), v))
                .collect(),
            aliases: self
                .aliases
                .into_iter()
                .map(|(k, v)| (normalize(&k), normalize(&v)))
                .collect(),
        }
    }

    pub fn quality_for(&self, source: &str) -> f32 {
        let s = normalize(source);

        if let Some(canon) = self.aliases.get(&s) {
            if let Some(&q) = self.scores.get(canon) {
                return clamp10(q);
            }
        }

        if let Some(&q) = self.scores.get(&s) {
            return clamp10(q);
        }

        // Longest key wins so "mit technology review" beats "technology".
        let hit = self
            .scores
            .iter()
            .filter(|(k, _)| !k.is_empty() && s.contains(k.as_str()))
            .max_by_key(|(k, _)| k.len());
        if let Some((_, &q)) = hit {
            return clamp10(q);
        }

        clamp10(self.default)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.default.is_finite() {
            return Err("source_quality.default must be finite".into());
        }
        if let Some((k, _)) = self.scores.iter().find(|(_, v)| !v.is_finite()) {
            return Err(format!("source_quality.scores.{k} must be finite"));
        }
        Ok(())
    }

    /// Built-in table of common technology publications.
    pub fn default_seed() -> Self {
        let scores = [
            ("mit technology review", 10.0),
            ("techcrunch", 9.0),
            ("venturebeat ai", 8.5),
            ("wired", 8.5),
            ("the verge", 8.0),
            ("ars technica", 8.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let aliases = [
            ("technology review", "mit technology review"),
            ("mit tech review", "mit technology review"),
            ("venturebeat", "venturebeat ai"),
            ("tc", "techcrunch"),
            ("verge", "the verge"),
            ("ars", "ars technica"),
        ]
        .into_iter()
        .map(|(a, c)| (a.to_string(), c.to_string()))
        .collect();

        Self {
            default: DEFAULT_SOURCE_QUALITY,
            scores,
            aliases,
        }
    }
}

/// Lowercase, replace punctuation/dashes with spaces, collapse spaces.
fn normalize(s: &str) -> String {
    let mut out = s.trim().to_lowercase();
    for ch in ['—', '–', '-', '_', '/', '\\'] {
        out = out.replace(ch, " ");
    }
    out = out.replace(['\n', '\r', '\t', '.', ',', '’', '\''], " ");
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn clamp10(x: f32) -> f32 {
    if x.is_finite() {
        x.clamp(0.0, 10.0)
    } else {
        DEFAULT_SOURCE_QUALITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> SourceQualityConfig {
        SourceQualityConfig::default_seed()
    }

    #[test]
    fn exact_and_case_insensitive() {
        let c = cfg();
        assert_eq!(c.quality_for("TechCrunch"), 9.0);
        assert_eq!(c.quality_for("TECHCRUNCH"), 9.0);
    }

    #[test]
    fn alias_match() {
        let c = cfg();
        assert_eq!(c.quality_for("VentureBeat"), 8.5);
        assert_eq!(c.quality_for("MIT Tech-Review"), 10.0);
    }

    #[test]
    fn substring_prefers_longest_key() {
        let c = cfg();
        assert_eq!(c.quality_for("MIT Technology Review — AI section"), 10.0);
        assert_eq!(c.quality_for("Wired UK"), 8.5);
    }

    #[test]
    fn unknown_uses_default() {
        assert_eq!(cfg().quality_for("Some Blog"), DEFAULT_SOURCE_QUALITY);
    }

    #[test]
    fn config_keys_are_normalized() {
        let c: SourceQualityConfig = toml::from_str(
            r#"
            default = 6.0
            [scores]
            "Hacker News" = 7.5
            [aliases]
            "HN" = "Hacker News"
            "#,
        )
        .unwrap();
        let c = c.normalized();
        assert_eq!(c.quality_for("hacker-news"), 7.5);
        assert_eq!(c.quality_for("hn"), 7.5);
        assert_eq!(c.quality_for("elsewhere"), 6.0);
    }

    #[test]
    fn out_of_range_is_clamped() {
        let mut c = cfg();
        c.scores.insert("loud".into(), 42.0);
        assert_eq!(c.quality_for("Loud"), 10.0);
    }
}

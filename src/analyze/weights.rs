//! Factor weights for the priority composite.
//!
//! TOML shape (`[priority_weights]`):
//! ```toml
//! relevance = 0.5
//! recency = 0.25
//! source_quality = 0.15
//! engagement = 0.10
//! ```

use serde::{Deserialize, Serialize};

/// Allowed drift of the weight sum from 1.0 (decimal TOML values rarely add exactly).
pub const SUM_TOLERANCE: f32 = 1e-3;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityWeights {
    pub relevance: f32,
    pub recency: f32,
    pub source_quality: f32,
    pub engagement: f32,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            relevance: 0.5,
            recency: 0.25,
            source_quality: 0.15,
            engagement: 0.10,
        }
    }
}

impl PriorityWeights {
    pub fn sum(&self) -> f32 {
        self.relevance + self.recency + self.source_quality + self.engagement
    }

    /// Every weight is finite and non-negative, and together they sum to 1.0.
    pub fn validate(&self) -> Result<(), String> {
        for (name, w) in [
            ("relevance", self.relevance),
            ("recency", self.recency),
            ("source_quality", self.source_quality),
            ("engagement", self.engagement),
        ] {
            if !w.is_finite() || w < 0.0 {
                return Err(format!("priority_weights.{name} must be >= 0 (got {w})"));
            }
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > SUM_TOLERANCE {
            return Err(format!("priority_weights must sum to 1.0 (got {sum:.3})"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_sum_to_one() {
        assert!((PriorityWeights::default().sum() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let w: PriorityWeights = toml::from_str("engagement = 0.3\nrelevance = 0.3").unwrap();
        assert_eq!(w.engagement, 0.3);
        assert_eq!(w.relevance, 0.3);
        assert_eq!(w.recency, 0.25);
        assert!(w.validate().is_ok());
    }

    #[test]
    fn weights_must_sum_to_one() {
        let over = PriorityWeights {
            engagement: 0.3,
            ..Default::default()
        };
        let err = over.validate().unwrap_err();
        assert!(err.contains("sum to 1.0"), "{err}");

        let under = PriorityWeights {
            relevance: 0.2,
            ..Default::default()
        };
        assert!(under.validate().is_err());

        // 0.1 + 0.2 style float drift stays inside the tolerance
        let drift = PriorityWeights {
            relevance: 0.1 + 0.2 + 0.2,
            ..Default::default()
        };
        assert!(drift.validate().is_ok());
    }

    #[test]
    fn negative_weight_rejected() {
        let w = PriorityWeights {
            recency: -0.1,
            ..Default::default()
        };
        assert!(w.validate().is_err());
    }
}

//! Weighted-sum scoring across four modes.
//!
//! `score(mode, file) = 100 * sum(w(mode, c) * normalized(c, file))`, with a
//! 0.6 attenuation for files matching test/config conventions. Breakdowns
//! report each channel's share of the pre-attenuation score as a percentage,
//! so they sum to 100 regardless of the debuff.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::metrics::FileMetrics;
use crate::normalize::{Channel, Normalizer};

/// Attenuation applied to the final score of test/config files.
pub const DEBUFF_FACTOR: f64 = 0.6;

/// Tolerance when validating that a weight map sums to 1.0.
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.001;

/// Scoring modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreMode {
    /// Recent volatility: change frequency and churn.
    Hot,
    /// Knowledge concentration: few owners, uneven contribution.
    Risk,
    /// Accumulated debt: old, large, churned-but-quiet files.
    Complexity,
    /// Neglect of important files.
    Stale,
}

impl ScoreMode {
    pub const ALL: [ScoreMode; 4] = [
        ScoreMode::Hot,
        ScoreMode::Risk,
        ScoreMode::Complexity,
        ScoreMode::Stale,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreMode::Hot => "hot",
            ScoreMode::Risk => "risk",
            ScoreMode::Complexity => "complexity",
            ScoreMode::Stale => "stale",
        }
    }

    pub fn parse(name: &str) -> Option<ScoreMode> {
        ScoreMode::ALL.iter().copied().find(|m| m.as_str() == name)
    }
}

impl fmt::Display for ScoreMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Channel weights for one mode.
pub type WeightMap = BTreeMap<Channel, f64>;

/// Weights for all four modes; defaults unless replaced from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeWeights {
    weights: BTreeMap<ScoreMode, WeightMap>,
}

impl Default for ModeWeights {
    fn default() -> Self {
        let mut weights = BTreeMap::new();
        weights.insert(
            ScoreMode::Hot,
            BTreeMap::from([
                (Channel::Commits, 0.40),
                (Channel::Churn, 0.40),
                (Channel::Contrib, 0.05),
                (Channel::Size, 0.05),
                (Channel::Age, 0.10),
            ]),
        );
        weights.insert(
            ScoreMode::Risk,
            BTreeMap::from([
                (Channel::InvContrib, 0.30),
                (Channel::Gini, 0.26),
                (Channel::Age, 0.16),
                (Channel::Churn, 0.06),
                (Channel::Commits, 0.04),
                (Channel::Loc, 0.06),
                (Channel::Size, 0.12),
            ]),
        );
        weights.insert(
            ScoreMode::Complexity,
            BTreeMap::from([
                (Channel::Age, 0.30),
                (Channel::Churn, 0.30),
                (Channel::Commits, 0.10),
                (Channel::Loc, 0.20),
                (Channel::LowRecent, 0.05),
                (Channel::Size, 0.05),
            ]),
        );
        weights.insert(
            ScoreMode::Stale,
            BTreeMap::from([
                (Channel::InvRecent, 0.35),
                (Channel::Age, 0.20),
                (Channel::Size, 0.25),
                (Channel::Commits, 0.15),
                (Channel::Contrib, 0.05),
            ]),
        );
        ModeWeights { weights }
    }
}

impl ModeWeights {
    /// Replace one mode's weights with a custom map.
    ///
    /// The map must sum to 1.0 within the tolerance; weights must be
    /// non-negative. Fails at load time, never mid-analysis.
    pub fn override_mode(&mut self, mode: ScoreMode, map: WeightMap) -> Result<()> {
        validate_weight_map(mode, &map)?;
        self.weights.insert(mode, map);
        Ok(())
    }

    pub fn for_mode(&self, mode: ScoreMode) -> &WeightMap {
        &self.weights[&mode]
    }
}

fn validate_weight_map(mode: ScoreMode, map: &WeightMap) -> Result<()> {
    if map.is_empty() {
        return Err(CoreError::Config(format!("weights.{} must not be empty", mode)).into());
    }
    for (channel, &weight) in map {
        if weight < 0.0 {
            return Err(CoreError::Config(format!(
                "weights.{}.{} must be non-negative (got {})",
                mode, channel, weight
            ))
            .into());
        }
    }
    let sum: f64 = map.values().sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(CoreError::Config(format!(
            "weights.{} must sum to 1.0 +/- {} (got {:.4})",
            mode, WEIGHT_SUM_TOLERANCE, sum
        ))
        .into());
    }
    Ok(())
}

/// All four scores and breakdowns for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileScores {
    /// Final scores per mode, post-attenuation, in [0, 100].
    pub scores: BTreeMap<ScoreMode, f64>,
    /// Per-channel contribution as a percentage of the pre-attenuation
    /// score; sums to 100 per mode (all zeros for a zero score).
    pub breakdowns: BTreeMap<ScoreMode, BTreeMap<Channel, f64>>,
    pub debuffed: bool,
}

/// Score one file across all modes.
pub fn score_file(metrics: &FileMetrics, normalizer: &Normalizer, weights: &ModeWeights) -> FileScores {
    let debuffed = is_debuffed(&metrics.path);
    let mut scores = BTreeMap::new();
    let mut breakdowns = BTreeMap::new();

    for mode in ScoreMode::ALL {
        let map = weights.for_mode(mode);
        let mut contributions: BTreeMap<Channel, f64> = BTreeMap::new();
        let mut raw = 0.0;
        for (&channel, &weight) in map {
            let contribution = weight * normalizer.value(metrics, channel);
            contributions.insert(channel, contribution);
            raw += contribution;
        }

        let breakdown: BTreeMap<Channel, f64> = contributions
            .into_iter()
            .map(|(channel, contribution)| {
                let pct = if raw > 0.0 {
                    100.0 * contribution / raw
                } else {
                    0.0
                };
                (channel, pct)
            })
            .collect();

        let mut score = 100.0 * raw;
        if debuffed {
            score *= DEBUFF_FACTOR;
        }
        scores.insert(mode, score.clamp(0.0, 100.0));
        breakdowns.insert(mode, breakdown);
    }

    FileScores {
        scores,
        breakdowns,
        debuffed,
    }
}

static DEBUFF_BASENAMES: OnceLock<GlobSet> = OnceLock::new();

fn debuff_basenames() -> &'static GlobSet {
    DEBUFF_BASENAMES.get_or_init(|| {
        let mut builder = GlobSetBuilder::new();
        for pattern in [
            "*_test.*",
            "*.config.*",
            "*.lock",
            "*.yaml",
            "*.yml",
            "*.toml",
            "Makefile",
        ] {
            builder.add(Glob::new(pattern).expect("static debuff glob must compile"));
        }
        builder.build().expect("static debuff globset must build")
    })
}

/// True when the path matches common test/config conventions.
pub fn is_debuffed(path: &str) -> bool {
    if path.starts_with("test/")
        || path.starts_with("tests/")
        || path.contains("/test/")
        || path.contains("/tests/")
    {
        return true;
    }
    let basename = path.rsplit('/').next().unwrap_or(path);
    debuff_basenames().is_match(basename)
}

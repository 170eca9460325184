//! Per-batch normalization of raw metrics into [0, 1] channels.
//!
//! Unbounded non-negative channels use `log1p(x) / log1p(batch_max)` so one
//! extreme outlier cannot collapse every other score toward zero. Bounded
//! channels (gini) pass through. Inverse channels are complements of their
//! base channel. Scores are therefore comparable within a run but not across
//! runs with different windows; the comparator rescores both sides over
//! shared maxima.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::metrics::FileMetrics;

/// Scoring channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Commits,
    Churn,
    Contrib,
    Loc,
    Size,
    Age,
    Gini,
    /// 1 - normalized unique contributor count (knowledge concentration).
    InvContrib,
    /// 1 - normalized recent commits (neglect).
    InvRecent,
    /// 1 - normalized recent churn (dormant weight).
    LowRecent,
}

impl Channel {
    pub const ALL: [Channel; 10] = [
        Channel::Commits,
        Channel::Churn,
        Channel::Contrib,
        Channel::Loc,
        Channel::Size,
        Channel::Age,
        Channel::Gini,
        Channel::InvContrib,
        Channel::InvRecent,
        Channel::LowRecent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Commits => "commits",
            Channel::Churn => "churn",
            Channel::Contrib => "contrib",
            Channel::Loc => "loc",
            Channel::Size => "size",
            Channel::Age => "age",
            Channel::Gini => "gini",
            Channel::InvContrib => "inv_contrib",
            Channel::InvRecent => "inv_recent",
            Channel::LowRecent => "low_recent",
        }
    }

    pub fn parse(name: &str) -> Option<Channel> {
        Channel::ALL.iter().copied().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-channel batch maxima, recorded alongside every analysis so a later
/// run (comparison, shared-normalization mode) can reproduce the scale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelMaxima {
    pub commits: u64,
    pub churn: u64,
    pub contrib: u64,
    pub loc: u64,
    pub size: u64,
    pub age: u64,
    pub recent_commits: u64,
    pub recent_churn: u64,
}

impl ChannelMaxima {
    pub fn from_batch(batch: &[FileMetrics]) -> Self {
        let mut maxima = ChannelMaxima::default();
        for m in batch {
            maxima.commits = maxima.commits.max(m.commits);
            maxima.churn = maxima.churn.max(m.churn);
            maxima.contrib = maxima.contrib.max(m.unique_contributors);
            maxima.loc = maxima.loc.max(m.lines_of_code);
            maxima.size = maxima.size.max(m.size_bytes);
            maxima.age = maxima.age.max(m.age_days);
            maxima.recent_commits = maxima.recent_commits.max(m.recent_commits);
            maxima.recent_churn = maxima.recent_churn.max(m.recent_churn);
        }
        maxima
    }

    /// Component-wise maximum; used to put two batches on one scale.
    pub fn union(&self, other: &ChannelMaxima) -> ChannelMaxima {
        ChannelMaxima {
            commits: self.commits.max(other.commits),
            churn: self.churn.max(other.churn),
            contrib: self.contrib.max(other.contrib),
            loc: self.loc.max(other.loc),
            size: self.size.max(other.size),
            age: self.age.max(other.age),
            recent_commits: self.recent_commits.max(other.recent_commits),
            recent_churn: self.recent_churn.max(other.recent_churn),
        }
    }
}

/// Maps raw metrics onto [0, 1] channel values against fixed maxima.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    maxima: ChannelMaxima,
}

impl Normalizer {
    pub fn new(maxima: ChannelMaxima) -> Self {
        Normalizer { maxima }
    }

    pub fn maxima(&self) -> ChannelMaxima {
        self.maxima
    }

    /// Normalized value of `channel` for `metrics`, always in [0, 1].
    pub fn value(&self, metrics: &FileMetrics, channel: Channel) -> f64 {
        match channel {
            Channel::Commits => log_norm(metrics.commits, self.maxima.commits),
            Channel::Churn => log_norm(metrics.churn, self.maxima.churn),
            Channel::Contrib => log_norm(metrics.unique_contributors, self.maxima.contrib),
            Channel::Loc => log_norm(metrics.lines_of_code, self.maxima.loc),
            Channel::Size => log_norm(metrics.size_bytes, self.maxima.size),
            Channel::Age => log_norm(metrics.age_days, self.maxima.age),
            Channel::Gini => metrics.gini.clamp(0.0, 1.0),
            Channel::InvContrib => {
                1.0 - log_norm(metrics.unique_contributors, self.maxima.contrib)
            }
            Channel::InvRecent => 1.0 - log_norm(metrics.recent_commits, self.maxima.recent_commits),
            Channel::LowRecent => 1.0 - log_norm(metrics.recent_churn, self.maxima.recent_churn),
        }
    }
}

/// `log1p(x) / log1p(max)`, with a zero max normalizing to 0 for every file.
fn log_norm(value: u64, max: u64) -> f64 {
    if max == 0 {
        return 0.0;
    }
    (value as f64).ln_1p() / (max as f64).ln_1p()
}

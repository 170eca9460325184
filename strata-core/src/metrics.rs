//! Per-file metric assembly: history aggregates joined with filesystem
//! size/LOC, contributor concentration, and ownership.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::aggregate::FileAggregate;
use crate::error::CoreError;

const SECS_PER_DAY: i64 = 24 * 60 * 60;

/// How many top contributors are reported as owners.
const OWNER_COUNT: usize = 2;

/// Raw metrics for one candidate file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetrics {
    pub path: String,
    pub commits: u64,
    pub churn: u64,
    pub unique_contributors: u64,
    pub age_days: u64,
    pub size_bytes: u64,
    pub lines_of_code: u64,
    /// Gini coefficient of the contributor histogram, in [0, 1].
    pub gini: f64,
    /// Top contributors by commit count, descending; ties broken by name.
    pub owners: Vec<String>,
    pub recent_commits: u64,
    pub recent_churn: u64,
}

/// Assemble metrics for one path.
///
/// `aggregate` is `None` for files admitted by the path filter with no
/// activity in the window; their history channels are all zero.
///
/// Filesystem failures (vanished file, permission denied) surface as
/// [`CoreError::Filesystem`]; the caller skips the file with a warning.
pub fn build_file_metrics(
    repo_root: &Path,
    path: &str,
    aggregate: Option<&FileAggregate>,
    window_end: i64,
) -> Result<FileMetrics> {
    let absolute = repo_root.join(path);
    let metadata = std::fs::metadata(&absolute).map_err(|e| CoreError::Filesystem {
        path: absolute.clone(),
        message: e.to_string(),
    })?;
    let size_bytes = metadata.len();
    let content = std::fs::read(&absolute).map_err(|e| CoreError::Filesystem {
        path: absolute.clone(),
        message: e.to_string(),
    })?;
    let lines_of_code = count_loc(&content);

    let (commits, churn, contributors, first_seen, recent_commits, recent_churn) = match aggregate {
        Some(agg) => (
            agg.commits,
            agg.churn,
            agg.contributors.clone(),
            Some(agg.first_seen),
            agg.recent_commits,
            agg.recent_churn,
        ),
        None => (0, 0, BTreeMap::new(), None, 0, 0),
    };

    let counts: Vec<u64> = contributors.values().copied().collect();
    Ok(FileMetrics {
        path: path.to_string(),
        commits,
        churn,
        unique_contributors: contributors.len() as u64,
        age_days: first_seen.map(|fs| age_days(window_end, fs)).unwrap_or(0),
        size_bytes,
        lines_of_code,
        gini: gini(&counts),
        owners: owners(&contributors),
        recent_commits,
        recent_churn,
    })
}

/// Lines containing at least one non-whitespace byte.
pub fn count_loc(content: &[u8]) -> u64 {
    content
        .split(|&b| b == b'\n')
        .filter(|line| line.iter().any(|b| !b.is_ascii_whitespace()))
        .count() as u64
}

/// Whole days between the window end and the first sighting, floored.
///
/// The `[24h, 36h)` range reports 0: a file first seen "a day and change"
/// ago is treated as new, absorbing clock skew and DST shifts around the
/// day boundary. Preserved as-is; do not widen or narrow without data.
pub fn age_days(window_end: i64, first_seen: i64) -> u64 {
    let diff = window_end - first_seen;
    if diff < 0 {
        return 0;
    }
    if (SECS_PER_DAY..SECS_PER_DAY + SECS_PER_DAY / 2).contains(&diff) {
        return 0;
    }
    (diff / SECS_PER_DAY) as u64
}

/// Standard Gini coefficient of a count histogram.
///
/// 0 for a single contributor or a perfectly even split; approaches 1 as
/// one contributor takes all commits among many.
pub fn gini(counts: &[u64]) -> f64 {
    let n = counts.len();
    if n <= 1 {
        return 0.0;
    }
    let total: u64 = counts.iter().sum();
    if total == 0 {
        return 0.0;
    }
    let mut abs_diff_sum = 0.0;
    for &a in counts {
        for &b in counts {
            abs_diff_sum += (a as f64 - b as f64).abs();
        }
    }
    abs_diff_sum / (2.0 * n as f64 * total as f64)
}

/// Top contributors by commit count descending, names ascending on ties.
pub fn owners(contributors: &BTreeMap<String, u64>) -> Vec<String> {
    let mut ranked: Vec<(&String, u64)> = contributors.iter().map(|(k, &v)| (k, v)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked
        .into_iter()
        .take(OWNER_COUNT)
        .map(|(name, _)| name.clone())
        .collect()
}

/// Order-insensitive owner-list equality; order carries rank information
/// for display, but "same owners" means the same set.
pub fn owners_equal(a: &[String], b: &[String]) -> bool {
    let mut a_sorted = a.to_vec();
    let mut b_sorted = b.to_vec();
    a_sorted.sort();
    b_sorted.sort();
    a_sorted == b_sorted
}

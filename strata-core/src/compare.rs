//! Comparison of two analyses by path.
//!
//! Both sides are rescored over the union of their channel maxima so the
//! deltas are on one scale; per-run normalization alone would make scores
//! from very different windows incomparable.
//!
//! Per-side failures are isolated: a failed side contributes an empty batch
//! and an entry in the collected error list instead of aborting the run.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::engine::{AnalysisEngine, MetricBatch};
use crate::error::{is_cancelled, CoreError};
use crate::metrics::owners_equal;
use crate::report::FileResult;
use crate::scoring::ScoreMode;
use crate::window::Window;

/// Classification of a path's movement between the two analyses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    /// Only in the target side, with activity there.
    New,
    /// In both sides, unchanged.
    Active,
    /// Only in the base side.
    Inactive,
    /// In both sides with a score or commit-count change.
    Modified,
    /// Fallback (e.g. target-only with no commits).
    Unknown,
}

/// One path's comparison entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ComparisonEntry {
    pub path: String,
    pub before_score: f64,
    pub after_score: f64,
    /// `after - before`; a missing side contributes 0.
    pub delta: f64,
    pub delta_churn: i64,
    pub delta_commits: i64,
    pub status: ChangeStatus,
    pub before_owners: Vec<String>,
    pub after_owners: Vec<String>,
}

/// Counts and net movement across all entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ComparisonSummary {
    pub new_count: usize,
    pub active_count: usize,
    pub inactive_count: usize,
    pub modified_count: usize,
    pub unknown_count: usize,
    pub net_delta: f64,
    pub net_delta_churn: i64,
    pub net_delta_commits: i64,
}

/// Full comparison output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ComparisonResult {
    pub mode: ScoreMode,
    pub entries: Vec<ComparisonEntry>,
    pub summary: ComparisonSummary,
    /// Per-side failures, surfaced instead of aborting the comparison.
    pub errors: Vec<String>,
}

impl ComparisonResult {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(Into::into)
    }
}

/// One side of a comparison: a reference plus a window.
#[derive(Debug, Clone)]
pub struct ComparisonSide {
    pub git_ref: String,
    pub window: Window,
}

/// Compare two analyses of the same repository.
///
/// The sides run concurrently; results merge deterministically by path.
pub fn compare(
    engine: &AnalysisEngine,
    repo_root: &Path,
    base: &ComparisonSide,
    target: &ComparisonSide,
    mode: ScoreMode,
    cancel: &CancelToken,
) -> Result<ComparisonResult> {
    let mut errors = Vec::new();

    let (base_batch, target_batch) = std::thread::scope(|scope| {
        let base_handle = scope.spawn(|| {
            engine.collect(repo_root, &base.git_ref, base.window, cancel)
        });
        let target_handle = scope.spawn(|| {
            engine.collect(repo_root, &target.git_ref, target.window, cancel)
        });
        (join_side(base_handle), join_side(target_handle))
    });
    cancel.check()?;

    let base_batch = unwrap_side("base", base_batch, &mut errors)?;
    let target_batch = unwrap_side("target", target_batch, &mut errors)?;

    let shared_maxima = match (&base_batch, &target_batch) {
        (Some(a), Some(b)) => a.maxima.union(&b.maxima),
        (Some(a), None) => a.maxima,
        (None, Some(b)) => b.maxima,
        (None, None) => Default::default(),
    };

    let base_results = base_batch
        .as_ref()
        .map(|b| engine.score_batch(b, shared_maxima, mode))
        .unwrap_or_default();
    let target_results = target_batch
        .as_ref()
        .map(|b| engine.score_batch(b, shared_maxima, mode))
        .unwrap_or_default();

    let entries = join_entries(&base_results, &target_results);
    let summary = summarize(&entries);
    Ok(ComparisonResult {
        mode,
        entries,
        summary,
        errors,
    })
}

type SideResult = Result<MetricBatch>;

fn join_side(handle: std::thread::ScopedJoinHandle<'_, SideResult>) -> SideResult {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(CoreError::Provider("comparison worker panicked".to_string()).into()),
    }
}

/// Convert a side failure into an error-list entry, unless it was a
/// cancellation (which always propagates).
fn unwrap_side(
    label: &str,
    result: SideResult,
    errors: &mut Vec<String>,
) -> Result<Option<MetricBatch>> {
    match result {
        Ok(batch) => Ok(Some(batch)),
        Err(e) if is_cancelled(&e) => Err(e),
        Err(e) => {
            log::warn!("{} side of comparison failed: {:#}", label, e);
            errors.push(format!("{}: {:#}", label, e));
            Ok(None)
        }
    }
}

fn join_entries(base: &[FileResult], target: &[FileResult]) -> Vec<ComparisonEntry> {
    let base_by_path: BTreeMap<&str, &FileResult> =
        base.iter().map(|r| (r.path.as_str(), r)).collect();
    let target_by_path: BTreeMap<&str, &FileResult> =
        target.iter().map(|r| (r.path.as_str(), r)).collect();

    let mut all_paths: Vec<&str> = base_by_path
        .keys()
        .chain(target_by_path.keys())
        .copied()
        .collect();
    all_paths.sort_unstable();
    all_paths.dedup();

    all_paths
        .into_iter()
        .map(|path| {
            let before = base_by_path.get(path).copied();
            let after = target_by_path.get(path).copied();
            build_entry(path, before, after)
        })
        .collect()
}

fn build_entry(
    path: &str,
    before: Option<&FileResult>,
    after: Option<&FileResult>,
) -> ComparisonEntry {
    let before_score = before.map(|r| r.score).unwrap_or(0.0);
    let after_score = after.map(|r| r.score).unwrap_or(0.0);
    let before_commits = before.map(|r| r.metrics.commits).unwrap_or(0);
    let after_commits = after.map(|r| r.metrics.commits).unwrap_or(0);
    let before_churn = before.map(|r| r.metrics.churn).unwrap_or(0);
    let after_churn = after.map(|r| r.metrics.churn).unwrap_or(0);
    let delta = after_score - before_score;

    let status = match (before, after) {
        (None, Some(t)) if t.metrics.commits > 0 => ChangeStatus::New,
        (Some(_), None) => ChangeStatus::Inactive,
        (Some(_), Some(_)) if delta != 0.0 || before_commits != after_commits => {
            ChangeStatus::Modified
        }
        (Some(_), Some(_)) => ChangeStatus::Active,
        _ => ChangeStatus::Unknown,
    };

    ComparisonEntry {
        path: path.to_string(),
        before_score,
        after_score,
        delta,
        delta_churn: after_churn as i64 - before_churn as i64,
        delta_commits: after_commits as i64 - before_commits as i64,
        status,
        before_owners: before.map(|r| r.owners.clone()).unwrap_or_default(),
        after_owners: after.map(|r| r.owners.clone()).unwrap_or_default(),
    }
}

fn summarize(entries: &[ComparisonEntry]) -> ComparisonSummary {
    let mut summary = ComparisonSummary::default();
    for entry in entries {
        match entry.status {
            ChangeStatus::New => summary.new_count += 1,
            ChangeStatus::Active => summary.active_count += 1,
            ChangeStatus::Inactive => summary.inactive_count += 1,
            ChangeStatus::Modified => summary.modified_count += 1,
            ChangeStatus::Unknown => summary.unknown_count += 1,
        }
        summary.net_delta += entry.delta;
        summary.net_delta_churn += entry.delta_churn;
        summary.net_delta_commits += entry.delta_commits;
    }
    summary
}

/// Render a comparison as a text table, largest movement first.
pub fn render_text(comparison: &ComparisonResult) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "{:<44} {:<10} {:<8} {:<8} {:<8} {}\n",
        "FILE", "STATUS", "BEFORE", "AFTER", "DELTA", "OWNERS"
    ));
    let mut entries: Vec<&ComparisonEntry> = comparison.entries.iter().collect();
    entries.sort_by(|a, b| {
        b.delta
            .abs()
            .partial_cmp(&a.delta.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.path.cmp(&b.path))
    });
    for entry in entries {
        let status = match entry.status {
            ChangeStatus::New => "new",
            ChangeStatus::Active => "active",
            ChangeStatus::Inactive => "inactive",
            ChangeStatus::Modified => "modified",
            ChangeStatus::Unknown => "unknown",
        };
        let owners = if owners_equal(&entry.before_owners, &entry.after_owners) {
            entry.after_owners.join(", ")
        } else {
            format!(
                "{} -> {}",
                entry.before_owners.join(", "),
                entry.after_owners.join(", ")
            )
        };
        output.push_str(&format!(
            "{:<44} {:<10} {:<8} {:<8} {:<8} {}\n",
            crate::report::truncate_or_pad(&entry.path, 44),
            status,
            format!("{:.1}", entry.before_score),
            format!("{:.1}", entry.after_score),
            format!("{:+.1}", entry.delta),
            owners,
        ));
    }
    output.push_str(&format!(
        "\nnew: {}  modified: {}  active: {}  inactive: {}  net delta: {:+.1}\n",
        comparison.summary.new_count,
        comparison.summary.modified_count,
        comparison.summary.active_count,
        comparison.summary.inactive_count,
        comparison.summary.net_delta,
    ));
    for error in &comparison.errors {
        output.push_str(&format!("warning: {}\n", error));
    }
    output
}

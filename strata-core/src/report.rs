//! File-level results and output rendering.
//!
//! Global invariants enforced:
//! - Deterministic output ordering
//! - Byte-for-byte identical output across runs over identical input

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::metrics::FileMetrics;
use crate::normalize::Channel;
use crate::scoring::{FileScores, ScoreMode};

/// Raw metrics in report form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MetricsReport {
    pub commits: u64,
    pub churn: u64,
    pub unique_contributors: u64,
    pub age_days: u64,
    pub size_bytes: u64,
    pub lines_of_code: u64,
    pub gini: f64,
    pub recent_commits: u64,
    pub recent_churn: u64,
}

impl From<&FileMetrics> for MetricsReport {
    fn from(m: &FileMetrics) -> Self {
        MetricsReport {
            commits: m.commits,
            churn: m.churn,
            unique_contributors: m.unique_contributors,
            age_days: m.age_days,
            size_bytes: m.size_bytes,
            lines_of_code: m.lines_of_code,
            gini: m.gini,
            recent_commits: m.recent_commits,
            recent_churn: m.recent_churn,
        }
    }
}

/// One scored file under the run's selected mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FileResult {
    /// 1-based rank; 0 until the ranker assigns it.
    pub rank: usize,
    pub path: String,
    pub mode: ScoreMode,
    /// Score for the selected mode, post-attenuation, in [0, 100].
    pub score: f64,
    /// Per-channel share of the pre-attenuation score, summing to 100.
    pub breakdown: BTreeMap<Channel, f64>,
    pub metrics: MetricsReport,
    pub owners: Vec<String>,
    /// All four mode scores, for export and comparison.
    pub all_scores: BTreeMap<ScoreMode, f64>,
    pub debuffed: bool,
}

impl FileResult {
    pub fn new(metrics: &FileMetrics, mode: ScoreMode, scores: &FileScores) -> Self {
        FileResult {
            rank: 0,
            path: metrics.path.clone(),
            mode,
            score: scores.scores[&mode],
            breakdown: scores.breakdowns[&mode].clone(),
            metrics: MetricsReport::from(metrics),
            owners: metrics.owners.clone(),
            all_scores: scores.scores.clone(),
            debuffed: scores.debuffed,
        }
    }
}

/// Render file results as a text table.
pub fn render_text(results: &[FileResult]) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "{:<6} {:<8} {:<44} {:<8} {:<8} {:<6} {}\n",
        "RANK", "SCORE", "FILE", "COMMITS", "CHURN", "AGE", "OWNERS"
    ));
    for result in results {
        output.push_str(&format!(
            "{:<6} {:<8} {:<44} {:<8} {:<8} {:<6} {}\n",
            result.rank,
            format!("{:.1}", result.score),
            truncate_or_pad(&result.path, 44),
            result.metrics.commits,
            result.metrics.churn,
            result.metrics.age_days,
            result.owners.join(", "),
        ));
    }
    output
}

/// Render file results as pretty JSON.
pub fn render_json(results: &[FileResult]) -> String {
    serde_json::to_string_pretty(results).unwrap_or_else(|_| "[]".to_string())
}

/// Render file results as CSV (header + one row per file).
pub fn render_csv(results: &[FileResult]) -> String {
    let mut output = String::from(
        "rank,path,mode,score,commits,churn,unique_contributors,age_days,size_bytes,lines_of_code,gini,recent_commits,recent_churn,owners\n",
    );
    for r in results {
        output.push_str(&format!(
            "{},{},{},{:.2},{},{},{},{},{},{},{:.4},{},{},{}\n",
            r.rank,
            csv_field(&r.path),
            r.mode,
            r.score,
            r.metrics.commits,
            r.metrics.churn,
            r.metrics.unique_contributors,
            r.metrics.age_days,
            r.metrics.size_bytes,
            r.metrics.lines_of_code,
            r.metrics.gini,
            r.metrics.recent_commits,
            r.metrics.recent_churn,
            csv_field(&r.owners.join(";")),
        ));
    }
    output
}

/// Quote a CSV field when it contains separators or quotes.
pub fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

/// Truncate or pad string to fixed width.
pub fn truncate_or_pad(s: &str, width: usize) -> String {
    if s.len() > width {
        format!("{}...", &s[..width.saturating_sub(3)])
    } else {
        format!("{:<width$}", s, width = width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result(path: &str, score: f64, rank: usize) -> FileResult {
        FileResult {
            rank,
            path: path.to_string(),
            mode: ScoreMode::Hot,
            score,
            breakdown: BTreeMap::new(),
            metrics: MetricsReport {
                commits: 3,
                churn: 12,
                unique_contributors: 2,
                age_days: 4,
                size_bytes: 100,
                lines_of_code: 40,
                gini: 0.25,
                recent_commits: 1,
                recent_churn: 5,
            },
            owners: vec!["amy".to_string(), "bob".to_string()],
            all_scores: BTreeMap::from([(ScoreMode::Hot, score)]),
            debuffed: false,
        }
    }

    #[test]
    fn test_text_output_has_header_and_rows() {
        let out = render_text(&[sample_result("src/a.rs", 42.0, 1)]);
        assert!(out.starts_with("RANK"));
        assert!(out.contains("src/a.rs"));
        assert!(out.contains("42.0"));
    }

    #[test]
    fn test_json_round_trips() {
        let results = vec![sample_result("src/a.rs", 42.0, 1)];
        let json = render_json(&results);
        let parsed: Vec<FileResult> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, results);
    }

    #[test]
    fn test_csv_has_one_row_per_file() {
        let out = render_csv(&[
            sample_result("src/a.rs", 42.0, 1),
            sample_result("src/b.rs", 10.0, 2),
        ]);
        assert_eq!(out.lines().count(), 3);
        assert!(out.lines().nth(1).unwrap().starts_with("1,src/a.rs,hot,42.00"));
    }

    #[test]
    fn test_csv_quotes_embedded_commas() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}

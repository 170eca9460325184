//! LOC-weighted rollup of file scores to top-level folders.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::aggregate::AggregateFrame;
use crate::metrics;
use crate::report::FileResult;

/// Aggregated result for one top-level folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FolderResult {
    /// Folder path, always ending in `/`. Root-level files group under `./`.
    pub path: String,
    pub file_count: usize,
    pub total_loc: u64,
    /// `sum(score * loc) / sum(loc)`; arithmetic mean when total LOC is 0.
    pub weighted_score: f64,
    pub commits: u64,
    pub churn: u64,
    pub owners: Vec<String>,
}

/// Group results by first path segment and roll scores up.
///
/// Nested folder analysis is done by re-running the engine with a path
/// filter, so one level of grouping is all that happens here. Folder owners
/// are the top contributors across the contained files' merged histograms.
pub fn aggregate_folders(results: &[FileResult], frame: &AggregateFrame) -> Vec<FolderResult> {
    struct Bucket {
        files: Vec<(f64, u64)>,
        commits: u64,
        churn: u64,
        contributors: BTreeMap<String, u64>,
    }

    let mut buckets: BTreeMap<String, Bucket> = BTreeMap::new();
    for result in results {
        let folder = folder_of(&result.path);
        let bucket = buckets.entry(folder).or_insert_with(|| Bucket {
            files: Vec::new(),
            commits: 0,
            churn: 0,
            contributors: BTreeMap::new(),
        });
        bucket
            .files
            .push((result.score, result.metrics.lines_of_code));
        bucket.commits += result.metrics.commits;
        bucket.churn += result.metrics.churn;
        if let Some(agg) = frame.files.get(&result.path) {
            for (author, count) in &agg.contributors {
                *bucket.contributors.entry(author.clone()).or_insert(0) += count;
            }
        }
    }

    buckets
        .into_iter()
        .map(|(path, bucket)| {
            let total_loc: u64 = bucket.files.iter().map(|(_, loc)| loc).sum();
            let weighted_score = if total_loc > 0 {
                bucket
                    .files
                    .iter()
                    .map(|(score, loc)| score * *loc as f64)
                    .sum::<f64>()
                    / total_loc as f64
            } else {
                bucket.files.iter().map(|(score, _)| score).sum::<f64>()
                    / bucket.files.len().max(1) as f64
            };
            FolderResult {
                path,
                file_count: bucket.files.len(),
                total_loc,
                weighted_score,
                commits: bucket.commits,
                churn: bucket.churn,
                owners: metrics::owners(&bucket.contributors),
            }
        })
        .collect()
}

/// First path segment with a trailing slash; `./` for root-level files.
fn folder_of(path: &str) -> String {
    match path.split_once('/') {
        Some((first, _)) => format!("{}/", first),
        None => "./".to_string(),
    }
}

/// Render folder results as a text table.
pub fn render_text(folders: &[FolderResult]) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "{:<24} {:<8} {:<6} {:<10} {:<8} {:<8} {}\n",
        "FOLDER", "SCORE", "FILES", "LOC", "COMMITS", "CHURN", "OWNERS"
    ));
    for folder in folders {
        output.push_str(&format!(
            "{:<24} {:<8} {:<6} {:<10} {:<8} {:<8} {}\n",
            crate::report::truncate_or_pad(&folder.path, 24),
            format!("{:.1}", folder.weighted_score),
            folder.file_count,
            folder.total_loc,
            folder.commits,
            folder.churn,
            folder.owners.join(", "),
        ));
    }
    output
}

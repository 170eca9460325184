//! One-pass fold of a commit stream into per-file aggregates.
//!
//! Invariants enforced:
//! - Each commit is processed exactly once
//! - For every path, the contributor counts sum to the commit count
//! - `first_seen` is never before the window start
//! - A provider failure mid-stream discards the partial frame

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::provider::CommitRecord;
use crate::window::Window;

/// Per-path history aggregates over one window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAggregate {
    pub commits: u64,
    /// Lines added + deleted across the window's commits touching the path.
    pub churn: u64,
    /// Author name -> commit count. Names are opaque, case-sensitive.
    pub contributors: BTreeMap<String, u64>,
    /// Earliest author-time for the path within the window.
    pub first_seen: i64,
    /// Commits in the last 30% of the window.
    pub recent_commits: u64,
    /// Churn in the last 30% of the window.
    pub recent_churn: u64,
}

/// Aggregates for every path observed in a window. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateFrame {
    pub window: Window,
    pub files: BTreeMap<String, FileAggregate>,
}

/// Knobs for the fold.
#[derive(Debug, Clone, Copy)]
pub struct AggregateOptions {
    /// When false, binary file entries (numstat `-` markers) are dropped
    /// entirely instead of counting a zero-churn commit.
    pub include_binary: bool,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        AggregateOptions {
            include_binary: true,
        }
    }
}

/// Fold a commit stream into an [`AggregateFrame`].
///
/// Commits whose author-time lies outside the window are skipped; git's
/// `--since`/`--until` filter on commit date, which can disagree with the
/// author date this engine windows by. Cancellation is checked between
/// commits.
pub fn fold_commits<I>(
    stream: I,
    window: Window,
    options: AggregateOptions,
    cancel: &CancelToken,
) -> Result<AggregateFrame>
where
    I: IntoIterator<Item = Result<CommitRecord>>,
{
    let recent_start = window.recent_tail_start();
    let mut files: BTreeMap<String, FileAggregate> = BTreeMap::new();

    for commit in stream {
        cancel.check()?;
        let commit = commit.context("commit stream failed mid-window")?;
        if !window.contains(commit.author_time) {
            continue;
        }
        let recent = commit.author_time >= recent_start;

        for change in &commit.files {
            if change.binary && !options.include_binary {
                continue;
            }
            let churn = change.added + change.deleted;
            let entry = files
                .entry(change.path.clone())
                .or_insert_with(|| FileAggregate {
                    commits: 0,
                    churn: 0,
                    contributors: BTreeMap::new(),
                    first_seen: commit.author_time,
                    recent_commits: 0,
                    recent_churn: 0,
                });
            entry.commits += 1;
            entry.churn += churn;
            *entry.contributors.entry(commit.author.clone()).or_insert(0) += 1;
            entry.first_seen = entry.first_seen.min(commit.author_time);
            if recent {
                entry.recent_commits += 1;
                entry.recent_churn += churn;
            }
        }
    }

    Ok(AggregateFrame { window, files })
}

//! Comparison and time-series integration tests over real git history.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use strata_core::aggregate::AggregateOptions;
use strata_core::cache::MemoryCache;
use strata_core::cancel::CancelToken;
use strata_core::compare::{self, ChangeStatus, ComparisonSide};
use strata_core::engine::AnalysisEngine;
use strata_core::filter::FileFilter;
use strata_core::provider::GitCliProvider;
use strata_core::scoring::{ModeWeights, ScoreMode};
use strata_core::timeseries;
use strata_core::window::Window;

const T0: i64 = 1_700_000_400 / 3600 * 3600;
const HOUR: i64 = 3600;
const DAY: i64 = 24 * HOUR;

fn create_temp_git_repo() -> tempfile::TempDir {
    let temp_dir = tempfile::tempdir().expect("failed to create temp directory");
    let repo_path = temp_dir.path();
    git_command(repo_path, &["init", "--initial-branch=main"]);
    git_command(repo_path, &["config", "user.name", "Test User"]);
    git_command(repo_path, &["config", "user.email", "test@example.com"]);
    git_command(repo_path, &["config", "commit.gpgsign", "false"]);
    temp_dir
}

fn git_command(repo_path: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .current_dir(repo_path)
        .args(args)
        .output()
        .unwrap_or_else(|_| panic!("failed to run git {:?}", args));
    if !output.status.success() {
        panic!(
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn write_file(repo_path: &Path, path: &str, content: &str) {
    let file_path = repo_path.join(path);
    if let Some(parent) = file_path.parent() {
        std::fs::create_dir_all(parent).expect("failed to create directory");
    }
    std::fs::write(&file_path, content).expect("failed to write file");
}

fn commit_at(repo_path: &Path, message: &str, author: &str, epoch: i64) {
    git_command(repo_path, &["add", "."]);
    let date = format!("{} +0000", epoch);
    let output = Command::new("git")
        .current_dir(repo_path)
        .env("GIT_AUTHOR_NAME", author)
        .env("GIT_AUTHOR_EMAIL", "author@example.com")
        .env("GIT_AUTHOR_DATE", &date)
        .env("GIT_COMMITTER_DATE", &date)
        .args(["commit", "--allow-empty", "-m", message])
        .output()
        .expect("failed to run git commit");
    if !output.status.success() {
        panic!(
            "git commit failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }
}

fn engine() -> AnalysisEngine {
    AnalysisEngine::new(
        Arc::new(GitCliProvider::new()),
        Arc::new(MemoryCache::new()),
        FileFilter::default(),
        ModeWeights::default(),
        AggregateOptions::default(),
        2,
    )
}

#[test]
fn test_compare_detects_new_file() {
    let repo = create_temp_git_repo();
    // Base window activity: old.go only.
    write_file(repo.path(), "old.go", "package old\n");
    commit_at(repo.path(), "base work", "Base Author", T0);
    // Target window activity: three commits on new.go.
    for (i, epoch) in [(1, T0 + 10 * HOUR), (2, T0 + 11 * HOUR), (3, T0 + 12 * HOUR)] {
        write_file(repo.path(), "new.go", &format!("package new // rev {}\n", i));
        commit_at(repo.path(), &format!("new work {}", i), "Amy", epoch);
    }

    let base = ComparisonSide {
        git_ref: "HEAD".to_string(),
        window: Window::new(T0 - HOUR, T0 + HOUR).unwrap(),
    };
    let target = ComparisonSide {
        git_ref: "HEAD".to_string(),
        window: Window::new(T0 + 9 * HOUR, T0 + 13 * HOUR).unwrap(),
    };

    let comparison = compare::compare(
        &engine(),
        repo.path(),
        &base,
        &target,
        ScoreMode::Hot,
        &CancelToken::new(),
    )
    .expect("comparison should succeed");

    assert!(comparison.errors.is_empty());
    let entry = comparison
        .entries
        .iter()
        .find(|e| e.path == "new.go")
        .expect("new.go should have an entry");
    assert_eq!(entry.status, ChangeStatus::New);
    assert_eq!(entry.before_score, 0.0);
    assert!((entry.delta - entry.after_score).abs() < 1e-9);
    assert!(entry.before_owners.is_empty());
    assert_eq!(entry.after_owners, vec!["Amy"]);
    assert_eq!(entry.delta_commits, 3);

    let old_entry = comparison
        .entries
        .iter()
        .find(|e| e.path == "old.go")
        .expect("old.go should have an entry");
    assert_eq!(old_entry.status, ChangeStatus::Inactive);
    assert_eq!(comparison.summary.new_count, 1);
    assert_eq!(comparison.summary.inactive_count, 1);
}

#[test]
fn test_compare_same_window_is_all_active() {
    let repo = create_temp_git_repo();
    write_file(repo.path(), "stable.rs", "fn stable() {}\n");
    commit_at(repo.path(), "work", "Amy", T0);

    let side = ComparisonSide {
        git_ref: "HEAD".to_string(),
        window: Window::new(T0 - HOUR, T0 + HOUR).unwrap(),
    };
    let comparison = compare::compare(
        &engine(),
        repo.path(),
        &side,
        &side,
        ScoreMode::Hot,
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(comparison.summary.active_count, comparison.entries.len());
    assert_eq!(comparison.summary.net_delta, 0.0);
}

#[test]
fn test_compare_bad_base_ref_is_isolated() {
    let repo = create_temp_git_repo();
    write_file(repo.path(), "a.rs", "fn a() {}\n");
    commit_at(repo.path(), "work", "Amy", T0);

    let base = ComparisonSide {
        git_ref: "no-such-ref".to_string(),
        window: Window::new(T0 - HOUR, T0 + HOUR).unwrap(),
    };
    let target = ComparisonSide {
        git_ref: "HEAD".to_string(),
        window: Window::new(T0 - HOUR, T0 + HOUR).unwrap(),
    };

    let comparison = compare::compare(
        &engine(),
        repo.path(),
        &base,
        &target,
        ScoreMode::Hot,
        &CancelToken::new(),
    )
    .expect("side failure must not abort the comparison");

    assert_eq!(comparison.errors.len(), 1);
    assert!(comparison.errors[0].starts_with("base:"));
    // Everything present reads as new activity against an empty base.
    assert!(comparison
        .entries
        .iter()
        .all(|e| e.status == ChangeStatus::New || e.status == ChangeStatus::Unknown));
}

#[test]
fn test_timeseries_windows_are_disjoint_and_chronological() {
    let repo = create_temp_git_repo();
    // Activity in windows 1, 2, and 4 of a 4-day interval ending at T0;
    // window 3 stays quiet.
    let interval_start = T0 - 4 * DAY;
    write_file(repo.path(), "hot.rs", "v1\n");
    commit_at(repo.path(), "w1", "Amy", interval_start + 12 * HOUR);
    write_file(repo.path(), "hot.rs", "v1\nv2\n");
    commit_at(repo.path(), "w2", "Amy", interval_start + DAY + 12 * HOUR);
    write_file(repo.path(), "hot.rs", "v1\nv2\nv3\n");
    commit_at(repo.path(), "w4", "Bob", interval_start + 3 * DAY + 12 * HOUR);

    let series = timeseries::timeseries(
        &engine(),
        repo.path(),
        "HEAD",
        "hot.rs",
        Window::new(interval_start, T0).unwrap(),
        4,
        ScoreMode::Hot,
        &CancelToken::new(),
    )
    .expect("timeseries should succeed");

    assert_eq!(series.points.len(), 4);
    assert!(series.errors.is_empty());

    // Chronological order, pairwise disjoint, covering the interval.
    for pair in series.points.windows(2) {
        assert!(pair[0].start < pair[1].start);
        assert!(pair[0].end <= pair[1].start);
    }
    assert_eq!(series.points[0].start, interval_start);
    assert_eq!(series.points[3].end, T0);
    for point in &series.points {
        assert_eq!(point.end - point.start, DAY);
    }

    // Quiet window yields score 0 and empty owners.
    let quiet = &series.points[2];
    assert_eq!(quiet.score, 0.0);
    assert!(quiet.owners.is_empty());

    // Active windows project the file's score and owners.
    assert!(series.points[0].score > 0.0);
    assert_eq!(series.points[0].owners, vec!["Amy"]);
    assert_eq!(series.points[3].owners, vec!["Bob"]);
}

#[test]
fn test_timeseries_unknown_path_is_all_zero() {
    let repo = create_temp_git_repo();
    write_file(repo.path(), "real.rs", "x\n");
    commit_at(repo.path(), "work", "Amy", T0 - DAY);

    let series = timeseries::timeseries(
        &engine(),
        repo.path(),
        "HEAD",
        "imaginary.rs",
        Window::new(T0 - 2 * DAY, T0).unwrap(),
        2,
        ScoreMode::Hot,
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(series.points.len(), 2);
    assert!(series.points.iter().all(|p| p.score == 0.0));
}

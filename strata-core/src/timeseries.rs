//! Time-series projection of one path's score across consecutive windows.
//!
//! The interval splits into N disjoint windows; each runs the full
//! single-analysis pipeline (the cache makes the repeated aggregation
//! cheap) and the target path's score is projected out. Windows run
//! concurrently but the points come back in chronological order.
//!
//! Per-window failures are isolated: the window yields an error-tagged
//! point with score 0, and the failure lands in the collected error list.

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::engine::{AnalysisEngine, AnalysisOptions};
use crate::error::{is_cancelled, CoreError};
use crate::scoring::ScoreMode;
use crate::window::Window;

/// One window's projection of the target path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TimeseriesPoint {
    pub path: String,
    pub label: String,
    pub start: i64,
    pub end: i64,
    /// 0 when the path had no activity in the window, or the window failed.
    pub score: f64,
    pub owners: Vec<String>,
    pub mode: ScoreMode,
    /// Set when this window's analysis failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// All points for one path, in chronological order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TimeseriesResult {
    pub path: String,
    pub mode: ScoreMode,
    pub points: Vec<TimeseriesPoint>,
    pub errors: Vec<String>,
}

impl TimeseriesResult {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(Into::into)
    }
}

/// Run the pipeline over `points` disjoint windows covering `interval` and
/// project `path`'s score from each.
#[allow(clippy::too_many_arguments)]
pub fn timeseries(
    engine: &AnalysisEngine,
    repo_root: &Path,
    git_ref: &str,
    path: &str,
    interval: Window,
    points: usize,
    mode: ScoreMode,
    cancel: &CancelToken,
) -> Result<TimeseriesResult> {
    let windows = interval.slices(points)?;
    let options = AnalysisOptions {
        mode,
        limit: None,
        include_folders: false,
        follow_renames: false,
    };

    // Fan out across windows, bounded by the engine's worker count. Slots
    // are indexed so run order never affects output order.
    let mut slots: Vec<Option<TimeseriesPoint>> = vec![None; windows.len()];
    let concurrency = engine.workers().min(windows.len()).max(1);
    let (task_tx, task_rx) = crossbeam_channel::unbounded::<(usize, Window)>();
    let (done_tx, done_rx) = crossbeam_channel::unbounded::<(usize, Result<TimeseriesPoint>)>();
    for task in windows.iter().copied().enumerate() {
        task_tx.send(task).expect("task channel open");
    }
    drop(task_tx);

    std::thread::scope(|scope| {
        for _ in 0..concurrency {
            let task_rx = task_rx.clone();
            let done_tx = done_tx.clone();
            let options = options.clone();
            let cancel = cancel.clone();
            scope.spawn(move || {
                for (index, window) in task_rx.iter() {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let result = engine
                        .analyze(repo_root, git_ref, window, &options, &cancel)
                        .map(|analysis| project_point(&analysis.files, path, window, mode));
                    if done_tx.send((index, result)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(done_tx);

        for (index, result) in done_rx.iter() {
            let window = windows[index];
            slots[index] = Some(match result {
                Ok(point) => point,
                Err(e) if is_cancelled(&e) => {
                    cancel.cancel();
                    break;
                }
                Err(e) => {
                    log::warn!("window {} failed: {:#}", window.label(), e);
                    error_point(path, window, mode, &e)
                }
            });
        }
    });
    cancel.check()?;

    let mut points: Vec<TimeseriesPoint> = slots
        .into_iter()
        .map(|slot| slot.ok_or_else(|| CoreError::Provider("missing window result".to_string())))
        .collect::<Result<_, _>>()?;
    points.sort_by_key(|p| p.start);
    let errors = points
        .iter()
        .filter_map(|p| p.error.clone())
        .collect::<Vec<_>>();

    Ok(TimeseriesResult {
        path: path.to_string(),
        mode,
        points,
        errors,
    })
}

/// Extract the target path's point from one window's results.
///
/// A window with no activity on the path yields score 0 and empty owners.
fn project_point(
    files: &[crate::report::FileResult],
    path: &str,
    window: Window,
    mode: ScoreMode,
) -> TimeseriesPoint {
    let hit = files.iter().find(|r| r.path == path);
    TimeseriesPoint {
        path: path.to_string(),
        label: window.label(),
        start: window.start,
        end: window.end,
        score: hit.map(|r| r.score).unwrap_or(0.0),
        owners: hit.map(|r| r.owners.clone()).unwrap_or_default(),
        mode,
        error: None,
    }
}

fn error_point(path: &str, window: Window, mode: ScoreMode, err: &anyhow::Error) -> TimeseriesPoint {
    TimeseriesPoint {
        path: path.to_string(),
        label: window.label(),
        start: window.start,
        end: window.end,
        score: 0.0,
        owners: Vec::new(),
        mode,
        error: Some(format!("{:#}", err)),
    }
}

/// Render a time series as a text table with a simple bar per point.
pub fn render_text(series: &TimeseriesResult) -> String {
    let mut output = String::new();
    output.push_str(&format!("{} ({})\n", series.path, series.mode));
    let max_score = series
        .points
        .iter()
        .map(|p| p.score)
        .fold(0.0_f64, f64::max);
    for point in &series.points {
        let bar_len = if max_score > 0.0 {
            ((point.score / max_score) * 40.0).round() as usize
        } else {
            0
        };
        output.push_str(&format!(
            "{:<24} {:>7} {} {}\n",
            point.label,
            format!("{:.1}", point.score),
            "#".repeat(bar_len),
            if point.error.is_some() { "(failed)" } else { "" },
        ));
    }
    for error in &series.errors {
        output.push_str(&format!("warning: {}\n", error));
    }
    output
}

//! Bounded worker pool for per-file metric assembly.
//!
//! The filter stage feeds a bounded queue (4x the worker count); producers
//! block when it fills. Each worker does one stat+read per file plus CPU
//! work. Per-file filesystem failures are skipped with a warning; the join
//! stage restores deterministic order by sorting on path.

use std::path::Path;

use anyhow::Result;

use crate::aggregate::AggregateFrame;
use crate::cancel::CancelToken;
use crate::error::CoreError;
use crate::metrics::{build_file_metrics, FileMetrics};

/// Queue capacity multiplier over the worker count.
const QUEUE_FACTOR: usize = 4;

/// Default worker count: host parallelism.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Assemble metrics for every candidate in parallel.
///
/// Returns metrics sorted by path. Files that fail to stat/read between the
/// listing and here (vanished, permission denied) are dropped with a
/// warning. Cancellation is checked between files on every worker.
pub fn build_metrics_parallel(
    repo_root: &Path,
    candidates: &[String],
    frame: &AggregateFrame,
    workers: usize,
    cancel: &CancelToken,
) -> Result<Vec<FileMetrics>> {
    let workers = workers.max(1);
    let window_end = frame.window.end;
    let (path_tx, path_rx) = crossbeam_channel::bounded::<String>(workers * QUEUE_FACTOR);
    let (result_tx, result_rx) = crossbeam_channel::unbounded::<FileMetrics>();

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let path_rx = path_rx.clone();
            let result_tx = result_tx.clone();
            let cancel = cancel.clone();
            scope.spawn(move || {
                for path in path_rx.iter() {
                    if cancel.is_cancelled() {
                        break;
                    }
                    match build_file_metrics(repo_root, &path, frame.files.get(&path), window_end)
                    {
                        Ok(metrics) => {
                            if result_tx.send(metrics).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            log::warn!("skipping {}: {:#}", path, e);
                        }
                    }
                }
            });
        }
        drop(result_tx);

        // Producer: blocks when the queue is full.
        for path in candidates {
            if cancel.is_cancelled() {
                break;
            }
            if path_tx.send(path.clone()).is_err() {
                break;
            }
        }
        drop(path_tx);
    });

    if cancel.is_cancelled() {
        return Err(CoreError::Cancelled.into());
    }

    let mut metrics: Vec<FileMetrics> = result_rx.try_iter().collect();
    metrics.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(metrics)
}

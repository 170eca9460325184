//! Analysis pipeline orchestration.
//!
//! One analysis: cache lookup -> (on miss: stream + fold + cache store) ->
//! candidate filter -> parallel metric assembly -> normalize -> score ->
//! rank -> optional folder rollup. The comparator and time-series
//! orchestrator reuse the collect/score stages with their own joins.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;

use crate::aggregate::{self, AggregateFrame, AggregateOptions, FileAggregate};
use crate::cache::{self, CacheHandle};
use crate::cancel::CancelToken;
use crate::filter::FileFilter;
use crate::folder::{self, FolderResult};
use crate::metrics::{self, FileMetrics};
use crate::normalize::{ChannelMaxima, Normalizer};
use crate::pool;
use crate::provider::{HistoryProvider, PROVIDER_SCHEMA_VERSION};
use crate::rank;
use crate::report::FileResult;
use crate::scoring::{self, ModeWeights, ScoreMode};
use crate::window::Window;

/// How many top-ranked files get the follow-rename refinement pass.
const FOLLOW_TOP_K: usize = 20;

/// Per-analysis knobs.
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    pub mode: ScoreMode,
    pub limit: Option<usize>,
    pub include_folders: bool,
    /// Re-query history with rename tracking for the top-ranked files.
    /// Doubles history cost for those files; off by default.
    pub follow_renames: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        AnalysisOptions {
            mode: ScoreMode::Hot,
            limit: None,
            include_folders: false,
            follow_renames: false,
        }
    }
}

/// Side-channel diagnostics for one analysis.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    pub maxima: ChannelMaxima,
    pub workers: usize,
    pub duration_ms: u64,
    pub cache_hit: bool,
}

/// A completed analysis, owned by the caller.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub window: Window,
    pub mode: ScoreMode,
    pub files: Vec<FileResult>,
    pub folders: Option<Vec<FolderResult>>,
    pub diagnostics: Diagnostics,
}

/// Collected metrics for one window, before scoring.
///
/// The comparator scores two batches against shared maxima, so collection
/// and scoring are separate stages.
#[derive(Debug, Clone)]
pub struct MetricBatch {
    pub window: Window,
    pub frame: AggregateFrame,
    pub metrics: Vec<FileMetrics>,
    pub maxima: ChannelMaxima,
    pub cache_hit: bool,
}

/// The scoring and aggregation engine.
pub struct AnalysisEngine {
    provider: Arc<dyn HistoryProvider>,
    cache: CacheHandle,
    filter: FileFilter,
    weights: ModeWeights,
    aggregate_options: AggregateOptions,
    workers: usize,
}

impl AnalysisEngine {
    pub fn new(
        provider: Arc<dyn HistoryProvider>,
        cache: CacheHandle,
        filter: FileFilter,
        weights: ModeWeights,
        aggregate_options: AggregateOptions,
        workers: usize,
    ) -> Self {
        AnalysisEngine {
            provider,
            cache,
            filter,
            weights,
            aggregate_options,
            workers: if workers == 0 {
                pool::default_workers()
            } else {
                workers
            },
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn weights(&self) -> &ModeWeights {
        &self.weights
    }

    /// Run the full pipeline for one window.
    pub fn analyze(
        &self,
        repo_root: &Path,
        git_ref: &str,
        window: Window,
        options: &AnalysisOptions,
        cancel: &CancelToken,
    ) -> Result<Analysis> {
        let started = Instant::now();
        let batch = self.collect(repo_root, git_ref, window, cancel)?;
        let files = self.score_batch(&batch, batch.maxima, options.mode);
        let mut ranked = rank::rank(&files, options.limit);

        if options.follow_renames {
            if let Some(refined) =
                self.refine_follow(repo_root, &batch, &ranked, options, cancel)?
            {
                ranked = refined;
            }
        }

        let folders = if options.include_folders {
            Some(folder::aggregate_folders(&ranked, &batch.frame))
        } else {
            None
        };

        cancel.check()?;
        Ok(Analysis {
            window: batch.window,
            mode: options.mode,
            files: ranked,
            folders,
            diagnostics: Diagnostics {
                maxima: batch.maxima,
                workers: self.workers,
                duration_ms: started.elapsed().as_millis() as u64,
                cache_hit: batch.cache_hit,
            },
        })
    }

    /// Stages 1-2: aggregate (through the cache) and assemble metrics.
    pub fn collect(
        &self,
        repo_root: &Path,
        git_ref: &str,
        window: Window,
        cancel: &CancelToken,
    ) -> Result<MetricBatch> {
        let window = window.truncate();
        let head = self
            .provider
            .resolve_ref(repo_root, git_ref)
            .context("failed to resolve analysis reference")?;

        let key = cache::cache_key(
            PROVIDER_SCHEMA_VERSION,
            &head.hash,
            window,
            &self.filter.path_filter,
        );
        let (frame, cache_hit) = match cache::load_frame(self.cache.as_ref(), &key) {
            Some(frame) => (frame, true),
            None => {
                let stream = self.provider.stream_commits(repo_root, window, cancel)?;
                let frame =
                    aggregate::fold_commits(stream, window, self.aggregate_options, cancel)?;
                cache::store_frame(self.cache.as_ref(), &key, &frame);
                (frame, false)
            }
        };
        cancel.check()?;

        let listing = self
            .provider
            .list_files(repo_root, git_ref)
            .context("failed to list files at analysis reference")?;
        let candidates = self.filter.candidates(&frame, &listing);
        let metrics =
            pool::build_metrics_parallel(repo_root, &candidates, &frame, self.workers, cancel)?;
        let maxima = ChannelMaxima::from_batch(&metrics);

        Ok(MetricBatch {
            window,
            frame,
            metrics,
            maxima,
            cache_hit,
        })
    }

    /// Stage 3: score a batch against the given maxima.
    ///
    /// Maxima are a parameter (not taken from the batch) so comparison runs
    /// can put both sides on one scale.
    pub fn score_batch(
        &self,
        batch: &MetricBatch,
        maxima: ChannelMaxima,
        mode: ScoreMode,
    ) -> Vec<FileResult> {
        let normalizer = Normalizer::new(maxima);
        batch
            .metrics
            .iter()
            .map(|m| {
                let scores = scoring::score_file(m, &normalizer, &self.weights);
                FileResult::new(m, mode, &scores)
            })
            .collect()
    }

    /// Follow-rename refinement for the top-ranked files.
    ///
    /// Re-queries each file's history with rename tracking, merges the
    /// per-name aggregates into one, rebuilds those files' metrics, and
    /// rescores the whole batch (maxima may have moved).
    fn refine_follow(
        &self,
        repo_root: &Path,
        batch: &MetricBatch,
        ranked: &[FileResult],
        options: &AnalysisOptions,
        cancel: &CancelToken,
    ) -> Result<Option<Vec<FileResult>>> {
        let targets: Vec<&str> = ranked
            .iter()
            .take(FOLLOW_TOP_K)
            .map(|r| r.path.as_str())
            .collect();
        if targets.is_empty() {
            return Ok(None);
        }

        let refined: Vec<(String, FileAggregate)> = targets
            .par_iter()
            .filter_map(|path| {
                if cancel.is_cancelled() {
                    return None;
                }
                match self.follow_one(repo_root, path, batch.window, cancel) {
                    Ok(Some(agg)) => Some((path.to_string(), agg)),
                    Ok(None) => None,
                    Err(e) => {
                        log::warn!("follow refinement failed for {}: {:#}", path, e);
                        None
                    }
                }
            })
            .collect();
        cancel.check()?;

        let mut refined_batch = batch.clone();
        for (path, agg) in refined {
            refined_batch.frame.files.insert(path.clone(), agg);
            if let Some(slot) = refined_batch.metrics.iter_mut().find(|m| m.path == path) {
                match metrics::build_file_metrics(
                    repo_root,
                    &path,
                    refined_batch.frame.files.get(&path),
                    refined_batch.window.end,
                ) {
                    Ok(rebuilt) => *slot = rebuilt,
                    Err(e) => log::warn!("skipping refined metrics for {}: {:#}", path, e),
                }
            }
        }
        refined_batch.maxima = ChannelMaxima::from_batch(&refined_batch.metrics);

        let files = self.score_batch(&refined_batch, refined_batch.maxima, options.mode);
        Ok(Some(rank::rank(&files, options.limit)))
    }

    /// One follow-mode history query, merged across the file's past names.
    fn follow_one(
        &self,
        repo_root: &Path,
        path: &str,
        window: Window,
        cancel: &CancelToken,
    ) -> Result<Option<FileAggregate>> {
        let stream = self
            .provider
            .stream_file_history(repo_root, path, window, true, cancel)?;
        let frame = aggregate::fold_commits(stream, window, self.aggregate_options, cancel)?;
        if frame.files.is_empty() {
            return Ok(None);
        }

        // Every entry in this frame is a historical name of the same file;
        // merge them into one aggregate keyed by the current path.
        let mut merged: Option<FileAggregate> = None;
        for agg in frame.files.into_values() {
            match merged.as_mut() {
                None => merged = Some(agg),
                Some(m) => {
                    m.commits += agg.commits;
                    m.churn += agg.churn;
                    m.first_seen = m.first_seen.min(agg.first_seen);
                    m.recent_commits += agg.recent_commits;
                    m.recent_churn += agg.recent_churn;
                    for (author, count) in agg.contributors {
                        *m.contributors.entry(author).or_insert(0) += count;
                    }
                }
            }
        }
        Ok(merged)
    }
}

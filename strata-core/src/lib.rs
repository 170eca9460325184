//! Strata core library - git-history mining and per-file risk scoring

#![deny(warnings)]

// Global invariants enforced in this crate:
// - Scores are deterministic for a fixed repository state and window
// - Final orderings are total (score desc, commits desc, path asc)
// - The cache never changes results, only how they are computed
// - No hidden global state; the cache handle is threaded explicitly

pub mod aggregate;
pub mod cache;
pub mod cancel;
pub mod compare;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod folder;
pub mod metrics;
pub mod normalize;
pub mod pool;
pub mod provider;
pub mod rank;
pub mod report;
pub mod runlog;
pub mod scoring;
pub mod timeseries;
pub mod window;

pub use cancel::CancelToken;
pub use config::ResolvedConfig;
pub use engine::{Analysis, AnalysisEngine, AnalysisOptions};
pub use report::{render_csv, render_json, render_text, FileResult};
pub use scoring::ScoreMode;
pub use window::Window;

use std::sync::Arc;

use anyhow::Result;

/// Wire an engine from resolved configuration: git-CLI provider plus the
/// configured cache backend. Build once per process and reuse.
pub fn build_engine(config: &ResolvedConfig) -> Result<AnalysisEngine> {
    let cache = cache::open(&config.cache)?;
    Ok(AnalysisEngine::new(
        Arc::new(provider::GitCliProvider::new()),
        cache,
        config.filter.clone(),
        config.weights.clone(),
        aggregate::AggregateOptions {
            include_binary: config.include_binary,
        },
        config.workers,
    ))
}

//! Configuration file support.
//!
//! Loads project-specific configuration from JSON files.
//!
//! Search order:
//! 1. Explicit path (--config CLI flag)
//! 2. `.stratarc.json` in the repository root
//! 3. `strata.config.json` in the repository root
//!
//! All fields are optional. CLI flags take precedence over config file
//! values. Validation happens entirely at load time; a config that loads is
//! a config that never fails mid-analysis.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::cache::CacheBackend;
use crate::error::CoreError;
use crate::filter::FileFilter;
use crate::normalize::Channel;
use crate::scoring::{ModeWeights, ScoreMode};

/// Default on-disk cache location, relative to the repository root.
pub const DEFAULT_CACHE_PATH: &str = ".strata/cache.sqlite";

static MYSQL_DSN_RE: OnceLock<Regex> = OnceLock::new();

/// MySQL DSN shape: `<user>:<pass>@tcp(<host>:<port>)/<dbname>`.
fn mysql_dsn_re() -> &'static Regex {
    MYSQL_DSN_RE.get_or_init(|| {
        Regex::new(r"^[^:@]+:[^@]*@tcp\([^:()]+:\d+\)/[A-Za-z0-9_.-]+$").unwrap()
    })
}

/// Strata configuration loaded from a JSON config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrataConfig {
    /// Path prefix limiting the analysis scope (empty = whole repository).
    #[serde(default)]
    pub path_filter: Option<String>,

    /// Exclude patterns: prefix (`dir/`), suffix (`.min.js`), basename glob
    /// (`*.generated.rs`), or substring.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Per-mode channel weight overrides. A supplied mode replaces that
    /// mode's defaults entirely and must sum to 1.0 (+/- 0.001).
    #[serde(default)]
    pub weights: Option<BTreeMap<String, BTreeMap<String, f64>>>,

    /// Cache backend selection.
    #[serde(default)]
    pub cache: Option<CacheConfig>,

    /// Worker pool size (default: host parallelism).
    #[serde(default)]
    pub workers: Option<usize>,

    /// Maximum number of results to show.
    #[serde(default)]
    pub top: Option<usize>,

    /// Default scoring mode.
    #[serde(default)]
    pub mode: Option<String>,

    /// Count binary-file commits with zero churn (true) or drop them (false).
    #[serde(default)]
    pub include_binary: Option<bool>,

    /// Enable the rename-tracking refinement pass for top-ranked files.
    #[serde(default)]
    pub follow_renames: Option<bool>,
}

/// Cache backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// One of `sqlite`, `memory`, `mysql`, `postgres`.
    pub backend: String,
    /// Database file path (sqlite only; default `.strata/cache.sqlite`).
    #[serde(default)]
    pub path: Option<String>,
    /// Connection string (mysql/postgres only).
    #[serde(default)]
    pub url: Option<String>,
}

/// Resolved configuration with compiled patterns and validated weights.
#[derive(Debug)]
pub struct ResolvedConfig {
    pub filter: FileFilter,
    pub weights: ModeWeights,
    pub cache: CacheBackend,
    pub workers: usize,
    pub top: Option<usize>,
    pub mode: ScoreMode,
    pub include_binary: bool,
    pub follow_renames: bool,
    /// Path the config was loaded from (None if defaults).
    pub config_path: Option<PathBuf>,
}

impl StrataConfig {
    /// Validate the configuration for logical errors.
    pub fn validate(&self) -> Result<()> {
        if let Some(mode) = &self.mode {
            if ScoreMode::parse(mode).is_none() {
                return Err(CoreError::Config(format!(
                    "mode must be one of hot|risk|complexity|stale (got {})",
                    mode
                ))
                .into());
            }
        }
        if let Some(workers) = self.workers {
            if workers == 0 {
                return Err(
                    CoreError::Config("workers must be at least 1".to_string()).into(),
                );
            }
        }
        if let Some(top) = self.top {
            if top == 0 {
                return Err(CoreError::Config("top must be at least 1".to_string()).into());
            }
        }

        // Weight maps are validated by actually building them.
        self.build_weights()?;

        // Exclude patterns must classify/compile.
        FileFilter::new(self.path_filter.as_deref().unwrap_or(""), &self.exclude)?;

        if let Some(cache) = &self.cache {
            resolve_cache(cache)?;
        }
        Ok(())
    }

    fn build_weights(&self) -> Result<ModeWeights> {
        let mut weights = ModeWeights::default();
        if let Some(overrides) = &self.weights {
            for (mode_name, channel_map) in overrides {
                let mode = ScoreMode::parse(mode_name).ok_or_else(|| {
                    CoreError::Config(format!("unknown mode in weights: {}", mode_name))
                })?;
                let mut map = BTreeMap::new();
                for (channel_name, &weight) in channel_map {
                    let channel = Channel::parse(channel_name).ok_or_else(|| {
                        CoreError::Config(format!(
                            "unknown channel in weights.{}: {}",
                            mode_name, channel_name
                        ))
                    })?;
                    map.insert(channel, weight);
                }
                weights.override_mode(mode, map)?;
            }
        }
        Ok(weights)
    }

    /// Resolve into a validated, compiled form.
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        let weights = self.build_weights()?;
        let filter = FileFilter::new(self.path_filter.as_deref().unwrap_or(""), &self.exclude)?;
        let cache = match &self.cache {
            Some(cache) => resolve_cache(cache)?,
            None => CacheBackend::Sqlite(PathBuf::from(DEFAULT_CACHE_PATH)),
        };
        let mode = match &self.mode {
            Some(name) => ScoreMode::parse(name).ok_or_else(|| {
                CoreError::Config(format!("unknown mode: {}", name))
            })?,
            None => ScoreMode::Hot,
        };
        if let Some(0) = self.workers {
            return Err(CoreError::Config("workers must be at least 1".to_string()).into());
        }
        Ok(ResolvedConfig {
            filter,
            weights,
            cache,
            workers: self.workers.unwrap_or(0),
            top: self.top,
            mode,
            include_binary: self.include_binary.unwrap_or(true),
            follow_renames: self.follow_renames.unwrap_or(false),
            config_path: None,
        })
    }
}

impl ResolvedConfig {
    /// Resolved config with all defaults (no config file).
    pub fn defaults() -> Result<Self> {
        StrataConfig::default().resolve()
    }
}

fn resolve_cache(cache: &CacheConfig) -> Result<CacheBackend> {
    match cache.backend.as_str() {
        "sqlite" => Ok(CacheBackend::Sqlite(PathBuf::from(
            cache.path.as_deref().unwrap_or(DEFAULT_CACHE_PATH),
        ))),
        "memory" => Ok(CacheBackend::Memory),
        "mysql" => {
            let url = cache.url.as_deref().ok_or_else(|| {
                CoreError::Config("cache.url is required for the mysql backend".to_string())
            })?;
            if !mysql_dsn_re().is_match(url) {
                return Err(CoreError::Config(format!(
                    "mysql connection string must match <user>:<pass>@tcp(<host>:<port>)/<dbname> (got {})",
                    url
                ))
                .into());
            }
            Ok(CacheBackend::MySql(url.to_string()))
        }
        "postgres" => {
            let url = cache.url.as_deref().ok_or_else(|| {
                CoreError::Config("cache.url is required for the postgres backend".to_string())
            })?;
            if !url.contains("host=") || !url.contains("dbname=") {
                return Err(CoreError::Config(format!(
                    "postgres connection string must contain host= and dbname= (got {})",
                    url
                ))
                .into());
            }
            Ok(CacheBackend::Postgres(url.to_string()))
        }
        other => Err(CoreError::Config(format!(
            "cache.backend must be one of sqlite|memory|mysql|postgres (got {})",
            other
        ))
        .into()),
    }
}

/// Discover a config file in the repository root.
///
/// Returns `None` if no config file is found (use defaults).
pub fn discover_config(repo_root: &Path) -> Result<Option<(StrataConfig, PathBuf)>> {
    for name in [".stratarc.json", "strata.config.json"] {
        let path = repo_root.join(name);
        if path.exists() {
            let config = load_config_file(&path)?;
            return Ok(Some((config, path)));
        }
    }
    Ok(None)
}

/// Load config from an explicit file path.
pub fn load_config_file(path: &Path) -> Result<StrataConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let config: StrataConfig = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;

    config
        .validate()
        .with_context(|| format!("invalid config in: {}", path.display()))?;

    Ok(config)
}

/// Load and resolve config for a repository.
///
/// If `config_path` is provided, loads from that file. Otherwise discovers
/// config from the repository root, falling back to defaults.
pub fn load_and_resolve(repo_root: &Path, config_path: Option<&Path>) -> Result<ResolvedConfig> {
    let (config, source_path) = if let Some(path) = config_path {
        (load_config_file(path)?, Some(path.to_path_buf()))
    } else {
        match discover_config(repo_root)? {
            Some((config, path)) => (config, Some(path)),
            None => (StrataConfig::default(), None),
        }
    };

    let mut resolved = config.resolve()?;
    // Anchor a relative sqlite path at the repository root.
    if let CacheBackend::Sqlite(path) = &resolved.cache {
        if path.is_relative() {
            resolved.cache = CacheBackend::Sqlite(repo_root.join(path));
        }
    }
    resolved.config_path = source_path;
    Ok(resolved)
}

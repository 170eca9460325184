//! Strata CLI - git-history risk analysis (hot, risk, complexity, stale)

#![deny(warnings)]

// Global invariants enforced:
// - Deterministic output ordering
// - Windows default to the analyzed ref's own timestamp, not wall clock,
//   so re-running on the same commit reproduces the same output

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use strata_core::cache::{self, CacheBackend};
use strata_core::compare::{self, ComparisonSide};
use strata_core::config;
use strata_core::engine::AnalysisOptions;
use strata_core::folder;
use strata_core::provider::{GitCliProvider, HistoryProvider};
use strata_core::runlog::RunLog;
use strata_core::timeseries;
use strata_core::{build_engine, CancelToken, ScoreMode, Window};

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Mine git history into per-file risk scores, folder rollups, comparisons, and time series")]
#[command(version = env!("STRATA_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score every active file in a history window
    Analyze {
        /// Path to the repository (or any path inside it)
        path: PathBuf,

        /// Reference to analyze
        #[arg(long = "ref", default_value = "HEAD")]
        git_ref: String,

        /// Window length in days, ending at the ref's timestamp
        #[arg(long, default_value = "90")]
        days: u64,

        /// Window end as a Unix timestamp (default: the ref's timestamp)
        #[arg(long)]
        until: Option<i64>,

        /// Scoring mode (overrides config file)
        #[arg(long)]
        mode: Option<ModeArg>,

        /// Show only top N results (overrides config file)
        #[arg(long)]
        top: Option<usize>,

        /// Include the folder rollup
        #[arg(long)]
        folders: bool,

        /// Track renames for the top-ranked files (second history pass)
        #[arg(long)]
        follow: bool,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,

        /// Path to config file (default: auto-discover)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Record this run into the run log for later export
        #[arg(long)]
        log_run: bool,
    },
    /// Compare two references' history windows
    Compare {
        /// Path to the repository
        path: PathBuf,

        /// Base reference
        #[arg(long)]
        base: String,

        /// Target reference
        #[arg(long, default_value = "HEAD")]
        target: String,

        /// Window length in days, anchored at each ref's timestamp
        #[arg(long, default_value = "90")]
        days: u64,

        /// Scoring mode
        #[arg(long)]
        mode: Option<ModeArg>,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,

        /// Path to config file (default: auto-discover)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Track one file's score across consecutive windows
    Timeseries {
        /// Path to the repository
        path: PathBuf,

        /// Repository-relative file to track
        file: String,

        /// Total interval length in days
        #[arg(long, default_value = "180")]
        days: u64,

        /// Number of windows
        #[arg(long, default_value = "6")]
        points: usize,

        /// Scoring mode
        #[arg(long)]
        mode: Option<ModeArg>,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,

        /// Path to config file (default: auto-discover)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Inspect or clear the aggregate cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// List or export recorded runs
    Runs {
        #[command(subcommand)]
        action: RunsAction,
    },
    /// Validate or show configuration
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show backend, entry count, and size
    Status {
        /// Path to the repository
        path: PathBuf,
        /// Path to config file (default: auto-discover)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Drop every cached frame
    Clear {
        /// Path to the repository
        path: PathBuf,
        /// Path to config file (default: auto-discover)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum RunsAction {
    /// List recorded runs
    List {
        /// Path to the repository
        path: PathBuf,
    },
    /// Export one run's per-file rows as CSV
    Export {
        /// Path to the repository
        path: PathBuf,
        /// Run id (see `strata runs list`)
        #[arg(long)]
        run: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate a config file without running analysis
    Validate {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Show the resolved configuration (merged defaults + config file)
    Show {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Csv,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ModeArg {
    Hot,
    Risk,
    Complexity,
    Stale,
}

impl From<ModeArg> for ScoreMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Hot => ScoreMode::Hot,
            ModeArg::Risk => ScoreMode::Risk,
            ModeArg::Complexity => ScoreMode::Complexity,
            ModeArg::Stale => ScoreMode::Stale,
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        let _ = ctrlc::set_handler(move || cancel.cancel());
    }

    let cli = Cli::parse();
    match cli.command {
        Commands::Analyze {
            path,
            git_ref,
            days,
            until,
            mode,
            top,
            folders,
            follow,
            format,
            config: config_path,
            log_run,
        } => {
            let repo_root = find_repo_root(&normalize_cli_path(&path)?)?;
            let resolved = config::load_and_resolve(&repo_root, config_path.as_deref())
                .context("failed to load configuration")?;
            if let Some(config_path) = &resolved.config_path {
                eprintln!("Using config: {}", config_path.display());
            }

            let engine = build_engine(&resolved)?;
            let window = anchor_window(&repo_root, &git_ref, until, days)?;
            let options = AnalysisOptions {
                mode: mode.map(Into::into).unwrap_or(resolved.mode),
                limit: top.or(resolved.top),
                include_folders: folders,
                follow_renames: follow || resolved.follow_renames,
            };

            let started_at = epoch_now();
            let analysis = engine.analyze(&repo_root, &git_ref, window, &options, &cancel)?;
            eprintln!(
                "{} files in {} ms ({} workers, cache {})",
                analysis.files.len(),
                analysis.diagnostics.duration_ms,
                analysis.diagnostics.workers,
                if analysis.diagnostics.cache_hit {
                    "hit"
                } else {
                    "miss"
                },
            );

            if log_run {
                let run_log = RunLog::open(&repo_root.join(".strata/runlog.sqlite"))?;
                let run_id = format!("{}-{}-{}", git_ref, window.start, window.end);
                let config_json = serde_json::json!({
                    "ref": git_ref,
                    "days": days,
                    "mode": options.mode.as_str(),
                })
                .to_string();
                run_log.record(&run_id, started_at, &analysis, &config_json)?;
                eprintln!("Recorded run {}", run_id);
            }

            match format {
                OutputFormat::Text => {
                    print!("{}", strata_core::render_text(&analysis.files));
                    if let Some(folders) = &analysis.folders {
                        println!();
                        print!("{}", folder::render_text(folders));
                    }
                }
                OutputFormat::Json => {
                    println!("{}", strata_core::render_json(&analysis.files));
                }
                OutputFormat::Csv => {
                    print!("{}", strata_core::render_csv(&analysis.files));
                }
            }
        }
        Commands::Compare {
            path,
            base,
            target,
            days,
            mode,
            format,
            config: config_path,
        } => {
            let repo_root = find_repo_root(&normalize_cli_path(&path)?)?;
            let resolved = config::load_and_resolve(&repo_root, config_path.as_deref())
                .context("failed to load configuration")?;
            let engine = build_engine(&resolved)?;

            let base_side = ComparisonSide {
                window: anchor_window(&repo_root, &base, None, days)?,
                git_ref: base,
            };
            let target_side = ComparisonSide {
                window: anchor_window(&repo_root, &target, None, days)?,
                git_ref: target,
            };
            let mode = mode.map(Into::into).unwrap_or(resolved.mode);

            let comparison = compare::compare(
                &engine,
                &repo_root,
                &base_side,
                &target_side,
                mode,
                &cancel,
            )?;
            match format {
                OutputFormat::Text => print!("{}", compare::render_text(&comparison)),
                OutputFormat::Json => println!("{}", comparison.to_json()?),
                OutputFormat::Csv => {
                    anyhow::bail!("CSV output is not supported for compare (use text or json)")
                }
            }
        }
        Commands::Timeseries {
            path,
            file,
            days,
            points,
            mode,
            format,
            config: config_path,
        } => {
            let repo_root = find_repo_root(&normalize_cli_path(&path)?)?;
            let resolved = config::load_and_resolve(&repo_root, config_path.as_deref())
                .context("failed to load configuration")?;
            let engine = build_engine(&resolved)?;
            let mode = mode.map(Into::into).unwrap_or(resolved.mode);
            let interval = anchor_window(&repo_root, "HEAD", None, days)?;

            let progress = ProgressBar::new_spinner();
            progress.set_style(
                ProgressStyle::with_template("{spinner} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            progress.set_message(format!("analyzing {} windows", points));
            progress.enable_steady_tick(std::time::Duration::from_millis(120));

            let series = timeseries::timeseries(
                &engine, &repo_root, "HEAD", &file, interval, points, mode, &cancel,
            );
            progress.finish_and_clear();
            let series = series?;

            match format {
                OutputFormat::Text => print!("{}", timeseries::render_text(&series)),
                OutputFormat::Json => println!("{}", series.to_json()?),
                OutputFormat::Csv => {
                    println!("path,label,start,end,score,owners");
                    for point in &series.points {
                        println!(
                            "{},{},{},{},{:.2},{}",
                            strata_core::report::csv_field(&point.path),
                            point.label,
                            point.start,
                            point.end,
                            point.score,
                            strata_core::report::csv_field(&point.owners.join(";")),
                        );
                    }
                }
            }
        }
        Commands::Cache { action } => match action {
            CacheAction::Status { path, config } => {
                let (cache, _) = open_configured_cache(&path, config.as_deref())?;
                let status = cache.status()?;
                println!("Backend:  {}", status.backend);
                println!("Connected: {}", status.connected);
                println!("Entries:  {}", status.entry_count);
                println!("Bytes:    {}", status.bytes);
                println!("Oldest:   {}", format_epoch(status.oldest));
                println!("Newest:   {}", format_epoch(status.newest));
            }
            CacheAction::Clear { path, config } => {
                let (cache, _) = open_configured_cache(&path, config.as_deref())?;
                let dropped = cache.clear()?;
                println!("Dropped {} cache entries", dropped);
            }
        },
        Commands::Runs { action } => match action {
            RunsAction::List { path } => {
                let repo_root = find_repo_root(&normalize_cli_path(&path)?)?;
                let run_log = RunLog::open(&repo_root.join(".strata/runlog.sqlite"))?;
                let runs = run_log.runs()?;
                if runs.is_empty() {
                    println!("No recorded runs.");
                }
                for run in runs {
                    println!(
                        "{}  files={}  duration={}ms  started={}",
                        run.run_id,
                        run.total_files,
                        run.duration_ms,
                        format_epoch(Some(run.started_at)),
                    );
                }
            }
            RunsAction::Export { path, run } => {
                let repo_root = find_repo_root(&normalize_cli_path(&path)?)?;
                let run_log = RunLog::open(&repo_root.join(".strata/runlog.sqlite"))?;
                print!("{}", run_log.export_csv(&run)?);
            }
        },
        Commands::Config { action } => match action {
            ConfigAction::Validate { path } => {
                let project_root = std::env::current_dir()?;
                match config::load_and_resolve(&project_root, path.as_deref()) {
                    Ok(resolved) => {
                        if let Some(ref p) = resolved.config_path {
                            println!("Config valid: {}", p.display());
                        } else {
                            println!("No config file found. Using defaults.");
                        }
                    }
                    Err(e) => {
                        eprintln!("Config validation failed: {:#}", e);
                        std::process::exit(1);
                    }
                }
            }
            ConfigAction::Show { path } => {
                let project_root = std::env::current_dir()?;
                let resolved = config::load_and_resolve(&project_root, path.as_deref())
                    .context("failed to load configuration")?;

                println!("Configuration:");
                if let Some(ref p) = resolved.config_path {
                    println!("  Source: {}", p.display());
                } else {
                    println!("  Source: defaults (no config file found)");
                }
                println!();
                println!("Mode: {}", resolved.mode);
                println!("Workers: {}", describe_workers(resolved.workers));
                println!(
                    "Top: {}",
                    resolved
                        .top
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "all".to_string())
                );
                println!("Cache: {}", describe_backend(&resolved.cache));
                println!(
                    "Path filter: {}",
                    if resolved.filter.path_filter.is_empty() {
                        "(none)"
                    } else {
                        &resolved.filter.path_filter
                    }
                );
                println!("Excludes: {}", resolved.filter.excludes.len());
                println!("Include binary: {}", resolved.include_binary);
                println!("Follow renames: {}", resolved.follow_renames);
                println!();
                println!("Weights:");
                for mode in ScoreMode::ALL {
                    let parts: Vec<String> = resolved
                        .weights
                        .for_mode(mode)
                        .iter()
                        .map(|(channel, weight)| format!("{}={}", channel, weight))
                        .collect();
                    println!("  {}: {}", mode, parts.join(" "));
                }
            }
        },
    }

    Ok(())
}

/// Build a window of `days` ending at `until`, defaulting to the ref's own
/// author timestamp so repeated runs on one commit are reproducible.
fn anchor_window(
    repo_root: &Path,
    git_ref: &str,
    until: Option<i64>,
    days: u64,
) -> anyhow::Result<Window> {
    let end = match until {
        Some(end) => end,
        None => {
            GitCliProvider::new()
                .resolve_ref(repo_root, git_ref)
                .with_context(|| format!("failed to resolve {}", git_ref))?
                .author_time
        }
    };
    // Align the end to the next hour boundary strictly past the anchor, so
    // truncation cannot push the anchor commit out of the half-open window.
    let end_aligned = (end.div_euclid(3600) + 1) * 3600;
    Window::last_days(end_aligned, days)
}

fn open_configured_cache(
    path: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<(cache::CacheHandle, PathBuf)> {
    let repo_root = find_repo_root(&normalize_cli_path(path)?)?;
    let resolved = config::load_and_resolve(&repo_root, config_path)
        .context("failed to load configuration")?;
    Ok((cache::open(&resolved.cache)?, repo_root))
}

fn describe_backend(backend: &CacheBackend) -> String {
    match backend {
        CacheBackend::Sqlite(path) => format!("sqlite ({})", path.display()),
        CacheBackend::Memory => "memory".to_string(),
        CacheBackend::MySql(_) => "mysql (host-supplied)".to_string(),
        CacheBackend::Postgres(_) => "postgres (host-supplied)".to_string(),
    }
}

fn describe_workers(workers: usize) -> String {
    if workers == 0 {
        "auto".to_string()
    } else {
        workers.to_string()
    }
}

fn epoch_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn format_epoch(epoch: Option<i64>) -> String {
    match epoch {
        Some(ts) => ts.to_string(),
        None => "-".to_string(),
    }
}

fn normalize_cli_path(path: &Path) -> anyhow::Result<PathBuf> {
    let normalized = if path.is_relative() {
        std::env::current_dir()?.join(path)
    } else {
        path.to_path_buf()
    };
    if !normalized.exists() {
        anyhow::bail!("Path does not exist: {}", normalized.display());
    }
    Ok(normalized)
}

/// Find git repository root by searching up the directory tree
fn find_repo_root(start_path: &Path) -> anyhow::Result<PathBuf> {
    let mut current = if start_path.is_file() {
        start_path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("invalid file path"))?
            .to_path_buf()
    } else {
        start_path.to_path_buf()
    };

    loop {
        if current.join(".git").exists() {
            return Ok(current);
        }
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => anyhow::bail!("not in a git repository (no .git directory found)"),
        }
    }
}

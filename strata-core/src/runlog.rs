//! Analysis run log: per-run and per-file records for export.
//!
//! Optional side output. Each recorded run gets a row in `runs` and one row
//! per file in `run_files` carrying the raw metrics and all four mode
//! scores, so downstream tooling can re-rank without re-analyzing.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use crate::engine::Analysis;
use crate::report::csv_field;
use crate::scoring::ScoreMode;

/// SQLite-backed run log.
pub struct RunLog {
    conn: Mutex<Connection>,
}

/// Per-run record.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub run_id: String,
    pub started_at: i64,
    pub finished_at: i64,
    pub duration_ms: u64,
    pub total_files: u64,
    pub config_json: String,
}

impl RunLog {
    /// Open (or create) the run log database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create run log directory: {}", parent.display())
            })?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open run log: {}", path.display()))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS runs (
                run_id      TEXT PRIMARY KEY,
                started_at  INTEGER NOT NULL,
                finished_at INTEGER NOT NULL,
                duration_ms INTEGER NOT NULL,
                total_files INTEGER NOT NULL,
                config_json TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS run_files (
                run_id       TEXT NOT NULL,
                path         TEXT NOT NULL,
                commits      INTEGER NOT NULL,
                churn        INTEGER NOT NULL,
                contributors INTEGER NOT NULL,
                age_days     INTEGER NOT NULL,
                size_bytes   INTEGER NOT NULL,
                loc          INTEGER NOT NULL,
                gini         REAL NOT NULL,
                hot          REAL NOT NULL,
                risk         REAL NOT NULL,
                complexity   REAL NOT NULL,
                stale        REAL NOT NULL,
                label        TEXT NOT NULL,
                PRIMARY KEY (run_id, path)
            );",
        )
        .context("failed to create run log schema")?;
        Ok(RunLog {
            conn: Mutex::new(conn),
        })
    }

    /// Record one completed analysis.
    pub fn record(&self, run_id: &str, started_at: i64, analysis: &Analysis, config_json: &str) -> Result<()> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| anyhow::anyhow!("run log lock poisoned"))?;
        let tx = conn.transaction().context("failed to begin run log write")?;
        tx.execute(
            "INSERT OR REPLACE INTO runs
             (run_id, started_at, finished_at, duration_ms, total_files, config_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run_id,
                started_at,
                started_at + analysis.diagnostics.duration_ms as i64 / 1000,
                analysis.diagnostics.duration_ms,
                analysis.files.len() as u64,
                config_json,
            ],
        )?;
        for file in &analysis.files {
            tx.execute(
                "INSERT OR REPLACE INTO run_files
                 (run_id, path, commits, churn, contributors, age_days, size_bytes, loc, gini,
                  hot, risk, complexity, stale, label)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    run_id,
                    file.path,
                    file.metrics.commits,
                    file.metrics.churn,
                    file.metrics.unique_contributors,
                    file.metrics.age_days,
                    file.metrics.size_bytes,
                    file.metrics.lines_of_code,
                    file.metrics.gini,
                    score_or_zero(file, ScoreMode::Hot),
                    score_or_zero(file, ScoreMode::Risk),
                    score_or_zero(file, ScoreMode::Complexity),
                    score_or_zero(file, ScoreMode::Stale),
                    file.mode.as_str(),
                ],
            )?;
        }
        tx.commit().context("failed to commit run log write")
    }

    /// All recorded runs, newest first.
    pub fn runs(&self) -> Result<Vec<RunRecord>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow::anyhow!("run log lock poisoned"))?;
        let mut stmt = conn.prepare(
            "SELECT run_id, started_at, finished_at, duration_ms, total_files, config_json
             FROM runs ORDER BY started_at DESC, run_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(RunRecord {
                    run_id: row.get(0)?,
                    started_at: row.get(1)?,
                    finished_at: row.get(2)?,
                    duration_ms: row.get(3)?,
                    total_files: row.get(4)?,
                    config_json: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Export one run's file rows as CSV.
    pub fn export_csv(&self, run_id: &str) -> Result<String> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow::anyhow!("run log lock poisoned"))?;
        let mut stmt = conn.prepare(
            "SELECT path, commits, churn, contributors, age_days, size_bytes, loc, gini,
                    hot, risk, complexity, stale, label
             FROM run_files WHERE run_id = ?1 ORDER BY path",
        )?;
        let mut output = String::from(
            "path,commits,churn,contributors,age_days,size_bytes,loc,gini,hot,risk,complexity,stale,label\n",
        );
        let rows = stmt.query_map(params![run_id], |row| {
            Ok(format!(
                "{},{},{},{},{},{},{},{:.4},{:.2},{:.2},{:.2},{:.2},{}",
                csv_field(&row.get::<_, String>(0)?),
                row.get::<_, u64>(1)?,
                row.get::<_, u64>(2)?,
                row.get::<_, u64>(3)?,
                row.get::<_, u64>(4)?,
                row.get::<_, u64>(5)?,
                row.get::<_, u64>(6)?,
                row.get::<_, f64>(7)?,
                row.get::<_, f64>(8)?,
                row.get::<_, f64>(9)?,
                row.get::<_, f64>(10)?,
                row.get::<_, f64>(11)?,
                row.get::<_, String>(12)?,
            ))
        })?;
        for row in rows {
            output.push_str(&row?);
            output.push('\n');
        }
        Ok(output)
    }
}

fn score_or_zero(file: &crate::report::FileResult, mode: ScoreMode) -> f64 {
    file.all_scores.get(&mode).copied().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Diagnostics;
    use crate::normalize::ChannelMaxima;
    use crate::report::{FileResult, MetricsReport};
    use crate::window::Window;
    use std::collections::BTreeMap;

    fn sample_analysis() -> Analysis {
        let file = FileResult {
            rank: 1,
            path: "src/a.rs".to_string(),
            mode: ScoreMode::Hot,
            score: 42.0,
            breakdown: BTreeMap::new(),
            metrics: MetricsReport {
                commits: 3,
                churn: 30,
                unique_contributors: 2,
                age_days: 5,
                size_bytes: 100,
                lines_of_code: 40,
                gini: 0.2,
                recent_commits: 1,
                recent_churn: 4,
            },
            owners: vec!["amy".to_string()],
            all_scores: BTreeMap::from([
                (ScoreMode::Hot, 42.0),
                (ScoreMode::Risk, 13.0),
                (ScoreMode::Complexity, 7.5),
                (ScoreMode::Stale, 2.0),
            ]),
            debuffed: false,
        };
        Analysis {
            window: Window::new(0, 3600).unwrap(),
            mode: ScoreMode::Hot,
            files: vec![file],
            folders: None,
            diagnostics: Diagnostics {
                maxima: ChannelMaxima::default(),
                workers: 2,
                duration_ms: 1234,
                cache_hit: false,
            },
        }
    }

    #[test]
    fn test_record_and_list_runs() {
        let dir = tempfile::tempdir().unwrap();
        let log = RunLog::open(&dir.path().join("runlog.sqlite")).unwrap();
        log.record("run-1", 1_700_000_000, &sample_analysis(), "{}")
            .unwrap();

        let runs = log.runs().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_id, "run-1");
        assert_eq!(runs[0].total_files, 1);
        assert_eq!(runs[0].duration_ms, 1234);
    }

    #[test]
    fn test_export_csv_contains_all_four_scores() {
        let dir = tempfile::tempdir().unwrap();
        let log = RunLog::open(&dir.path().join("runlog.sqlite")).unwrap();
        log.record("run-1", 1_700_000_000, &sample_analysis(), "{}")
            .unwrap();

        let csv = log.export_csv("run-1").unwrap();
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("path,commits"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("src/a.rs,3,30,2,5,100,40,0.2000,42.00,13.00,7.50,2.00,hot"));
    }

    #[test]
    fn test_rerecording_same_run_id_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let log = RunLog::open(&dir.path().join("runlog.sqlite")).unwrap();
        log.record("run-1", 100, &sample_analysis(), "{}").unwrap();
        log.record("run-1", 200, &sample_analysis(), "{}").unwrap();
        let runs = log.runs().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].started_at, 200);
    }
}

//! Commit history extraction.
//!
//! Uses git CLI directly (no libgit2) for portability. Commit streams are
//! finite, not restartable, and parsed incrementally from the subprocess so
//! cancellation can kill an in-flight `git log`.

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};

use anyhow::{Context, Result};

use crate::cancel::CancelToken;
use crate::error::CoreError;
use crate::window::Window;

/// Version stamp for the provider's output schema; part of every cache key.
///
/// Bump when the parsed commit shape changes so stale cache entries are
/// treated as misses instead of being misread.
pub const PROVIDER_SCHEMA_VERSION: u32 = 1;

/// One file touched by a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: String,
    pub added: u64,
    pub deleted: u64,
    /// True when git reported `-` numstat markers (binary content).
    /// Added/deleted are coerced to 0 in that case.
    pub binary: bool,
}

/// One commit with its per-file churn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub hash: String,
    pub author: String,
    pub author_time: i64,
    pub files: Vec<FileChange>,
}

/// A resolved reference: commit hash plus its author timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefInfo {
    pub hash: String,
    pub author_time: i64,
}

/// Source of raw history for the engine.
///
/// Implementations must be safe for concurrent use across distinct windows.
pub trait HistoryProvider: Send + Sync {
    /// Stream commits whose author-time may fall in `window`, newest first.
    ///
    /// The stream is a best-effort pre-filter; the aggregator re-checks
    /// author-times against the window.
    fn stream_commits(
        &self,
        repo_root: &Path,
        window: Window,
        cancel: &CancelToken,
    ) -> Result<CommitStream>;

    /// All paths tracked at `git_ref`.
    fn list_files(&self, repo_root: &Path, git_ref: &str) -> Result<Vec<String>>;

    /// Resolve a reference to a commit hash and author timestamp.
    fn resolve_ref(&self, repo_root: &Path, git_ref: &str) -> Result<RefInfo>;

    /// Per-file history for the rename-tracking refinement pass.
    fn stream_file_history(
        &self,
        repo_root: &Path,
        path: &str,
        window: Window,
        follow: bool,
        cancel: &CancelToken,
    ) -> Result<CommitStream>;
}

/// History provider backed by the `git` executable.
#[derive(Debug, Default, Clone)]
pub struct GitCliProvider;

impl GitCliProvider {
    pub fn new() -> Self {
        GitCliProvider
    }
}

/// Execute a git command in a repository and return the trimmed stdout.
fn git_at(repo_root: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .current_dir(repo_root)
        .args(args)
        .output()
        .context("failed to invoke git")?;

    if !output.status.success() {
        return Err(CoreError::Provider(format!(
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr).trim()
        ))
        .into());
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

impl HistoryProvider for GitCliProvider {
    fn stream_commits(
        &self,
        repo_root: &Path,
        window: Window,
        cancel: &CancelToken,
    ) -> Result<CommitStream> {
        let since = format!("--since={}", window.start);
        let until = format!("--until={}", window.end);
        let args = vec![
            "log".to_string(),
            "--numstat".to_string(),
            "--no-renames".to_string(),
            format!("--pretty=format:{}", COMMIT_HEADER_FORMAT),
            since,
            until,
        ];
        CommitStream::spawn(repo_root, args, cancel.clone())
    }

    fn list_files(&self, repo_root: &Path, git_ref: &str) -> Result<Vec<String>> {
        let output = git_at(repo_root, &["ls-tree", "-r", "--name-only", git_ref])
            .with_context(|| format!("failed to list files at {}", git_ref))?;
        Ok(output
            .lines()
            .filter(|line| !line.is_empty())
            .map(normalize_path)
            .collect())
    }

    fn resolve_ref(&self, repo_root: &Path, git_ref: &str) -> Result<RefInfo> {
        let hash = git_at(repo_root, &["rev-parse", git_ref])
            .with_context(|| format!("failed to resolve ref {}", git_ref))?;
        let author_time = git_at(repo_root, &["show", "-s", "--format=%at", &hash])
            .with_context(|| format!("failed to read author time of {}", hash))?
            .parse::<i64>()
            .context("failed to parse author timestamp")?;
        Ok(RefInfo { hash, author_time })
    }

    fn stream_file_history(
        &self,
        repo_root: &Path,
        path: &str,
        window: Window,
        follow: bool,
        cancel: &CancelToken,
    ) -> Result<CommitStream> {
        let mut args = vec![
            "log".to_string(),
            "--numstat".to_string(),
            format!("--pretty=format:{}", COMMIT_HEADER_FORMAT),
            format!("--since={}", window.start),
            format!("--until={}", window.end),
        ];
        if follow {
            args.push("--follow".to_string());
        }
        args.push("--".to_string());
        args.push(path.to_string());
        CommitStream::spawn(repo_root, args, cancel.clone())
    }
}

// Header line: "commit<TAB>hash<TAB>author<TAB>author-epoch"
const COMMIT_HEADER_FORMAT: &str = "commit%x09%H%x09%an%x09%at";

/// Incremental parser over a `git log --numstat` subprocess.
///
/// Yields one `CommitRecord` per commit header. The child process is killed
/// on drop, so abandoning the stream (cancellation, mid-stream error) does
/// not leak a subprocess.
pub struct CommitStream {
    child: Child,
    lines: std::io::Lines<BufReader<ChildStdout>>,
    pending: Option<CommitRecord>,
    cancel: CancelToken,
    done: bool,
}

impl CommitStream {
    fn spawn(repo_root: &Path, args: Vec<String>, cancel: CancelToken) -> Result<Self> {
        let mut child = Command::new("git")
            .current_dir(repo_root)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .context("failed to spawn git log")?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CoreError::Provider("git log produced no stdout handle".to_string()))?;
        Ok(CommitStream {
            child,
            lines: BufReader::new(stdout).lines(),
            pending: None,
            cancel,
            done: false,
        })
    }

    fn finish(&mut self) -> Result<()> {
        self.done = true;
        let status = self.child.wait().context("failed to wait for git log")?;
        if !status.success() {
            return Err(CoreError::Provider(format!("git log exited with {}", status)).into());
        }
        Ok(())
    }

    fn next_record(&mut self) -> Result<Option<CommitRecord>> {
        loop {
            if self.cancel.is_cancelled() {
                let _ = self.child.kill();
                let _ = self.child.wait();
                self.done = true;
                return Err(CoreError::Cancelled.into());
            }
            let line = match self.lines.next() {
                Some(line) => line.context("failed to read git log output")?,
                None => {
                    self.finish()?;
                    return Ok(self.pending.take());
                }
            };
            if let Some(rest) = line.strip_prefix("commit\t") {
                let record = parse_commit_header(rest)?;
                if let Some(finished) = self.pending.replace(record) {
                    return Ok(Some(finished));
                }
            } else if !line.trim().is_empty() {
                if let Some(current) = self.pending.as_mut() {
                    if let Some(change) = parse_numstat_line(&line) {
                        current.files.push(change);
                    }
                }
            }
        }
    }
}

impl Iterator for CommitStream {
    type Item = Result<CommitRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done && self.pending.is_none() {
            return None;
        }
        self.next_record().transpose()
    }
}

impl Drop for CommitStream {
    fn drop(&mut self) {
        if !self.done {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

fn parse_commit_header(rest: &str) -> Result<CommitRecord> {
    // hash<TAB>author<TAB>epoch; author names may not contain tabs
    let mut parts = rest.splitn(3, '\t');
    let hash = parts
        .next()
        .ok_or_else(|| CoreError::Provider("malformed commit header".to_string()))?;
    let author = parts
        .next()
        .ok_or_else(|| CoreError::Provider("commit header missing author".to_string()))?;
    let epoch = parts
        .next()
        .ok_or_else(|| CoreError::Provider("commit header missing timestamp".to_string()))?;
    let author_time = epoch
        .trim()
        .parse::<i64>()
        .with_context(|| format!("failed to parse author timestamp: {}", epoch))?;
    Ok(CommitRecord {
        hash: hash.to_string(),
        author: author.to_string(),
        author_time,
        files: Vec::new(),
    })
}

/// Parse one `--numstat` line: `<added>\t<deleted>\t<path>`.
///
/// Binary files show `-\t-\t<path>`; churn is coerced to 0 but the touch
/// still counts. Unparseable lines are dropped.
fn parse_numstat_line(line: &str) -> Option<FileChange> {
    let mut parts = line.splitn(3, '\t');
    let added_str = parts.next()?;
    let deleted_str = parts.next()?;
    let raw_path = parts.next()?.trim();
    if raw_path.is_empty() {
        return None;
    }

    let binary = added_str == "-" || deleted_str == "-";
    let added = if binary { 0 } else { added_str.parse().ok()? };
    let deleted = if binary { 0 } else { deleted_str.parse().ok()? };

    Some(FileChange {
        path: normalize_numstat_path(raw_path),
        added,
        deleted,
        binary,
    })
}

/// Normalize a repository-relative path: forward slashes, no leading `./`.
pub fn normalize_path(path: &str) -> String {
    let forward = path.replace('\\', "/");
    forward
        .strip_prefix("./")
        .map(str::to_string)
        .unwrap_or(forward)
}

/// Resolve git's rename notation to the post-rename path.
///
/// Handles both `old => new` and the brace form `dir/{old => new}/file`.
/// With `--no-renames` these rarely appear, but `--follow` streams use them.
fn normalize_numstat_path(raw: &str) -> String {
    if let (Some(open), Some(close)) = (raw.find('{'), raw.find('}')) {
        if open < close {
            let inner = &raw[open + 1..close];
            if let Some((_, new)) = inner.split_once(" => ") {
                let mut resolved = String::new();
                resolved.push_str(&raw[..open]);
                resolved.push_str(new);
                resolved.push_str(&raw[close + 1..]);
                return normalize_path(&resolved.replace("//", "/"));
            }
        }
    }
    if let Some((_, new)) = raw.split_once(" => ") {
        return normalize_path(new);
    }
    normalize_path(raw)
}

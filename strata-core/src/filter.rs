//! Candidate-set selection: path filter, exclude patterns, activity gating.
//!
//! Exclude patterns are classified once at config-load time into a tagged
//! variant list, not re-parsed per file.

use anyhow::{Context, Result};
use globset::{Glob, GlobMatcher};

use crate::aggregate::AggregateFrame;

/// One exclude rule, classified from its raw form:
///
/// - trailing `/` -> path prefix (`vendor/`)
/// - leading `.` with no separator or glob -> extension suffix (`.min.js`)
/// - glob metacharacters -> basename glob (`*.generated.rs`)
/// - anything else -> substring
#[derive(Debug, Clone)]
pub enum ExcludePattern {
    Prefix(String),
    Suffix(String),
    Glob(GlobMatcher),
    Substring(String),
}

impl ExcludePattern {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.ends_with('/') {
            return Ok(ExcludePattern::Prefix(raw.to_string()));
        }
        let has_glob_meta = raw.contains(['*', '?', '[']);
        if raw.starts_with('.') && !raw.contains('/') && !has_glob_meta {
            return Ok(ExcludePattern::Suffix(raw.to_string()));
        }
        if has_glob_meta {
            let matcher = Glob::new(raw)
                .with_context(|| format!("invalid exclude pattern: {}", raw))?
                .compile_matcher();
            return Ok(ExcludePattern::Glob(matcher));
        }
        Ok(ExcludePattern::Substring(raw.to_string()))
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            ExcludePattern::Prefix(prefix) => path.starts_with(prefix.as_str()),
            ExcludePattern::Suffix(suffix) => path.ends_with(suffix.as_str()),
            ExcludePattern::Glob(matcher) => {
                let basename = path.rsplit('/').next().unwrap_or(path);
                matcher.is_match(basename)
            }
            ExcludePattern::Substring(needle) => path.contains(needle.as_str()),
        }
    }
}

/// Filter configuration applied to every analysis.
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    /// Path prefix; empty accepts all paths.
    pub path_filter: String,
    pub excludes: Vec<ExcludePattern>,
}

impl FileFilter {
    pub fn new(path_filter: &str, exclude_patterns: &[String]) -> Result<Self> {
        let excludes = exclude_patterns
            .iter()
            .map(|raw| ExcludePattern::parse(raw))
            .collect::<Result<Vec<_>>>()?;
        Ok(FileFilter {
            path_filter: path_filter.to_string(),
            excludes,
        })
    }

    fn in_scope(&self, path: &str) -> bool {
        self.path_filter.is_empty() || path.starts_with(self.path_filter.as_str())
    }

    fn excluded(&self, path: &str) -> bool {
        self.excludes.iter().any(|pattern| pattern.matches(path))
    }

    /// Produce the candidate set from the aggregate frame and the file
    /// listing at the target reference.
    ///
    /// Rules, in order: path prefix filter; exclude list; presence in the
    /// listing; activity gate (at least one commit in the window, unless a
    /// non-empty path filter puts the file in scope regardless).
    pub fn candidates(&self, frame: &AggregateFrame, listing: &[String]) -> Vec<String> {
        let mut out: Vec<String> = listing
            .iter()
            .filter(|path| self.in_scope(path))
            .filter(|path| !self.excluded(path))
            .filter(|path| {
                let active = frame
                    .files
                    .get(path.as_str())
                    .map(|agg| agg.commits >= 1)
                    .unwrap_or(false);
                active || !self.path_filter.is_empty()
            })
            .cloned()
            .collect();
        out.sort();
        out.dedup();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::FileAggregate;
    use crate::window::Window;
    use std::collections::BTreeMap;

    fn frame_with(paths: &[&str]) -> AggregateFrame {
        let mut files = BTreeMap::new();
        for path in paths {
            files.insert(
                path.to_string(),
                FileAggregate {
                    commits: 1,
                    churn: 1,
                    contributors: BTreeMap::from([("a".to_string(), 1)]),
                    first_seen: 0,
                    recent_commits: 0,
                    recent_churn: 0,
                },
            );
        }
        AggregateFrame {
            window: Window::new(0, 3600).unwrap(),
            files,
        }
    }

    #[test]
    fn test_pattern_classification() {
        assert!(matches!(
            ExcludePattern::parse("vendor/").unwrap(),
            ExcludePattern::Prefix(_)
        ));
        assert!(matches!(
            ExcludePattern::parse(".min.js").unwrap(),
            ExcludePattern::Suffix(_)
        ));
        assert!(matches!(
            ExcludePattern::parse("*.min.js").unwrap(),
            ExcludePattern::Glob(_)
        ));
        assert!(matches!(
            ExcludePattern::parse("generated").unwrap(),
            ExcludePattern::Substring(_)
        ));
    }

    #[test]
    fn test_prefix_matches_directory() {
        let p = ExcludePattern::parse("vendor/").unwrap();
        assert!(p.matches("vendor/lib.js"));
        assert!(!p.matches("src/vendor.rs"));
    }

    #[test]
    fn test_suffix_matches_extension() {
        let p = ExcludePattern::parse(".min.js").unwrap();
        assert!(p.matches("dist/app.min.js"));
        assert!(!p.matches("dist/app.js"));
    }

    #[test]
    fn test_glob_matches_basename_only() {
        let p = ExcludePattern::parse("*.min.js").unwrap();
        assert!(p.matches("deep/nested/app.min.js"));
        assert!(!p.matches("deep/nested/app.js"));
    }

    #[test]
    fn test_substring_matches_anywhere() {
        let p = ExcludePattern::parse("generated").unwrap();
        assert!(p.matches("src/generated/types.rs"));
        assert!(p.matches("src/proto_generated.rs"));
        assert!(!p.matches("src/types.rs"));
    }

    #[test]
    fn test_candidates_require_listing_presence() {
        let frame = frame_with(&["deleted.rs", "kept.rs"]);
        let filter = FileFilter::new("", &[]).unwrap();
        let listing = vec!["kept.rs".to_string()];
        assert_eq!(filter.candidates(&frame, &listing), vec!["kept.rs"]);
    }

    #[test]
    fn test_candidates_require_activity_without_path_filter() {
        let frame = frame_with(&["active.rs"]);
        let filter = FileFilter::new("", &[]).unwrap();
        let listing = vec!["active.rs".to_string(), "idle.rs".to_string()];
        assert_eq!(filter.candidates(&frame, &listing), vec!["active.rs"]);
    }

    #[test]
    fn test_path_filter_admits_idle_files_in_scope() {
        let frame = frame_with(&["src/active.rs"]);
        let filter = FileFilter::new("src/", &[]).unwrap();
        let listing = vec![
            "src/active.rs".to_string(),
            "src/idle.rs".to_string(),
            "docs/idle.md".to_string(),
        ];
        assert_eq!(
            filter.candidates(&frame, &listing),
            vec!["src/active.rs", "src/idle.rs"]
        );
    }

    #[test]
    fn test_excludes_applied_before_activity() {
        let frame = frame_with(&["vendor/dep.js", "src/app.rs"]);
        let filter = FileFilter::new("", &["vendor/".to_string()]).unwrap();
        let listing = vec!["vendor/dep.js".to_string(), "src/app.rs".to_string()];
        assert_eq!(filter.candidates(&frame, &listing), vec!["src/app.rs"]);
    }
}

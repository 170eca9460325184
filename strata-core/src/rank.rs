//! Top-K selection with a stable total order.

use crate::report::FileResult;

/// Rank results by `(score desc, commits desc, path asc)` and keep the top
/// `limit`. Assigns 1-based ranks. Does not mutate its input.
pub fn rank(results: &[FileResult], limit: Option<usize>) -> Vec<FileResult> {
    let mut ranked: Vec<FileResult> = results.to_vec();
    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.metrics.commits.cmp(&a.metrics.commits))
            .then_with(|| a.path.cmp(&b.path))
    });
    if let Some(limit) = limit {
        ranked.truncate(limit);
    }
    for (i, result) in ranked.iter_mut().enumerate() {
        result.rank = i + 1;
    }
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::MetricsReport;
    use crate::scoring::ScoreMode;
    use std::collections::BTreeMap;

    fn result(path: &str, score: f64, commits: u64) -> FileResult {
        FileResult {
            rank: 0,
            path: path.to_string(),
            mode: ScoreMode::Hot,
            score,
            breakdown: BTreeMap::new(),
            metrics: MetricsReport {
                commits,
                churn: 0,
                unique_contributors: 1,
                age_days: 0,
                size_bytes: 0,
                lines_of_code: 0,
                gini: 0.0,
                recent_commits: 0,
                recent_churn: 0,
            },
            owners: vec![],
            all_scores: BTreeMap::new(),
            debuffed: false,
        }
    }

    #[test]
    fn test_orders_by_score_descending() {
        let ranked = rank(
            &[result("a", 10.0, 1), result("b", 90.0, 1), result("c", 50.0, 1)],
            None,
        );
        let paths: Vec<&str> = ranked.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["b", "c", "a"]);
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[2].rank, 3);
    }

    #[test]
    fn test_score_tie_broken_by_commits_then_path() {
        let ranked = rank(
            &[
                result("z.go", 50.0, 3),
                result("a.go", 50.0, 3),
                result("m.go", 50.0, 9),
            ],
            None,
        );
        let paths: Vec<&str> = ranked.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["m.go", "a.go", "z.go"]);
    }

    #[test]
    fn test_full_tie_orders_by_path() {
        // Identical scores and commits: a.go ranks before z.go.
        let ranked = rank(&[result("z.go", 50.0, 3), result("a.go", 50.0, 3)], None);
        assert_eq!(ranked[0].path, "a.go");
        assert_eq!(ranked[1].path, "z.go");
    }

    #[test]
    fn test_limit_truncates() {
        let ranked = rank(
            &[result("a", 1.0, 0), result("b", 2.0, 0), result("c", 3.0, 0)],
            Some(2),
        );
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].path, "c");
    }

    #[test]
    fn test_input_not_mutated() {
        let input = vec![result("a", 1.0, 0), result("b", 2.0, 0)];
        let _ = rank(&input, Some(1));
        assert_eq!(input[0].path, "a");
        assert_eq!(input[0].rank, 0);
    }
}

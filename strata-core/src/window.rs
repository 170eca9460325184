//! Analysis windows over commit author-time.
//!
//! Windows are half-open `[start, end)` and always truncated to a 1-hour
//! granularity before they reach the engine; every cache key derives from the
//! truncated form. Truncation is idempotent.

use anyhow::Result;
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Truncation granularity applied before caching, in seconds.
pub const TRUNCATION_GRANULARITY_SECS: i64 = 3600;

const SECS_PER_DAY: i64 = 24 * 60 * 60;

/// Time window over commit author-times, in Unix seconds.
///
/// Membership is half-open: a commit at exactly `end` belongs to the next
/// window, which keeps consecutive time-series windows disjoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    pub start: i64,
    pub end: i64,
}

impl Window {
    /// Create a window. Fails if `start > end`.
    pub fn new(start: i64, end: i64) -> Result<Self> {
        if start > end {
            return Err(CoreError::Config(format!(
                "window start ({}) must not be after end ({})",
                start, end
            ))
            .into());
        }
        Ok(Window { start, end })
    }

    /// The last `days` days ending at `end`.
    pub fn last_days(end: i64, days: u64) -> Result<Self> {
        Window::new(end - days as i64 * SECS_PER_DAY, end)
    }

    /// Floor both endpoints to the hour. Idempotent.
    pub fn truncate(&self) -> Window {
        Window {
            start: floor_to_hour(self.start),
            end: floor_to_hour(self.end),
        }
    }

    pub fn contains(&self, ts: i64) -> bool {
        ts >= self.start && ts < self.end
    }

    pub fn duration_secs(&self) -> i64 {
        self.end - self.start
    }

    /// Start of the "recent tail": the last 30% of the window.
    ///
    /// Commits at or after this instant count toward `recent_commits` and
    /// `recent_churn` in the aggregate frame.
    pub fn recent_tail_start(&self) -> i64 {
        self.end - (self.duration_secs() as f64 * 0.3).round() as i64
    }

    /// Split the window into `points` equal consecutive sub-windows.
    ///
    /// Boundaries are truncated to the hour, so the slices stay pairwise
    /// disjoint and cover the truncated window. Each slice must span at
    /// least one truncation granule.
    pub fn slices(&self, points: usize) -> Result<Vec<Window>> {
        if points == 0 {
            return Err(CoreError::Config("point count must be at least 1".to_string()).into());
        }
        let slice_len = self.duration_secs() / points as i64;
        if slice_len < TRUNCATION_GRANULARITY_SECS {
            return Err(CoreError::Config(format!(
                "window of {}s cannot be split into {} slices of at least one hour",
                self.duration_secs(),
                points
            ))
            .into());
        }
        let mut windows = Vec::with_capacity(points);
        for i in 0..points {
            let start = floor_to_hour(self.start + i as i64 * slice_len);
            let end = if i + 1 == points {
                floor_to_hour(self.end)
            } else {
                floor_to_hour(self.start + (i + 1) as i64 * slice_len)
            };
            windows.push(Window { start, end });
        }
        Ok(windows)
    }

    /// Human-readable label, e.g. `2026-03-01..2026-04-15`.
    pub fn label(&self) -> String {
        format!("{}..{}", format_day(self.start), format_day(self.end))
    }
}

fn floor_to_hour(ts: i64) -> i64 {
    ts.div_euclid(TRUNCATION_GRANULARITY_SECS) * TRUNCATION_GRANULARITY_SECS
}

fn format_day(ts: i64) -> String {
    match Utc.timestamp_opt(ts, 0) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d").to_string(),
        _ => ts.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_inverted_window() {
        assert!(Window::new(100, 50).is_err());
    }

    #[test]
    fn test_truncation_floors_to_hour() {
        let w = Window::new(7250, 10900).unwrap();
        let t = w.truncate();
        assert_eq!(t.start, 7200);
        assert_eq!(t.end, 10800);
    }

    #[test]
    fn test_truncation_is_idempotent() {
        let w = Window::new(1_700_000_123, 1_700_123_456).unwrap();
        let once = w.truncate();
        assert_eq!(once.truncate(), once);
    }

    #[test]
    fn test_membership_is_half_open() {
        let w = Window::new(3600, 7200).unwrap();
        assert!(w.contains(3600));
        assert!(w.contains(7199));
        assert!(!w.contains(7200));
    }

    #[test]
    fn test_recent_tail_is_last_30_percent() {
        let w = Window::new(0, 1000).unwrap();
        assert_eq!(w.recent_tail_start(), 700);
    }

    #[test]
    fn test_slices_180d_into_4() {
        // Matches the documented time-series shape: 4 windows of 45 days.
        let end = 1_717_200_000; // hour-aligned
        let w = Window::last_days(end, 180).unwrap();
        let slices = w.slices(4).unwrap();
        assert_eq!(slices.len(), 4);
        let day = 24 * 3600;
        assert_eq!(slices[0].start, end - 180 * day);
        assert_eq!(slices[1].start, end - 135 * day);
        assert_eq!(slices[2].start, end - 90 * day);
        assert_eq!(slices[3].start, end - 45 * day);
        assert_eq!(slices[3].end, end);
        for pair in slices.windows(2) {
            assert_eq!(pair[0].end, pair[1].start, "slices must tile the window");
        }
    }

    #[test]
    fn test_slices_disjoint_after_truncation() {
        let w = Window::new(1_700_000_123, 1_700_000_123 + 10 * 24 * 3600).unwrap();
        let slices = w.slices(3).unwrap();
        for pair in slices.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
        // Slices cover the truncated parent window.
        assert_eq!(slices[0].start, w.truncate().start);
        assert_eq!(slices.last().unwrap().end, w.truncate().end);
    }

    #[test]
    fn test_slices_too_fine_rejected() {
        let w = Window::new(0, 3 * 3600).unwrap();
        assert!(w.slices(12).is_err());
    }

    #[test]
    fn test_label_formats_utc_days() {
        let w = Window::new(0, 86_400).unwrap();
        assert_eq!(w.label(), "1970-01-01..1970-01-02");
    }
}

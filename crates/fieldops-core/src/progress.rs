//! Job progress derived from a start/end date range.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Length of one day in epoch milliseconds.
pub const DAY_MILLIS: i64 = 86_400_000;

/// Start/end pair in epoch milliseconds. Ordering is not enforced here;
/// `compute_progress` treats a missing bound or `start >= end` as degenerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeSpan {
    pub start_millis: Option<i64>,
    pub end_millis: Option<i64>,
}

impl TimeSpan {
    pub fn new(start_millis: Option<i64>, end_millis: Option<i64>) -> Self {
        Self {
            start_millis,
            end_millis,
        }
    }

    pub fn from_dates(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self::new(
            start.map(|d| d.timestamp_millis()),
            end.map(|d| d.timestamp_millis()),
        )
    }

    /// Whole days covered by the span, rounded up. `None` when degenerate.
    pub fn total_days(&self) -> Option<i64> {
        match (self.start_millis, self.end_millis) {
            (Some(start), Some(end)) if start < end => {
                let span = end.saturating_sub(start);
                Some(span / DAY_MILLIS + i64::from(span % DAY_MILLIS != 0))
            }
            _ => None,
        }
    }

    pub fn progress_at(&self, now_millis: i64) -> ProgressResult {
        compute_progress(self.start_millis, self.end_millis, now_millis)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ProgressResult {
    pub progress_percentage: f64,
    pub elapsed_days: i64,
    pub days_left: i64,
}

impl ProgressResult {
    pub const ZERO: Self = Self {
        progress_percentage: 0.0,
        elapsed_days: 0,
        days_left: 0,
    };

    /// Percentage rounded to the nearest whole number, for display.
    pub fn rounded_percentage(&self) -> u8 {
        self.progress_percentage.round().clamp(0.0, 100.0) as u8
    }
}

/// Derive elapsed days, days remaining and a clamped completion percentage.
///
/// Total days round up and elapsed days round down, so a same-day job counts as
/// one day and partially elapsed days are not counted. Missing bounds or
/// `start >= end` yield [`ProgressResult::ZERO`]; nothing here can fail.
pub fn compute_progress(
    start_millis: Option<i64>,
    end_millis: Option<i64>,
    now_millis: i64,
) -> ProgressResult {
    let span = TimeSpan::new(start_millis, end_millis);
    let (Some(start), Some(total_days)) = (start_millis, span.total_days()) else {
        return ProgressResult::ZERO;
    };

    let elapsed_days = now_millis
        .saturating_sub(start)
        .div_euclid(DAY_MILLIS)
        .max(0);
    let days_left = total_days.saturating_sub(elapsed_days).max(0);
    let progress_percentage =
        ((elapsed_days as f64 / total_days as f64) * 100.0).clamp(0.0, 100.0);

    ProgressResult {
        progress_percentage,
        elapsed_days,
        days_left,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY0: i64 = 1_767_225_600_000; // 2026-01-01T00:00:00Z

    fn days(n: i64) -> i64 {
        n * DAY_MILLIS
    }

    #[test]
    fn ten_day_job_on_day_three() {
        let result = compute_progress(Some(DAY0), Some(DAY0 + days(10)), DAY0 + days(3));
        assert_eq!(result.elapsed_days, 3);
        assert_eq!(result.days_left, 7);
        assert_eq!(result.progress_percentage, 30.0);
    }

    #[test]
    fn degenerate_inputs_yield_zero_regardless_of_now() {
        for now in [i64::MIN, 0, DAY0, DAY0 + days(400), i64::MAX] {
            assert_eq!(compute_progress(None, Some(DAY0), now), ProgressResult::ZERO);
            assert_eq!(compute_progress(Some(DAY0), None, now), ProgressResult::ZERO);
            assert_eq!(compute_progress(None, None, now), ProgressResult::ZERO);
            assert_eq!(compute_progress(Some(DAY0), Some(DAY0), now), ProgressResult::ZERO);
            assert_eq!(
                compute_progress(Some(DAY0 + days(2)), Some(DAY0), now),
                ProgressResult::ZERO
            );
        }
    }

    #[test]
    fn before_start_reports_nothing_elapsed() {
        for offset in [0, 1, DAY_MILLIS - 1, days(30)] {
            let result = compute_progress(Some(DAY0), Some(DAY0 + days(5)), DAY0 - offset);
            assert_eq!(result.progress_percentage, 0.0);
            assert_eq!(result.elapsed_days, 0);
            assert_eq!(result.days_left, 5);
        }
    }

    #[test]
    fn at_or_after_end_reports_complete() {
        for span_days in [1, 2, 7, 31, 365] {
            let end = DAY0 + days(span_days);
            for now in [end, end + 1, end + days(90)] {
                let result = compute_progress(Some(DAY0), Some(end), now);
                assert_eq!(result.progress_percentage, 100.0);
                assert_eq!(result.days_left, 0);
            }
        }
    }

    #[test]
    fn elapsed_plus_left_covers_total_inside_span() {
        let end = DAY0 + days(12);
        let mut now = DAY0;
        while now <= end {
            let result = compute_progress(Some(DAY0), Some(end), now);
            assert_eq!(result.elapsed_days + result.days_left, 12);
            now += DAY_MILLIS / 3;
        }
    }

    #[test]
    fn same_day_job_counts_as_one_day() {
        let end = DAY0 + 4 * 3_600_000;
        let span = TimeSpan::new(Some(DAY0), Some(end));
        assert_eq!(span.total_days(), Some(1));

        let during = span.progress_at(DAY0 + 3_600_000);
        assert_eq!(during.elapsed_days, 0);
        assert_eq!(during.days_left, 1);
        assert_eq!(during.progress_percentage, 0.0);
    }

    #[test]
    fn partial_day_spans_keep_asymmetric_rounding() {
        // 36 hours: total rounds up to 2, elapsed at the end floors to 1.
        let end = DAY0 + 36 * 3_600_000;
        let at_end = compute_progress(Some(DAY0), Some(end), end);
        assert_eq!(at_end.elapsed_days, 1);
        assert_eq!(at_end.days_left, 1);
        assert_eq!(at_end.progress_percentage, 50.0);

        // Long after the end elapsed keeps growing; the clamp and floor hide it.
        let later = compute_progress(Some(DAY0), Some(end), DAY0 + days(5));
        assert_eq!(later.elapsed_days, 5);
        assert_eq!(later.days_left, 0);
        assert_eq!(later.progress_percentage, 100.0);
    }

    #[test]
    fn identical_inputs_give_identical_results() {
        let a = compute_progress(Some(DAY0), Some(DAY0 + days(9)), DAY0 + days(4) + 17);
        let b = compute_progress(Some(DAY0), Some(DAY0 + days(9)), DAY0 + days(4) + 17);
        assert_eq!(a, b);
        assert_eq!(a.progress_percentage.to_bits(), b.progress_percentage.to_bits());
    }

    #[test]
    fn from_dates_uses_epoch_millis() {
        let start = DateTime::parse_from_rfc3339("2026-03-01T00:00:00Z")
            .expect("ts")
            .with_timezone(&Utc);
        let end = DateTime::parse_from_rfc3339("2026-03-05T00:00:00Z")
            .expect("ts")
            .with_timezone(&Utc);
        let span = TimeSpan::from_dates(Some(start), Some(end));
        assert_eq!(span.total_days(), Some(4));
        assert_eq!(span.progress_at(end.timestamp_millis()).rounded_percentage(), 100);
        assert_eq!(TimeSpan::from_dates(None, Some(end)).total_days(), None);
    }
}

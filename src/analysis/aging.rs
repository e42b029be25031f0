//! Issue-aging time series.
//!
//! Splits a trailing window before the reference date into fixed-width
//! intervals and counts, per interval, how many issues were open at some
//! point during it.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the aging aggregator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgingError {
    #[error("issue opened on {opened_on} but closed on {closed_on}")]
    DataIntegrity {
        opened_on: NaiveDate,
        closed_on: NaiveDate,
    },

    #[error("interval width must be positive, got {0} days")]
    InvalidWindow(i64),

    #[error("lookback of {0} days reaches outside the supported date range")]
    LookbackOutOfRange(i64),
}

/// Open/close span of a single issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueLifetime {
    pub opened_on: NaiveDate,
    /// `None` while the issue is still open.
    pub closed_on: Option<NaiveDate>,
}

impl IssueLifetime {
    pub fn new(opened_on: NaiveDate, closed_on: Option<NaiveDate>) -> Self {
        Self {
            opened_on,
            closed_on,
        }
    }

    /// The issue as it stood on `as_of`: `None` before it was opened, and
    /// still open if it was closed later.
    pub fn as_known_on(&self, as_of: NaiveDate) -> Option<Self> {
        if self.opened_on > as_of {
            return None;
        }
        Some(Self::new(
            self.opened_on,
            self.closed_on.filter(|closed_on| *closed_on <= as_of),
        ))
    }

    /// Close date, with still-open issues closing on `as_of`.
    pub fn closed_or(&self, as_of: NaiveDate) -> NaiveDate {
        self.closed_on.unwrap_or(as_of)
    }
}

/// One bucket of the trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Interval width and total lookback horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgingWindow {
    pub interval_width: Duration,
    pub lookback: Duration,
}

impl AgingWindow {
    pub fn weeks(interval_weeks: u32, lookback_weeks: u32) -> Self {
        Self {
            interval_width: Duration::weeks(i64::from(interval_weeks)),
            lookback: Duration::weeks(i64::from(lookback_weeks)),
        }
    }
}

impl Default for AgingWindow {
    fn default() -> Self {
        Self::weeks(1, 26)
    }
}

/// A single point of the series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgingPoint {
    /// End date of the interval.
    pub date: NaiveDate,
    /// Issues open during the interval.
    pub open: usize,
}

/// Chronological open-issue counts per interval.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgingSeries {
    pub points: Vec<AgingPoint>,
}

impl AgingSeries {
    /// Interval end dates.
    pub fn boundaries(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }

    /// Open-issue counts, parallel to `boundaries()`.
    pub fn counts(&self) -> Vec<usize> {
        self.points.iter().map(|p| p.open).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Build the intervals covering the window, oldest first.
pub fn generate_intervals(
    reference_date: NaiveDate,
    window: AgingWindow,
) -> Result<Vec<Interval>, AgingError> {
    if window.interval_width <= Duration::zero() {
        return Err(AgingError::InvalidWindow(window.interval_width.num_days()));
    }

    let horizon_start = reference_date
        .checked_sub_signed(window.lookback)
        .ok_or(AgingError::LookbackOutOfRange(window.lookback.num_days()))?;
    let mut period_end = reference_date;
    let mut period_start = reference_date.checked_sub_signed(window.interval_width);
    let mut intervals = Vec::new();

    while let Some(start) = period_start.filter(|start| *start >= horizon_start) {
        intervals.push(Interval {
            start,
            end: period_end,
        });
        period_end = start;
        period_start = start.checked_sub_signed(window.interval_width);
    }

    intervals.reverse();
    Ok(intervals)
}

/// Count open issues per interval.
///
/// An issue is counted for interval `k` when it was not opened after
/// `k.end` and was closed strictly after `k.start`. Still-open issues are
/// closed on `as_of`.
pub fn aggregate(
    issues: &[IssueLifetime],
    reference_date: NaiveDate,
    window: AgingWindow,
    as_of: NaiveDate,
) -> Result<AgingSeries, AgingError> {
    for issue in issues {
        let closed_on = issue.closed_or(as_of);
        if issue.opened_on > closed_on {
            return Err(AgingError::DataIntegrity {
                opened_on: issue.opened_on,
                closed_on,
            });
        }
    }

    let intervals = generate_intervals(reference_date, window)?;

    // The sweep only moves forward, so issues must be in opening order.
    let mut sorted = issues.to_vec();
    sorted.sort_by_key(|issue| issue.opened_on);

    let mut counts = vec![0usize; intervals.len()];
    let mut i = 0;
    for issue in &sorted {
        while i < intervals.len() && issue.opened_on > intervals[i].end {
            i += 1;
        }

        let closed_on = issue.closed_or(as_of);
        let mut j = i;
        while j < intervals.len() && closed_on > intervals[j].start {
            counts[j] += 1;
            j += 1;
        }
    }

    Ok(AgingSeries {
        points: intervals
            .iter()
            .zip(counts)
            .map(|(interval, open)| AgingPoint {
                date: interval.end,
                open,
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn two_weeks() -> AgingWindow {
        AgingWindow::weeks(1, 2)
    }

    #[test]
    fn test_empty_issue_list_keeps_boundaries() {
        let series = aggregate(&[], date(2024, 3, 1), two_weeks(), date(2024, 3, 1)).unwrap();

        assert_eq!(series.boundaries(), vec![date(2024, 2, 23), date(2024, 3, 1)]);
        assert_eq!(series.counts(), vec![0, 0]);
    }

    #[test]
    fn test_open_issue_spans_every_interval() {
        let issues = [IssueLifetime::new(date(2024, 2, 20), None)];
        let series = aggregate(&issues, date(2024, 3, 1), two_weeks(), date(2024, 3, 1)).unwrap();

        assert_eq!(series.counts(), vec![1, 1]);
    }

    #[test]
    fn test_issue_closed_inside_first_interval() {
        let issues = [IssueLifetime::new(date(2024, 2, 10), Some(date(2024, 2, 21)))];
        let series = aggregate(&issues, date(2024, 3, 1), two_weeks(), date(2024, 3, 1)).unwrap();

        assert_eq!(series.counts(), vec![1, 0]);
    }

    #[test]
    fn test_lookback_truncates_to_whole_intervals() {
        let window = AgingWindow::weeks(2, 5);
        let intervals = generate_intervals(date(2024, 3, 1), window).unwrap();

        assert_eq!(intervals.len(), 2);
        assert_eq!(intervals[0].start, date(2024, 2, 2));
        assert_eq!(intervals[1].end, date(2024, 3, 1));
    }

    #[test]
    fn test_default_window_has_26_intervals() {
        let intervals = generate_intervals(date(2024, 3, 1), AgingWindow::default()).unwrap();
        assert_eq!(intervals.len(), 26);
    }

    #[test]
    fn test_lookback_shorter_than_width_is_empty() {
        let window = AgingWindow::weeks(2, 1);
        let series = aggregate(
            &[IssueLifetime::new(date(2024, 2, 1), None)],
            date(2024, 3, 1),
            window,
            date(2024, 3, 1),
        )
        .unwrap();

        assert!(series.is_empty());
    }

    #[test]
    fn test_opened_on_interval_end_is_counted_there() {
        // Advancing needs opened_on > end, so an issue opened on the end date stays.
        let issues = [IssueLifetime::new(date(2024, 2, 23), None)];
        let series = aggregate(&issues, date(2024, 3, 1), two_weeks(), date(2024, 3, 1)).unwrap();

        assert_eq!(series.counts(), vec![1, 1]);
    }

    #[test]
    fn test_closed_on_interval_start_is_not_counted() {
        let issues = [IssueLifetime::new(date(2024, 2, 10), Some(date(2024, 2, 23)))];
        let series = aggregate(&issues, date(2024, 3, 1), two_weeks(), date(2024, 3, 1)).unwrap();

        assert_eq!(series.counts(), vec![1, 0]);
    }

    #[test]
    fn test_closed_before_window_is_not_counted() {
        let issues = [IssueLifetime::new(date(2024, 1, 1), Some(date(2024, 2, 16)))];
        let series = aggregate(&issues, date(2024, 3, 1), two_weeks(), date(2024, 3, 1)).unwrap();

        assert_eq!(series.counts(), vec![0, 0]);
    }

    #[test]
    fn test_issue_after_reference_date_is_ignored() {
        let issues = [
            IssueLifetime::new(date(2024, 2, 20), Some(date(2024, 2, 25))),
            IssueLifetime::new(date(2024, 3, 5), None),
        ];
        let series = aggregate(&issues, date(2024, 3, 1), two_weeks(), date(2024, 3, 10)).unwrap();

        assert_eq!(series.counts(), vec![1, 1]);
    }

    #[test]
    fn test_unsorted_input_is_sorted() {
        let sorted = [
            IssueLifetime::new(date(2024, 2, 10), Some(date(2024, 2, 21))),
            IssueLifetime::new(date(2024, 2, 26), None),
        ];
        let unsorted = [sorted[1], sorted[0]];

        let a = aggregate(&sorted, date(2024, 3, 1), two_weeks(), date(2024, 3, 1)).unwrap();
        let b = aggregate(&unsorted, date(2024, 3, 1), two_weeks(), date(2024, 3, 1)).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.counts(), vec![1, 1]);
    }

    #[test]
    fn test_closed_before_opened_is_rejected() {
        let issues = [IssueLifetime::new(date(2024, 2, 20), Some(date(2024, 2, 10)))];
        let err = aggregate(&issues, date(2024, 3, 1), two_weeks(), date(2024, 3, 1)).unwrap_err();

        assert_eq!(
            err,
            AgingError::DataIntegrity {
                opened_on: date(2024, 2, 20),
                closed_on: date(2024, 2, 10),
            }
        );
    }

    #[test]
    fn test_open_issue_after_as_of_is_rejected() {
        let issues = [IssueLifetime::new(date(2024, 3, 5), None)];
        let result = aggregate(&issues, date(2024, 3, 1), two_weeks(), date(2024, 3, 1));

        assert!(matches!(result, Err(AgingError::DataIntegrity { .. })));
    }

    #[test]
    fn test_as_known_on() {
        let as_of = date(2024, 2, 5);

        assert_eq!(IssueLifetime::new(date(2024, 6, 10), None).as_known_on(as_of), None);
        assert_eq!(
            IssueLifetime::new(date(2024, 1, 10), Some(date(2024, 3, 1))).as_known_on(as_of),
            Some(IssueLifetime::new(date(2024, 1, 10), None))
        );
        assert_eq!(
            IssueLifetime::new(date(2024, 1, 10), Some(date(2024, 2, 1))).as_known_on(as_of),
            Some(IssueLifetime::new(date(2024, 1, 10), Some(date(2024, 2, 1))))
        );
    }

    #[test]
    fn test_zero_width_is_rejected() {
        let window = AgingWindow::weeks(0, 26);
        assert_eq!(
            generate_intervals(date(2024, 3, 1), window),
            Err(AgingError::InvalidWindow(0))
        );
    }

    #[test]
    fn test_lookback_past_date_range_is_rejected() {
        let window = AgingWindow::weeks(1, u32::MAX);
        let result = aggregate(&[], date(2024, 3, 1), window, date(2024, 3, 1));

        assert!(matches!(result, Err(AgingError::LookbackOutOfRange(_))));
    }

    #[test]
    fn test_oversized_interval_yields_empty_series() {
        let window = AgingWindow {
            interval_width: Duration::weeks(i64::from(u32::MAX)),
            lookback: Duration::weeks(26),
        };
        let series = aggregate(&[], date(2024, 3, 1), window, date(2024, 3, 1)).unwrap();

        assert!(series.is_empty());
    }

    fn arb_lifetime() -> impl Strategy<Value = IssueLifetime> {
        (0i64..400, 0i64..120, any::<bool>()).prop_map(|(offset, length, open)| {
            let opened_on = date(2023, 6, 1) + Duration::days(offset);
            let closed_on = (!open).then(|| opened_on + Duration::days(length));
            IssueLifetime::new(opened_on, closed_on)
        })
    }

    proptest! {
        #[test]
        fn prop_intervals_are_contiguous(interval_weeks in 1u32..5, lookback_weeks in 0u32..60) {
            let window = AgingWindow::weeks(interval_weeks, lookback_weeks);
            let intervals = generate_intervals(date(2024, 3, 1), window).unwrap();

            prop_assert_eq!(intervals.len(), (lookback_weeks / interval_weeks) as usize);
            for pair in intervals.windows(2) {
                prop_assert_eq!(pair[0].end, pair[1].start);
                prop_assert!(pair[0].start < pair[1].start);
            }
            if let Some(last) = intervals.last() {
                prop_assert_eq!(last.end, date(2024, 3, 1));
            }
        }

        #[test]
        fn prop_overlapping_issues_are_counted(issues in prop::collection::vec(arb_lifetime(), 0..40)) {
            let reference = date(2024, 3, 1);
            let as_of = date(2024, 9, 1);
            let window = AgingWindow::weeks(1, 26);
            let intervals = generate_intervals(reference, window).unwrap();
            let series = aggregate(&issues, reference, window, as_of).unwrap();

            prop_assert_eq!(series.len(), intervals.len());

            // Brute-force reference of the same boundary rule.
            for (k, interval) in intervals.iter().enumerate() {
                let expected = issues
                    .iter()
                    .filter(|issue| issue.opened_on <= interval.end && issue.closed_or(as_of) > interval.start)
                    .count();
                prop_assert_eq!(series.points[k].open, expected);
            }

            let overlapping = issues
                .iter()
                .filter(|issue| intervals.iter().any(|iv| issue.opened_on <= iv.end && issue.closed_or(as_of) > iv.start))
                .count();
            prop_assert!(series.counts().iter().sum::<usize>() >= overlapping);
        }

        #[test]
        fn prop_aggregate_is_idempotent(issues in prop::collection::vec(arb_lifetime(), 0..20)) {
            let reference = date(2024, 3, 1);
            let as_of = date(2024, 9, 1);
            let first = aggregate(&issues, reference, AgingWindow::default(), as_of).unwrap();
            let second = aggregate(&issues, reference, AgingWindow::default(), as_of).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}

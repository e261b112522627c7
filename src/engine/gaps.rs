use crate::calendar::{next_day, prev_day};
use crate::model::*;

// ── Gap detection ─────────────────────────────────────────────────

/// Uncovered day ranges between intervals that are supposed to tile time.
///
/// Sorted by start, walked pairwise with a running maximum end so nested or
/// overlapping input (a broken invariant) never yields a phantom gap. Nothing
/// is reported before the first or after the last interval.
pub fn find_gaps(intervals: &[Interval]) -> Vec<Interval> {
    let mut sorted: Vec<Interval> = intervals.to_vec();
    sorted.sort_by_key(|i| (i.start, i.end));

    let mut gaps = Vec::new();
    let mut iter = sorted.into_iter();
    let Some(first) = iter.next() else {
        return gaps;
    };
    let mut covered_until = first.end;

    for next in iter {
        if next.start > next_day(covered_until) {
            gaps.push(Interval::new(next_day(covered_until), prev_day(next.start)));
        }
        covered_until = covered_until.max(next.end);
    }
    gaps
}

/// Merge intervals that overlap or touch (adjacent days) into disjoint ranges.
pub fn merge_covered(intervals: &[Interval]) -> Vec<Interval> {
    let mut sorted: Vec<Interval> = intervals.to_vec();
    sorted.sort_by_key(|i| i.start);

    let mut merged: Vec<Interval> = Vec::with_capacity(sorted.len());
    for interval in sorted {
        if let Some(last) = merged.last_mut()
            && interval.start <= next_day(last.end)
        {
            last.end = last.end.max(interval.end);
            continue;
        }
        merged.push(interval);
    }
    merged
}

impl GapReport {
    pub fn from_intervals(intervals: &[Interval]) -> Self {
        let gaps = find_gaps(intervals);
        Self {
            has_gap: !gaps.is_empty(),
            gaps,
        }
    }

    pub fn from_price_lists(lists: &[PriceList]) -> Self {
        let intervals: Vec<Interval> = lists.iter().map(|l| l.interval).collect();
        Self::from_intervals(&intervals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn iv(a: u32, b: u32) -> Interval {
        Interval::new(
            NaiveDate::from_ymd_opt(2024, 1, a).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, b).unwrap(),
        )
    }

    #[test]
    fn single_gap_between_two() {
        assert_eq!(find_gaps(&[iv(1, 5), iv(8, 10)]), vec![iv(6, 7)]);
    }

    #[test]
    fn adjacent_intervals_have_no_gap() {
        assert!(find_gaps(&[iv(1, 5), iv(6, 10)]).is_empty());
    }

    #[test]
    fn one_day_gap() {
        assert_eq!(find_gaps(&[iv(1, 5), iv(7, 10)]), vec![iv(6, 6)]);
    }

    #[test]
    fn unsorted_input_is_sorted_first() {
        let gaps = find_gaps(&[iv(20, 25), iv(1, 5), iv(8, 10)]);
        assert_eq!(gaps, vec![iv(6, 7), iv(11, 19)]);
    }

    #[test]
    fn empty_and_single_have_no_gaps() {
        assert!(find_gaps(&[]).is_empty());
        assert!(find_gaps(&[iv(3, 9)]).is_empty());
    }

    #[test]
    fn nested_interval_does_not_create_phantom_gap() {
        // [1-20] covers [3-4]; the next interval starts right after 20.
        assert!(find_gaps(&[iv(1, 20), iv(3, 4), iv(21, 25)]).is_empty());
        // Gap measured from the furthest end, not the last visited one.
        assert_eq!(find_gaps(&[iv(1, 20), iv(3, 4), iv(23, 25)]), vec![iv(21, 22)]);
    }

    #[test]
    fn overlapping_input_is_tolerated() {
        assert!(find_gaps(&[iv(1, 10), iv(5, 15)]).is_empty());
    }

    #[test]
    fn merge_joins_touching_and_overlapping() {
        let merged = merge_covered(&[iv(8, 10), iv(1, 5), iv(6, 7), iv(20, 22), iv(21, 30)]);
        assert_eq!(merged, vec![iv(1, 10), iv(20, 30)]);
    }

    #[test]
    fn report_shape() {
        let report = GapReport::from_intervals(&[iv(1, 5), iv(8, 10)]);
        assert!(report.has_gap);
        assert_eq!(report.gaps, vec![iv(6, 7)]);
        assert_eq!(GapReport::from_intervals(&[iv(1, 5), iv(6, 10)]), GapReport::default());
    }
}

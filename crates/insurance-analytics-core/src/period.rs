//! Period engine: window selection and period-type transforms.
//!
//! | type    | retained quarters                       | value                          |
//! |---------|-----------------------------------------|--------------------------------|
//! | `qoq`   | every quarter                           | as is                          |
//! | `yoy_q` | quarter-of-year equal to the end's      | as is                          |
//! | `ytd`   | end quarter-of-year of complete years   | cumulative sum within the year |
//! | `yoy_y` | end quarter-of-year, full year history  | trailing 365-day sum           |
//! | `mat`   | every quarter with full year history    | trailing 365-day sum           |
//!
//! The output keeps the most recent `N + 1` quarters so that growth has a
//! prior period for the oldest displayed one.

use std::collections::{BTreeSet, HashMap};

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use tracing::debug;

use crate::frame::{group_indices, quarters, Dim, FactRecord, Frame};
use crate::metrics::options::OptionItem;
use crate::types::{PeriodType, Value, YearQuarter};

/// Length of the rolling window in days.
pub const ROLLING_WINDOW_DAYS: i64 = 365;

/// Minimum exclusive day span between a group's first observation and the
/// end of a quarter for rolling sums to be admitted.
pub const MIN_HISTORY_DAYS: i64 = 364;

/// Applies the window and the period-type transform.
pub fn filter_by_period_type(
    frame: &[FactRecord],
    end: YearQuarter,
    period_type: PeriodType,
    num_periods: usize,
) -> Frame {
    let upto: Frame = frame
        .iter()
        .filter(|r| r.year_quarter <= end)
        .cloned()
        .collect();

    let transformed = match period_type {
        PeriodType::Qoq => upto,
        PeriodType::YoyQ => upto
            .into_iter()
            .filter(|r| r.year_quarter.quarter == end.quarter)
            .collect(),
        PeriodType::Ytd => year_to_date(&upto, end),
        PeriodType::YoyY => rolling_year(&upto)
            .into_iter()
            .filter(|r| r.year_quarter.quarter == end.quarter)
            .collect(),
        PeriodType::Mat => rolling_year(&upto),
    };

    let out = retain_recent_periods(transformed, num_periods.saturating_add(1));
    debug!(
        rows_in = frame.len(),
        rows_out = out.len(),
        period_type = period_type.code(),
        end = %end,
        "applied period filter"
    );
    out
}

/// Keeps rows of the `n` most recent distinct quarters.
pub fn retain_recent_periods(frame: Frame, n: usize) -> Frame {
    let all = quarters(&frame);
    let keep: BTreeSet<YearQuarter> = all.iter().rev().take(n).copied().collect();
    frame
        .into_iter()
        .filter(|r| keep.contains(&r.year_quarter))
        .collect()
}

fn sum_values<'a>(values: impl IntoIterator<Item = &'a Value>) -> Value {
    values
        .into_iter()
        .flatten()
        .fold(None, |acc: Option<Decimal>, v| Some(acc.unwrap_or_default() + v))
}

// ---------------------------------------------------------------------------
// Year to date
// ---------------------------------------------------------------------------

/// Years that report every quarter from Q1 through `end_quarter`.
fn complete_years(frame: &[FactRecord], end_quarter: u32) -> BTreeSet<i32> {
    let mut seen: HashMap<i32, BTreeSet<u32>> = HashMap::new();
    for r in frame {
        if r.year_quarter.quarter <= end_quarter {
            seen.entry(r.year_quarter.year)
                .or_default()
                .insert(r.year_quarter.quarter);
        }
    }
    seen.into_iter()
        .filter(|(_, qs)| (1..=end_quarter).all(|q| qs.contains(&q)))
        .map(|(year, _)| year)
        .collect()
}

fn year_to_date(frame: &[FactRecord], end: YearQuarter) -> Frame {
    let years = complete_years(frame, end.quarter);
    let mut out = Frame::new();

    // 1. Group by everything except the quarter.
    for (_, indices) in group_indices(frame, &[Dim::YearQuarter]) {
        // 2. Per year, sum quarters up to the end quarter-of-year.
        for &year in &years {
            let rows: Vec<&FactRecord> = indices
                .iter()
                .map(|&i| &frame[i])
                .filter(|r| r.year_quarter.year == year && r.year_quarter.quarter <= end.quarter)
                .collect();
            // 3. Emit at the end quarter only when the group reports it.
            let Some(anchor) = rows.iter().find(|r| r.year_quarter.quarter == end.quarter) else {
                continue;
            };
            let mut row = (*anchor).clone();
            row.value = sum_values(rows.iter().map(|r| &r.value));
            out.push(row);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Rolling year
// ---------------------------------------------------------------------------

/// True when the span from `first_start` to `quarter_end` covers a full year.
pub fn admits_rolling_year(first_start: NaiveDate, quarter_end: NaiveDate) -> bool {
    (quarter_end - first_start).num_days() >= MIN_HISTORY_DAYS
}

/// Trailing 365-day sums per group, over quarter start dates in
/// `(t - 365 days, t]`. Quarters without a full year of group history are
/// dropped.
fn rolling_year(frame: &[FactRecord]) -> Frame {
    let mut out = Frame::new();
    for (_, mut indices) in group_indices(frame, &[Dim::YearQuarter]) {
        indices.sort_by_key(|&i| frame[i].year_quarter);
        let Some(first) = indices.first().map(|&i| frame[i].year_quarter.start_date()) else {
            continue;
        };
        for &i in &indices {
            let row = &frame[i];
            if !admits_rolling_year(first, row.year_quarter.end_date()) {
                continue;
            }
            let t = row.year_quarter.start_date();
            let window_start = t - Duration::days(ROLLING_WINDOW_DAYS);
            let window = indices.iter().map(|&j| &frame[j]).filter(|r| {
                let s = r.year_quarter.start_date();
                s > window_start && s <= t
            });
            let mut rolled = row.clone();
            rolled.value = sum_values(window.map(|r| &r.value));
            out.push(rolled);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Quarter options
// ---------------------------------------------------------------------------

/// Quarter dropdown entries, most recent first.
pub fn year_quarter_options(available: &[YearQuarter]) -> Vec<OptionItem> {
    let mut sorted = available.to_vec();
    sorted.sort();
    sorted.dedup();
    sorted
        .into_iter()
        .rev()
        .map(|q| OptionItem {
            label: q.to_string(),
            value: q.to_string(),
        })
        .collect()
}

/// First quarter the window for `end` needs, or `None` when `end` is not
/// available or history is insufficient.
pub fn get_start_quarter(
    end: YearQuarter,
    period_type: PeriodType,
    num_periods: usize,
    available: &[YearQuarter],
) -> Option<YearQuarter> {
    if !available.contains(&end) {
        return None;
    }
    let earliest = available.iter().min().copied()?;
    // Windows longer than the history reach back to the earliest quarter anyway.
    let num_periods = num_periods.min(available.len());
    let n = i64::try_from(num_periods).ok()?;

    match period_type {
        PeriodType::Qoq => Some(end.shift(-n).max(earliest)),
        PeriodType::YoyQ => {
            let mut same: Vec<YearQuarter> = available
                .iter()
                .filter(|q| q.quarter == end.quarter && **q <= end)
                .copied()
                .collect();
            same.sort();
            let take = num_periods.saturating_add(1).min(same.len());
            same.get(same.len() - take).copied()
        }
        PeriodType::Ytd => {
            let first_year = end.year - i32::try_from(num_periods).ok()?;
            let any_complete = (first_year..=end.year).any(|year| {
                (1..=end.quarter).all(|q| available.contains(&YearQuarter { year, quarter: q }))
            });
            any_complete.then_some(YearQuarter {
                year: first_year,
                quarter: 1,
            })
        }
        PeriodType::YoyY | PeriodType::Mat => {
            // The oldest displayed period still needs three quarters before it.
            let has_full_year = (0..4).all(|k| available.contains(&end.shift(-k)));
            if !has_full_year {
                return None;
            }
            let step = if period_type == PeriodType::YoyY { 4 } else { 1 };
            Some(end.shift(-(n * step) - 3).max(earliest))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn yq(s: &str) -> YearQuarter {
        s.parse().unwrap()
    }

    fn series(insurer: &str, points: &[(&str, Decimal)]) -> Frame {
        points
            .iter()
            .map(|(q, v)| FactRecord::new(yq(q), "direct_premiums", insurer, "все линии", *v))
            .collect()
    }

    fn values_at(frame: &[FactRecord], insurer: &str) -> Vec<(String, Value)> {
        let mut out: Vec<(String, Value)> = frame
            .iter()
            .filter(|r| r.insurer == insurer)
            .map(|r| (r.year_quarter.to_string(), r.value))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    fn p(q: &str, v: Decimal) -> (String, Value) {
        (q.to_string(), Some(v))
    }

    fn two_years() -> Frame {
        series(
            "a",
            &[
                ("2023Q1", dec!(1)),
                ("2023Q2", dec!(2)),
                ("2023Q3", dec!(3)),
                ("2023Q4", dec!(4)),
                ("2024Q1", dec!(10)),
                ("2024Q2", dec!(20)),
                ("2024Q3", dec!(30)),
            ],
        )
    }

    #[test]
    fn test_qoq_keeps_n_plus_one_quarters() {
        let out = filter_by_period_type(&two_years(), yq("2024Q3"), PeriodType::Qoq, 2);
        let got = values_at(&out, "a");
        assert_eq!(
            got,
            vec![
                p("2024Q1", dec!(10)),
                p("2024Q2", dec!(20)),
                p("2024Q3", dec!(30)),
            ]
        );
    }

    #[test]
    fn test_yoy_q_same_quarter_of_year() {
        let out = filter_by_period_type(&two_years(), yq("2024Q2"), PeriodType::YoyQ, 5);
        assert_eq!(
            values_at(&out, "a"),
            vec![p("2023Q2", dec!(2)), p("2024Q2", dec!(20))]
        );
    }

    #[test]
    fn test_ytd_cumulates_within_year() {
        let out = filter_by_period_type(&two_years(), yq("2024Q2"), PeriodType::Ytd, 5);
        assert_eq!(
            values_at(&out, "a"),
            vec![p("2023Q2", dec!(3)), p("2024Q2", dec!(30))]
        );
    }

    #[test]
    fn test_ytd_at_q4_is_annual_sum() {
        let out = filter_by_period_type(&two_years(), yq("2023Q4"), PeriodType::Ytd, 1);
        assert_eq!(values_at(&out, "a"), vec![p("2023Q4", dec!(10))]);
    }

    #[test]
    fn test_ytd_excludes_incomplete_years() {
        let mut frame = two_years();
        frame.extend(series("a", &[("2022Q2", dec!(7))]));
        let out = filter_by_period_type(&frame, yq("2024Q2"), PeriodType::Ytd, 5);
        assert!(out.iter().all(|r| r.year_quarter.year != 2022));
    }

    #[test]
    fn test_mat_requires_full_year_history() {
        let out = filter_by_period_type(&two_years(), yq("2024Q3"), PeriodType::Mat, 10);
        assert_eq!(
            values_at(&out, "a"),
            vec![
                p("2023Q4", dec!(10)),
                p("2024Q1", dec!(19)),
                p("2024Q2", dec!(37)),
                p("2024Q3", dec!(64)),
            ]
        );
    }

    #[test]
    fn test_yoy_y_rolling_sum_at_end_quarter() {
        let out = filter_by_period_type(&two_years(), yq("2024Q3"), PeriodType::YoyY, 3);
        assert_eq!(values_at(&out, "a"), vec![p("2024Q3", dec!(64))]);
    }

    #[test]
    fn test_admission_boundary() {
        let first = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        // 365 days inclusive
        assert!(admits_rolling_year(first, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap()));
        // one day less
        assert!(!admits_rolling_year(first, NaiveDate::from_ymd_opt(2023, 12, 30).unwrap()));
    }

    #[test]
    fn test_get_start_quarter() {
        let available: Vec<YearQuarter> = quarters(&two_years());
        assert_eq!(
            get_start_quarter(yq("2024Q3"), PeriodType::Qoq, 2, &available),
            Some(yq("2024Q1"))
        );
        assert_eq!(
            get_start_quarter(yq("2024Q2"), PeriodType::YoyQ, 5, &available),
            Some(yq("2023Q2"))
        );
        assert_eq!(
            get_start_quarter(yq("2024Q2"), PeriodType::Ytd, 1, &available),
            Some(yq("2023Q1"))
        );
        assert_eq!(
            get_start_quarter(yq("2024Q3"), PeriodType::Mat, 1, &available),
            Some(yq("2023Q3"))
        );
        assert_eq!(get_start_quarter(yq("2025Q1"), PeriodType::Qoq, 2, &available), None);
        assert_eq!(get_start_quarter(yq("2023Q2"), PeriodType::YoyY, 1, &available), None);
    }

    #[test]
    fn test_oversized_window_keeps_all_history() {
        let out = filter_by_period_type(&two_years(), yq("2024Q3"), PeriodType::Qoq, usize::MAX);
        assert_eq!(out.len(), 7);
        let available: Vec<YearQuarter> = quarters(&two_years());
        for (period_type, start) in [
            (PeriodType::Qoq, "2023Q1"),
            (PeriodType::YoyQ, "2023Q3"),
            (PeriodType::Mat, "2023Q1"),
        ] {
            assert_eq!(
                get_start_quarter(yq("2024Q3"), period_type, usize::MAX, &available),
                Some(yq(start)),
                "{period_type:?}"
            );
        }
        assert!(get_start_quarter(yq("2024Q3"), PeriodType::Ytd, usize::MAX, &available).is_some());
    }

    #[test]
    fn test_year_quarter_options_descending() {
        let opts = year_quarter_options(&[yq("2023Q4"), yq("2024Q1"), yq("2023Q4")]);
        let values: Vec<&str> = opts.iter().map(|o| o.value.as_str()).collect();
        assert_eq!(values, vec!["2024Q1", "2023Q4"]);
    }
}

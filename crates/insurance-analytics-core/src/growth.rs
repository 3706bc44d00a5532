use std::collections::BTreeSet;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::frame::{group_indices, quarters, Dim, FactRecord, Frame};
use crate::types::{Value, YearQuarter};

pub const CHANGE_SUFFIX: &str = "_change";

/// Prior values at or below this are treated as zero.
pub const GROWTH_EPSILON: Decimal = dec!(0.000000001);

/// Relative change against the prior period.
pub fn relative_change(current: Value, previous: Value) -> Value {
    let prev = previous.filter(|p| *p > GROWTH_EPSILON)?;
    (current? - prev).checked_div(prev)
}

/// Absolute change; the first period of a series has no move.
pub fn absolute_change(current: Value, previous: Option<Value>) -> Value {
    match previous {
        None => current.map(|_| Decimal::ZERO),
        Some(prev) => Some(current? - prev?),
    }
}

/// Appends `<metric>_change` rows and trims to the display window.
///
/// Market-share metrics change in absolute points; every other metric changes
/// relative to its previous period within the same series. Value rows keep the
/// `num_periods` most recent quarters and change rows the `num_periods - 1`
/// most recent, so a one-period window carries no change rows.
pub fn add_growth_rows(frame: &[FactRecord], num_periods: usize) -> Frame {
    let mut changes: Frame = Vec::new();

    for (_, mut indices) in group_indices(frame, &[Dim::YearQuarter]) {
        indices.sort_by_key(|&i| frame[i].year_quarter);
        let absolute = frame[indices[0]].metric.ends_with("market_share");

        let mut previous: Option<Value> = None;
        for &i in &indices {
            let r = &frame[i];
            let value = if absolute {
                absolute_change(r.value, previous)
            } else {
                relative_change(r.value, previous.flatten())
            };
            changes.push(r.derive(format!("{}{CHANGE_SUFFIX}", r.metric), value));
            previous = Some(r.value);
        }
    }

    let recent = |n: usize| -> BTreeSet<YearQuarter> {
        quarters(frame).into_iter().rev().take(n).collect()
    };
    let value_periods = recent(num_periods);
    let change_periods = recent(num_periods.saturating_sub(1));

    let out: Frame = frame
        .iter()
        .filter(|r| value_periods.contains(&r.year_quarter))
        .cloned()
        .chain(
            changes
                .into_iter()
                .filter(|r| change_periods.contains(&r.year_quarter)),
        )
        .collect();
    debug!(rows_in = frame.len(), rows_out = out.len(), num_periods, "added growth rows");
    out
}

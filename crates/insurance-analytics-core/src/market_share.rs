use std::collections::HashMap;

use rust_decimal::Decimal;
use tracing::debug;

use crate::frame::{group_indices, Dim, FactRecord, Frame};
use crate::metrics::registry::is_ratio_like;
use crate::types::InsurerKind;

pub const MARKET_SHARE_SUFFIX: &str = "_market_share";

/// Share of a ratio, rate or average is meaningless.
fn skips_market_share(metric: &str) -> bool {
    let lower = metric.to_lowercase();
    is_ratio_like(&lower) || ["ratio", "rate", "average"].iter().any(|w| lower.contains(w))
}

/// Appends `<metric>_market_share` rows: each row's value over the `total`
/// row of its group (all dimensions but the insurer).
///
/// Groups without a total, or whose total is zero or absent, get no share
/// rows. The total row's own share is 1.
pub fn add_market_share_rows(frame: &[FactRecord]) -> Frame {
    let mut shares: Frame = Vec::new();
    let mut skipped_groups = 0usize;

    for (_, indices) in group_indices(frame, &[Dim::Insurer]) {
        let rows: Vec<&FactRecord> = indices.iter().map(|&i| &frame[i]).collect();
        if skips_market_share(&rows[0].metric) {
            continue;
        }
        let total = rows
            .iter()
            .find(|r| r.kind() == InsurerKind::Total)
            .and_then(|r| r.value)
            .filter(|t| !t.is_zero());
        let Some(total) = total else {
            skipped_groups += 1;
            continue;
        };
        for r in rows {
            let share = r.value.and_then(|v| v.checked_div(total));
            shares.push(r.derive(format!("{}{MARKET_SHARE_SUFFIX}", r.metric), share));
        }
    }

    debug!(
        rows_in = frame.len(),
        added = shares.len(),
        skipped_groups,
        "added market share rows"
    );
    frame.iter().cloned().chain(shares).collect()
}

/// Sum of market shares per `(metric, quarter, line)` over real insurers.
/// Used to check that shares of a complete market add up to one.
pub fn share_sums(frame: &[FactRecord]) -> HashMap<(String, String, String), Decimal> {
    let mut sums = HashMap::new();
    for r in frame {
        if !r.metric.ends_with(MARKET_SHARE_SUFFIX) || r.kind() != InsurerKind::Real {
            continue;
        }
        if let Some(v) = r.value {
            *sums
                .entry((r.metric.clone(), r.year_quarter.to_string(), r.linemain.clone()))
                .or_default() += v;
        }
    }
    sums
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::YearQuarter;
    use rust_decimal_macros::dec;

    fn row(metric: &str, insurer: &str, v: Decimal) -> FactRecord {
        FactRecord::new(YearQuarter::new(2024, 2).unwrap(), metric, insurer, "все линии", v)
    }

    #[test]
    fn test_shares_sum_to_one() {
        let frame = vec![
            row("direct_premiums", "a", dec!(30)),
            row("direct_premiums", "b", dec!(70)),
            row("direct_premiums", "total", dec!(100)),
        ];
        let out = add_market_share_rows(&frame);
        assert_eq!(out.len(), 6);
        let share = |id: &str| {
            out.iter()
                .find(|r| r.insurer == id && r.metric == "direct_premiums_market_share")
                .and_then(|r| r.value)
        };
        assert_eq!(share("a"), Some(dec!(0.3)));
        assert_eq!(share("total"), Some(dec!(1)));
        let sums = share_sums(&out);
        assert_eq!(sums.values().copied().collect::<Vec<_>>(), vec![dec!(1)]);
    }

    #[test]
    fn test_ratio_metrics_and_zero_totals_are_skipped() {
        let frame = vec![
            row("net_loss_ratio", "a", dec!(0.5)),
            row("net_loss_ratio", "total", dec!(0.6)),
            row("average_sum_insured", "a", dec!(10)),
            row("average_sum_insured", "total", dec!(10)),
            row("direct_losses", "a", dec!(5)),
            row("direct_losses", "total", dec!(0)),
            row("direct_contracts", "a", dec!(5)),
        ];
        let out = add_market_share_rows(&frame);
        assert_eq!(out.len(), frame.len());
    }
}

//! Insurer cohort selection and rank histories.
//!
//! Ranks are taken on the ranking metric (first selected metric present in
//! the frame) over real insurers only, per line, for the latest quarter and
//! the one before it.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::frame::{quarters, unique_in_order, FactRecord, Frame};
use crate::types::{
    top_n_id, InsurerKind, SplitMode, YearQuarter, TOP_N_COHORTS, TOTAL_INSURER,
};

/// `linemain -> insurer -> 1-based rank`.
pub type RankMap = BTreeMap<String, BTreeMap<String, u32>>;

/// Current and prior rankings of one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rankings {
    pub metric: Option<String>,
    pub current_quarter: Option<YearQuarter>,
    pub previous_quarter: Option<YearQuarter>,
    pub current: RankMap,
    pub previous: RankMap,
}

impl Rankings {
    pub fn current_rank(&self, line: &str, insurer: &str) -> Option<u32> {
        self.current.get(line).and_then(|m| m.get(insurer)).copied()
    }

    pub fn previous_rank(&self, line: &str, insurer: &str) -> Option<u32> {
        self.previous.get(line).and_then(|m| m.get(insurer)).copied()
    }

    /// Rank cell: `"2 (+2)"`, `"3 (-1)"`, `"1 (-)"` for no move, the bare
    /// rank without history and `None` when the insurer is unranked.
    pub fn rank_change(&self, line: &str, insurer: &str) -> Option<String> {
        let current = self.current_rank(line, insurer)?;
        Some(format_rank_change(current, self.previous_rank(line, insurer)))
    }
}

pub fn format_rank_change(current: u32, previous: Option<u32>) -> String {
    let Some(previous) = previous else {
        return current.to_string();
    };
    let delta = previous as i64 - current as i64;
    match delta {
        0 => format!("{current} (-)"),
        d if d > 0 => format!("{current} (+{d})"),
        d => format!("{current} ({d})"),
    }
}

/// First selected metric with rows in `frame`, else the first metric seen.
pub fn ranking_metric(frame: &[FactRecord], selected: &[String]) -> Option<String> {
    let present: HashSet<&str> = frame.iter().map(|r| r.metric.as_str()).collect();
    selected
        .iter()
        .find(|m| present.contains(m.as_str()))
        .cloned()
        .or_else(|| frame.first().map(|r| r.metric.clone()))
}

/// Orders `(insurer, value)` pairs by value descending. Missing values go
/// last; ties fall back to the insurer id.
fn rank_order(entries: &mut [(String, Option<Decimal>)]) {
    entries.sort_by(|a, b| match (a.1, b.1) {
        (Some(x), Some(y)) => y.cmp(&x).then_with(|| a.0.cmp(&b.0)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.0.cmp(&b.0),
    });
}

fn ranks_for_quarter(frame: &[FactRecord], metric: &str, quarter: YearQuarter) -> RankMap {
    let mut per_line: BTreeMap<String, Vec<(String, Option<Decimal>)>> = BTreeMap::new();
    for r in frame {
        if r.year_quarter != quarter || r.metric != metric || r.kind() != InsurerKind::Real {
            continue;
        }
        let entries = per_line.entry(r.linemain.clone()).or_default();
        if !entries.iter().any(|(id, _)| id == &r.insurer) {
            entries.push((r.insurer.clone(), r.value));
        }
    }
    per_line
        .into_iter()
        .map(|(line, mut entries)| {
            rank_order(&mut entries);
            let ranks = entries
                .into_iter()
                .enumerate()
                .map(|(i, (id, _))| (id, i as u32 + 1))
                .collect();
            (line, ranks)
        })
        .collect()
}

/// Rankings for the latest quarter of the ranking metric and the one before.
pub fn compute_rankings(frame: &[FactRecord], selected_metrics: &[String]) -> Rankings {
    let Some(metric) = ranking_metric(frame, selected_metrics) else {
        return Rankings::default();
    };
    let metric_rows: Vec<FactRecord> = frame
        .iter()
        .filter(|r| r.metric == metric && r.kind() == InsurerKind::Real)
        .cloned()
        .collect();
    let qs = quarters(&metric_rows);
    let current_quarter = qs.last().copied();
    let previous_quarter = qs.len().checked_sub(2).map(|i| qs[i]);

    let rankings = Rankings {
        current: current_quarter
            .map(|q| ranks_for_quarter(&metric_rows, &metric, q))
            .unwrap_or_default(),
        previous: previous_quarter
            .map(|q| ranks_for_quarter(&metric_rows, &metric, q))
            .unwrap_or_default(),
        metric: Some(metric),
        current_quarter,
        previous_quarter,
    };
    debug!(
        lines = rankings.current.len(),
        current = ?rankings.current_quarter,
        previous = ?rankings.previous_quarter,
        "computed rankings"
    );
    rankings
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Which insurers a request displays.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsurerSelection {
    /// Size of the top cohort drawn from the ranking; 0 for none.
    pub cohort: usize,
    /// Explicitly named real insurers.
    pub specific: Vec<String>,
    /// Synthetic ids kept alongside real insurers.
    pub markers: BTreeSet<String>,
}

impl InsurerSelection {
    /// Builds the selection from the request. `top_n > 0` wins over a
    /// `top-k` marker among the selected insurers. The `total` row is always
    /// kept because market share needs it.
    pub fn from_request(selected_insurers: &[String], top_n: u32) -> Self {
        let selected_cohort = TOP_N_COHORTS
            .iter()
            .copied()
            .find(|n| selected_insurers.contains(&top_n_id(*n)));
        let cohort = if top_n > 0 { Some(top_n) } else { selected_cohort };

        let mut markers: BTreeSet<String> = selected_insurers
            .iter()
            .filter(|id| matches!(InsurerKind::of(id), InsurerKind::TopN(_)))
            .cloned()
            .collect();
        if let Some(n) = cohort {
            markers.insert(top_n_id(n));
        }
        markers.insert(TOTAL_INSURER.to_string());

        InsurerSelection {
            cohort: cohort.unwrap_or(0) as usize,
            specific: selected_insurers
                .iter()
                .filter(|id| InsurerKind::of(id) == InsurerKind::Real)
                .cloned()
                .collect(),
            markers,
        }
    }

    /// No cohort and no named insurer: every real insurer is shown.
    pub fn is_open(&self) -> bool {
        self.cohort == 0 && self.specific.is_empty()
    }
}

/// Real-insurer values of `metric` in `quarter`, summed per insurer over the
/// rows accepted by `keep`, largest first.
fn latest_totals<F>(frame: &[FactRecord], metric: &str, quarter: YearQuarter, keep: F) -> Vec<String>
where
    F: Fn(&FactRecord) -> bool,
{
    let mut sums: Vec<(String, Option<Decimal>)> = Vec::new();
    for r in frame {
        if r.year_quarter != quarter || r.metric != metric || r.kind() != InsurerKind::Real || !keep(r) {
            continue;
        }
        match sums.iter_mut().find(|(id, _)| id == &r.insurer) {
            Some((_, sum)) => {
                if let Some(v) = r.value {
                    *sum = Some(sum.unwrap_or_default() + v);
                }
            }
            None => sums.push((r.insurer.clone(), r.value)),
        }
    }
    rank_order(&mut sums);
    sums.into_iter().map(|(id, _)| id).collect()
}

fn top_cohort(ordered: Vec<String>, n: usize) -> Vec<String> {
    ordered.into_iter().take(n).collect()
}

/// Restricts `frame` to the selected insurers and orders it by metric then
/// insurer.
///
/// * `line` mode picks the cohort per line and reindexes each line's insurers
///   over that line's `(metric, quarter)` combinations.
/// * `insurer` mode picks one global cohort and reindexes every
///   `(insurer, line)` pair over the `(metric, quarter)` combinations present.
///
/// Without a cohort or named insurers every real insurer is shown. Gaps left
/// by reindexing get absent values.
pub fn filter_by_insurer(
    frame: &[FactRecord],
    selected_metrics: &[String],
    selection: &InsurerSelection,
    split_mode: SplitMode,
) -> Frame {
    let Some(latest) = frame.iter().map(|r| r.year_quarter).max() else {
        return Frame::new();
    };
    let Some(metric) = ranking_metric(frame, selected_metrics) else {
        return Frame::new();
    };
    let is_marker = |r: &FactRecord| r.kind().is_synthetic() && selection.markers.contains(&r.insurer);
    let lines = unique_in_order(frame.iter().map(|r| r.linemain.as_str()));

    let filtered: Frame = match split_mode {
        SplitMode::Insurer => {
            let mut chosen: HashSet<String> =
                top_cohort(latest_totals(frame, &metric, latest, |_| true), selection.cohort)
                    .into_iter()
                    .collect();
            chosen.extend(selection.specific.iter().cloned());
            let kept: Frame = if chosen.is_empty() {
                frame.to_vec()
            } else {
                frame
                    .iter()
                    .filter(|r| chosen.contains(&r.insurer) || is_marker(r))
                    .cloned()
                    .collect()
            };
            reindex(&kept, &lines)
        }
        SplitMode::Line => {
            let mut kept = Frame::new();
            for line in &lines {
                let line_rows: Frame = frame.iter().filter(|r| &r.linemain == line).cloned().collect();
                let mut chosen: HashSet<String> = if selection.is_open() {
                    line_rows
                        .iter()
                        .filter(|r| r.kind() == InsurerKind::Real)
                        .map(|r| r.insurer.clone())
                        .collect()
                } else {
                    top_cohort(latest_totals(&line_rows, &metric, latest, |_| true), selection.cohort)
                        .into_iter()
                        .collect()
                };
                chosen.extend(selection.specific.iter().cloned());
                if chosen.is_empty() {
                    continue;
                }
                let line_kept: Frame = line_rows
                    .into_iter()
                    .filter(|r| chosen.contains(&r.insurer) || is_marker(r))
                    .collect();
                kept.extend(reindex(&line_kept, std::slice::from_ref(line)));
            }
            kept
        }
    };
    // Cohort markers not requested are dropped in both modes.
    let filtered: Frame = filtered
        .into_iter()
        .filter(|r| !r.kind().is_synthetic() || selection.markers.contains(&r.insurer))
        .collect();

    let out = order_by_category(filtered, frame, selected_metrics, &metric, latest);
    debug!(
        rows_in = frame.len(),
        rows_out = out.len(),
        split_mode = ?split_mode,
        cohort = selection.cohort,
        "filtered insurers"
    );
    out
}

/// Surfaces every `(insurer, line)` cell for each `(metric, quarter, extras)`
/// combination present; missing cells get an absent value.
fn reindex(frame: &[FactRecord], lines: &[String]) -> Frame {
    let insurers = unique_in_order(frame.iter().map(|r| r.insurer.as_str()));
    let mut combos: Vec<&FactRecord> = Vec::new();
    let mut seen = HashSet::new();
    for r in frame {
        if seen.insert((&r.metric, r.year_quarter, &r.extras)) {
            combos.push(r);
        }
    }
    let existing: HashMap<_, &FactRecord> = frame
        .iter()
        .map(|r| ((&r.insurer, &r.linemain, &r.metric, r.year_quarter, &r.extras), r))
        .collect();

    let mut out = Frame::with_capacity(insurers.len() * lines.len() * combos.len());
    for insurer in &insurers {
        for line in lines {
            for combo in &combos {
                let key = (insurer, line, &combo.metric, combo.year_quarter, &combo.extras);
                match existing.get(&key) {
                    Some(r) => out.push((*r).clone()),
                    None => {
                        let mut row = combo.derive(combo.metric.clone(), None);
                        row.insurer = insurer.clone();
                        row.linemain = line.clone();
                        out.push(row);
                    }
                }
            }
        }
    }
    out
}

/// Stable sort by metric category (selected first) then insurer category
/// (latest value descending, then `top-5`, `top-10`, `top-20`, `total`).
/// Ids outside the categories sort last.
fn order_by_category(
    mut rows: Frame,
    source: &[FactRecord],
    selected_metrics: &[String],
    ranking_metric: &str,
    latest: YearQuarter,
) -> Frame {
    let mut insurer_order: Vec<String> = latest_totals(source, ranking_metric, latest, |_| true);
    insurer_order.extend(TOP_N_COHORTS.iter().map(|n| top_n_id(*n)));
    insurer_order.push(TOTAL_INSURER.to_string());
    let insurer_pos: HashMap<&str, usize> = insurer_order
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();

    let present = unique_in_order(source.iter().map(|r| r.metric.as_str()));
    let mut metric_order: Vec<&str> = selected_metrics
        .iter()
        .map(String::as_str)
        .filter(|m| present.iter().any(|p| p == m))
        .collect();
    metric_order.extend(
        present
            .iter()
            .map(String::as_str)
            .filter(|m| !selected_metrics.iter().any(|s| s == m)),
    );
    let metric_pos: HashMap<&str, usize> =
        metric_order.iter().enumerate().map(|(i, m)| (*m, i)).collect();

    rows.sort_by_key(|r| {
        (
            metric_pos.get(r.metric.as_str()).copied().unwrap_or(usize::MAX),
            insurer_pos.get(r.insurer.as_str()).copied().unwrap_or(usize::MAX),
        )
    });
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn yq(s: &str) -> YearQuarter {
        s.parse().unwrap()
    }

    fn row(q: &str, insurer: &str, line: &str, v: Decimal) -> FactRecord {
        FactRecord::new(yq(q), "direct_premiums", insurer, line, v)
    }

    fn strings(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn sample() -> Frame {
        vec![
            row("2024Q1", "a", "1", dec!(10)),
            row("2024Q1", "b", "1", dec!(40)),
            row("2024Q1", "c", "1", dec!(20)),
            row("2024Q1", "d", "1", dec!(30)),
            row("2024Q2", "a", "1", dec!(50)),
            row("2024Q2", "b", "1", dec!(40)),
            row("2024Q2", "c", "1", dec!(20)),
            row("2024Q2", "d", "1", dec!(30)),
            row("2024Q2", "total", "1", dec!(140)),
            row("2024Q2", "top-5", "1", dec!(140)),
            row("2024Q2", "c", "2", dec!(7)),
            row("2024Q2", "total", "2", dec!(7)),
        ]
    }

    #[test]
    fn test_format_rank_change() {
        assert_eq!(format_rank_change(2, Some(4)), "2 (+2)");
        assert_eq!(format_rank_change(3, Some(1)), "3 (-2)");
        assert_eq!(format_rank_change(1, Some(1)), "1 (-)");
        assert_eq!(format_rank_change(2, None), "2");
    }

    #[test]
    fn test_compute_rankings_excludes_synthetic() {
        let rankings = compute_rankings(&sample(), &strings(&["direct_premiums"]));
        assert_eq!(rankings.current_quarter, Some(yq("2024Q2")));
        assert_eq!(rankings.previous_quarter, Some(yq("2024Q1")));
        assert_eq!(rankings.current_rank("1", "a"), Some(1));
        assert_eq!(rankings.current_rank("1", "total"), None);
        assert_eq!(rankings.previous_rank("1", "a"), Some(4));
        assert_eq!(rankings.rank_change("1", "a").as_deref(), Some("1 (+3)"));
        assert_eq!(rankings.rank_change("2", "c").as_deref(), Some("1"));
        // dense and unique per line
        let ranks: Vec<u32> = rankings.current["1"].values().copied().collect();
        let mut sorted = ranks.clone();
        sorted.sort();
        assert_eq!(sorted, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_single_insurer_ranks_first() {
        let frame = vec![row("2024Q2", "a", "1", dec!(5))];
        let rankings = compute_rankings(&frame, &strings(&["direct_premiums"]));
        assert_eq!(rankings.current["1"].get("a"), Some(&1));
        let selection = InsurerSelection::from_request(&[], 5);
        let out = filter_by_insurer(&frame, &strings(&["direct_premiums"]), &selection, SplitMode::Line);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_selection_from_request() {
        let sel = InsurerSelection::from_request(&strings(&["top-10", "777", "total"]), 0);
        assert_eq!(sel.cohort, 10);
        assert_eq!(sel.specific, strings(&["777"]));
        assert!(sel.markers.contains("top-10"));
        assert!(sel.markers.contains("total"));

        let sel = InsurerSelection::from_request(&[], 5);
        assert_eq!(sel.cohort, 5);
        assert!(sel.markers.contains("top-5"));
    }

    #[test]
    fn test_line_mode_keeps_per_line_top() {
        let selection = InsurerSelection::from_request(&[], 2);
        let out = filter_by_insurer(&sample(), &strings(&["direct_premiums"]), &selection, SplitMode::Line);
        let line1: BTreeSet<&str> = out
            .iter()
            .filter(|r| r.linemain == "1")
            .map(|r| r.insurer.as_str())
            .collect();
        assert_eq!(line1, BTreeSet::from(["a", "b", "total"]));
        // top-5 was not requested
        assert!(out.iter().all(|r| r.insurer != "top-5"));
        let line2: BTreeSet<&str> = out
            .iter()
            .filter(|r| r.linemain == "2")
            .map(|r| r.insurer.as_str())
            .collect();
        assert_eq!(line2, BTreeSet::from(["c", "total"]));
    }

    #[test]
    fn test_insurer_mode_reindexes_lines() {
        let selection = InsurerSelection::from_request(&[], 1);
        let out = filter_by_insurer(&sample(), &strings(&["direct_premiums"]), &selection, SplitMode::Insurer);
        // `a` is the global leader and gets a cell on line 2 as well.
        let a_line2: Vec<&FactRecord> = out
            .iter()
            .filter(|r| r.insurer == "a" && r.linemain == "2")
            .collect();
        assert_eq!(a_line2.len(), 2);
        assert!(a_line2.iter().all(|r| r.value.is_none()));
        assert!(out.iter().all(|r| ["a", "total"].contains(&r.insurer.as_str())));
        // ordered by insurer category: real first, total last
        assert_eq!(out.first().map(|r| r.insurer.as_str()), Some("a"));
        assert_eq!(out.last().map(|r| r.insurer.as_str()), Some("total"));
    }

    #[test]
    fn test_specific_insurers_are_kept() {
        let selection = InsurerSelection::from_request(&strings(&["c"]), 0);
        let out = filter_by_insurer(&sample(), &strings(&["direct_premiums"]), &selection, SplitMode::Line);
        assert!(out.iter().any(|r| r.insurer == "c" && r.linemain == "1"));
        assert!(out.iter().all(|r| ["c", "total"].contains(&r.insurer.as_str())));
    }

    #[test]
    fn test_line_mode_without_cohort_shows_every_insurer() {
        let frame: Frame = sample()
            .into_iter()
            .filter(|r| !(r.insurer == "c" && r.linemain == "1" && r.year_quarter == yq("2024Q1")))
            .collect();
        let selection = InsurerSelection::from_request(&strings(&["total"]), 0);
        assert!(selection.is_open());
        let out = filter_by_insurer(&frame, &strings(&["direct_premiums"]), &selection, SplitMode::Line);

        let line1: BTreeSet<&str> = out
            .iter()
            .filter(|r| r.linemain == "1")
            .map(|r| r.insurer.as_str())
            .collect();
        assert_eq!(line1, BTreeSet::from(["a", "b", "c", "d", "total"]));

        // the missing quarter comes back as an absent cell
        let gap: Vec<&FactRecord> = out
            .iter()
            .filter(|r| r.insurer == "c" && r.linemain == "1" && r.year_quarter == yq("2024Q1"))
            .collect();
        assert_eq!(gap.len(), 1);
        assert_eq!(gap[0].value, None);

        // reindexing stays within the line
        assert!(!out.iter().any(|r| r.insurer == "a" && r.linemain == "2"));
        let line2: BTreeSet<&str> = out
            .iter()
            .filter(|r| r.linemain == "2")
            .map(|r| r.insurer.as_str())
            .collect();
        assert_eq!(line2, BTreeSet::from(["c", "total"]));
    }
}

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{InsurerKind, Value, YearQuarter};

/// One long-form observation: a metric value for an insurer, line and quarter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRecord {
    pub year_quarter: YearQuarter,
    pub metric: String,
    pub insurer: String,
    pub linemain: String,
    /// Additional grouping columns carried through every stage.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extras: BTreeMap<String, String>,
    pub value: Value,
}

/// A long-form table. Stages take one by reference and return a new one.
pub type Frame = Vec<FactRecord>;

impl FactRecord {
    pub fn new(
        year_quarter: YearQuarter,
        metric: &str,
        insurer: &str,
        linemain: &str,
        value: Decimal,
    ) -> Self {
        FactRecord {
            year_quarter,
            metric: metric.to_string(),
            insurer: insurer.to_string(),
            linemain: linemain.to_string(),
            extras: BTreeMap::new(),
            value: Some(value),
        }
    }

    pub fn kind(&self) -> InsurerKind {
        InsurerKind::of(&self.insurer)
    }

    /// Copy of this record under another metric name and value.
    pub fn derive(&self, metric: String, value: Value) -> Self {
        FactRecord {
            year_quarter: self.year_quarter,
            metric,
            insurer: self.insurer.clone(),
            linemain: self.linemain.clone(),
            extras: self.extras.clone(),
            value,
        }
    }

    /// Group key over every dimension except those in `exclude`.
    pub fn key(&self, exclude: &[Dim]) -> GroupKey {
        let keep = |d: Dim| !exclude.contains(&d);
        GroupKey {
            year_quarter: keep(Dim::YearQuarter).then_some(self.year_quarter),
            metric: keep(Dim::Metric).then(|| self.metric.clone()),
            insurer: keep(Dim::Insurer).then(|| self.insurer.clone()),
            linemain: keep(Dim::Line).then(|| self.linemain.clone()),
            extras: self.extras.clone(),
        }
    }
}

/// Key dimensions of a fact record. Extras are always part of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dim {
    YearQuarter,
    Metric,
    Insurer,
    Line,
}

/// Projection of a record onto a subset of its dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    pub year_quarter: Option<YearQuarter>,
    pub metric: Option<String>,
    pub insurer: Option<String>,
    pub linemain: Option<String>,
    pub extras: BTreeMap<String, String>,
}

/// Groups row indices by key, keeping groups in first-appearance order.
pub fn group_indices(frame: &[FactRecord], exclude: &[Dim]) -> Vec<(GroupKey, Vec<usize>)> {
    let mut slots: HashMap<GroupKey, usize> = HashMap::new();
    let mut groups: Vec<(GroupKey, Vec<usize>)> = Vec::new();
    for (idx, row) in frame.iter().enumerate() {
        let key = row.key(exclude);
        match slots.get(&key) {
            Some(&slot) => groups[slot].1.push(idx),
            None => {
                slots.insert(key.clone(), groups.len());
                groups.push((key, vec![idx]));
            }
        }
    }
    groups
}

/// Distinct values in first-appearance order.
pub fn unique_in_order<'a, I>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = std::collections::HashSet::new();
    values
        .into_iter()
        .filter(|v| seen.insert(*v))
        .map(str::to_string)
        .collect()
}

/// Distinct quarters, ascending.
pub fn quarters(frame: &[FactRecord]) -> Vec<YearQuarter> {
    let mut out: Vec<YearQuarter> = frame.iter().map(|r| r.year_quarter).collect();
    out.sort();
    out.dedup();
    out
}

/// Drops earlier duplicates on the full key, keeping the last occurrence in place.
pub fn dedup_keep_last(frame: Frame) -> Frame {
    let mut last: HashMap<GroupKey, usize> = HashMap::new();
    for (idx, row) in frame.iter().enumerate() {
        last.insert(row.key(&[]), idx);
    }
    frame
        .into_iter()
        .enumerate()
        .filter(|(idx, row)| last.get(&row.key(&[])) == Some(idx))
        .map(|(_, row)| row)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn yq(s: &str) -> YearQuarter {
        s.parse().unwrap()
    }

    #[test]
    fn test_group_indices_preserves_first_appearance() {
        let frame = vec![
            FactRecord::new(yq("2024Q1"), "direct_premiums", "b", "1", dec!(1)),
            FactRecord::new(yq("2024Q1"), "direct_premiums", "a", "1", dec!(2)),
            FactRecord::new(yq("2024Q2"), "direct_premiums", "b", "1", dec!(3)),
        ];
        let groups = group_indices(&frame, &[Dim::YearQuarter]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0.insurer.as_deref(), Some("b"));
        assert_eq!(groups[0].1, vec![0, 2]);
        assert!(groups[0].0.year_quarter.is_none());
    }

    #[test]
    fn test_dedup_keep_last() {
        let frame = vec![
            FactRecord::new(yq("2024Q1"), "m", "a", "1", dec!(1)),
            FactRecord::new(yq("2024Q1"), "m", "b", "1", dec!(5)),
            FactRecord::new(yq("2024Q1"), "m", "a", "1", dec!(2)),
        ];
        let out = dedup_keep_last(frame);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].insurer, "b");
        assert_eq!(out[1].value, Some(dec!(2)));
    }

    #[test]
    fn test_extras_participate_in_keys() {
        let mut a = FactRecord::new(yq("2024Q1"), "m", "a", "1", dec!(1));
        let mut b = a.clone();
        a.extras.insert("region".into(), "north".into());
        b.extras.insert("region".into(), "south".into());
        assert_ne!(a.key(&[Dim::Insurer]), b.key(&[Dim::Insurer]));
    }
}

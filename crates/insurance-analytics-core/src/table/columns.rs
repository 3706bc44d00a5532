use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::labels::{translate, translate_quarter};
use crate::metrics::registry::{MetricRegistry, LEGACY_GROWTH_INFIX};
use crate::types::{PeriodType, UnitType, YearQuarter};

/// Which derivation of a metric a column holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    Value,
    Change,
    MarketShare,
    MarketShareChange,
}

impl Variant {
    pub fn suffix(&self) -> &'static str {
        match self {
            Variant::Value => "",
            Variant::Change => "_change",
            Variant::MarketShare => "_market_share",
            Variant::MarketShareChange => "_market_share_change",
        }
    }

    pub fn is_market_share(&self) -> bool {
        matches!(self, Variant::MarketShare | Variant::MarketShareChange)
    }

    pub fn is_change(&self) -> bool {
        matches!(self, Variant::Change | Variant::MarketShareChange)
    }
}

/// Splits a long-form metric name into its base metric and variant. The
/// legacy `_q_to_q` infix is dropped first.
pub fn parse_metric(metric: &str) -> (String, Variant) {
    let name = metric.replace(LEGACY_GROWTH_INFIX, "");
    for variant in [Variant::MarketShareChange, Variant::MarketShare, Variant::Change] {
        if let Some(base) = name.strip_suffix(variant.suffix()) {
            return (base.to_string(), variant);
        }
    }
    (name, Variant::Value)
}

/// Structured identifier of a metric column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnId {
    pub metric: String,
    pub variant: Variant,
    pub period: YearQuarter,
}

impl ColumnId {
    pub fn new(metric: &str, period: YearQuarter) -> Self {
        let (metric, variant) = parse_metric(metric);
        ColumnId {
            metric,
            variant,
            period,
        }
    }

    /// Long-form metric name this column holds.
    pub fn metric_name(&self) -> String {
        format!("{}{}", self.metric, self.variant.suffix())
    }
}

/// Renders as `<metric><suffix>_<YYYYQn>`.
impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}_{}", self.metric, self.variant.suffix(), self.period)
    }
}

/// Orders columns by metric family (root metrics in order of first
/// appearance), then metric name, then quarter descending.
pub fn order_columns(ids: &[ColumnId], registry: &MetricRegistry) -> Vec<ColumnId> {
    let mut root_order: Vec<String> = Vec::new();
    let mut root_of: HashMap<String, usize> = HashMap::new();
    for id in ids {
        let name = id.metric_name();
        if root_of.contains_key(&name) {
            continue;
        }
        let root = registry
            .longest_prefix_root(&name)
            .map(str::to_string)
            .unwrap_or_else(|| name.clone());
        let pos = match root_order.iter().position(|r| r == &root) {
            Some(pos) => pos,
            None => {
                root_order.push(root);
                root_order.len() - 1
            }
        };
        root_of.insert(name, pos);
    }

    let unique: BTreeSet<&ColumnId> = ids.iter().collect();
    let mut ordered: Vec<ColumnId> = unique.into_iter().cloned().collect();
    ordered.sort_by(|a, b| {
        let (an, bn) = (a.metric_name(), b.metric_name());
        root_of[&an]
            .cmp(&root_of[&bn])
            .then_with(|| an.cmp(&bn))
            .then_with(|| b.period.cmp(&a.period))
    });
    ordered
}

// ---------------------------------------------------------------------------
// Column configuration
// ---------------------------------------------------------------------------

/// Display configuration of one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableColumn {
    pub id: String,
    /// Header levels, outermost first.
    pub header: Vec<String>,
    pub hidden: bool,
    /// Shown as a percentage.
    pub percentage: bool,
    pub precision: u32,
}

impl TableColumn {
    /// An identifier column (`N`, `insurer`, `linemain`) under a section label.
    pub fn identifier(id: &str, section: &str) -> Self {
        TableColumn {
            id: id.to_string(),
            header: vec![section.to_string(), translate(id), translate(id)],
            hidden: false,
            percentage: false,
            precision: 0,
        }
    }
}

pub fn unit_label(unit: UnitType) -> &'static str {
    match unit {
        UnitType::Value => "млрд. руб.",
        UnitType::AverageValue => "тыс. руб.",
        UnitType::Quantity => "тыс. шт.",
        UnitType::Ratio => "%",
    }
}

pub fn period_label(period: YearQuarter, period_type: PeriodType) -> String {
    match period_type {
        PeriodType::Ytd => translate_quarter(period),
        _ => period.to_string(),
    }
}

/// Visibility switches for derived columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnVisibility {
    pub show_market_share: bool,
    pub show_change: bool,
}

impl Default for ColumnVisibility {
    fn default() -> Self {
        ColumnVisibility {
            show_market_share: true,
            show_change: true,
        }
    }
}

/// Builds the configuration of ordered metric columns. Change columns name
/// the period they compare against when the table holds it.
pub fn metric_columns(
    ordered: &[ColumnId],
    period_type: PeriodType,
    visibility: ColumnVisibility,
    registry: &MetricRegistry,
) -> Vec<TableColumn> {
    ordered
        .iter()
        .map(|id| {
            let unit = registry
                .get(&id.metric)
                .map(|d| d.unit_type)
                .unwrap_or(UnitType::Value);
            let base = match id.variant {
                Variant::Value => unit_label(unit).to_string(),
                Variant::MarketShare => translate("market_share"),
                Variant::Change => translate("change"),
                Variant::MarketShareChange => translate("market_share_change"),
            };
            let period = if id.variant.is_change() {
                let compared = ordered
                    .iter()
                    .filter(|c| c.metric == id.metric && !c.variant.is_change())
                    .map(|c| c.period)
                    .filter(|p| *p < id.period)
                    .max();
                match compared {
                    Some(prev) => format!(
                        "{} vs {}",
                        period_label(id.period, period_type),
                        period_label(prev, period_type)
                    ),
                    None => period_label(id.period, period_type),
                }
            } else {
                period_label(id.period, period_type)
            };
            let percentage = id.variant != Variant::Value || unit == UnitType::Ratio;
            TableColumn {
                id: id.to_string(),
                header: vec![translate(&id.metric), base, period],
                hidden: (id.variant.is_market_share() && !visibility.show_market_share)
                    || (id.variant.is_change() && !visibility.show_change),
                percentage,
                precision: if percentage { 2 } else { 3 },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yq(s: &str) -> YearQuarter {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_metric_variants() {
        assert_eq!(parse_metric("direct_premiums"), ("direct_premiums".into(), Variant::Value));
        assert_eq!(
            parse_metric("direct_premiums_market_share_change"),
            ("direct_premiums".into(), Variant::MarketShareChange)
        );
        assert_eq!(
            parse_metric("direct_premiums_q_to_q_change"),
            ("direct_premiums".into(), Variant::Change)
        );
        let id = ColumnId::new("net_premiums_market_share", yq("2024Q3"));
        assert_eq!(id.to_string(), "net_premiums_market_share_2024Q3");
    }

    #[test]
    fn test_order_columns_by_family_then_quarter() {
        let reg = MetricRegistry::standard();
        let ids = vec![
            ColumnId::new("direct_premiums", yq("2024Q2")),
            ColumnId::new("direct_premiums_change", yq("2024Q3")),
            ColumnId::new("direct_losses", yq("2024Q3")),
            ColumnId::new("direct_premiums", yq("2024Q3")),
            ColumnId::new("direct_premiums_market_share", yq("2024Q3")),
            ColumnId::new("direct_premiums", yq("2024Q2")),
        ];
        let ordered: Vec<String> = order_columns(&ids, reg).iter().map(|c| c.to_string()).collect();
        assert_eq!(
            ordered,
            vec![
                "direct_premiums_2024Q3",
                "direct_premiums_2024Q2",
                "direct_premiums_change_2024Q3",
                "direct_premiums_market_share_2024Q3",
                "direct_losses_2024Q3",
            ]
        );
    }

    #[test]
    fn test_metric_columns_hidden_flags_and_headers() {
        let reg = MetricRegistry::standard();
        let ids = vec![
            ColumnId::new("direct_premiums", yq("2024Q3")),
            ColumnId::new("direct_premiums", yq("2024Q2")),
            ColumnId::new("direct_premiums_change", yq("2024Q3")),
            ColumnId::new("direct_premiums_market_share", yq("2024Q3")),
        ];
        let visibility = ColumnVisibility {
            show_market_share: false,
            show_change: true,
        };
        let cols = metric_columns(&ids, PeriodType::Qoq, visibility, reg);
        assert!(!cols[0].hidden);
        assert!(!cols[2].hidden);
        assert!(cols[3].hidden);
        assert_eq!(cols[2].header[2], "2024Q3 vs 2024Q2");
        assert_eq!(cols[0].header[1], "млрд. руб.");
        assert!(cols[3].percentage);

        let ytd = metric_columns(&ids[..1], PeriodType::Ytd, visibility, reg);
        assert_eq!(ytd[0].header[2], "2024 год, 9 месяцев");
    }
}

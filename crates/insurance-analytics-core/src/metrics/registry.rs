use std::collections::{BTreeSet, HashMap};

use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::types::{ReportingForm, UnitType};

/// Suffixes appended to metric names by market-share and growth stages.
/// Longest first so that stripping is unambiguous.
pub const METRIC_SUFFIXES: [&str; 3] = ["_market_share_change", "_market_share", "_change"];

/// Legacy growth infix, normalised away wherever metric names are parsed.
pub const LEGACY_GROWTH_INFIX: &str = "_q_to_q";

/// Metrics offered in the metric dropdowns.
pub const VALID_METRICS: [&str; 22] = [
    "direct_premiums",
    "direct_losses",
    "inward_premiums",
    "inward_losses",
    "ceded_premiums",
    "ceded_losses",
    "new_contracts",
    "contracts_end",
    "premiums_interm",
    "commissions_interm",
    "total_premiums",
    "total_losses",
    "net_premiums",
    "net_losses",
    "average_new_premium",
    "average_loss",
    "average_rate",
    "ceded_premiums_ratio",
    "ceded_losses_ratio",
    "ceded_losses_to_ceded_premiums_ratio",
    "premiums_interm_ratio",
    "commissions_rate",
];

// ---------------------------------------------------------------------------
// Formula
// ---------------------------------------------------------------------------

/// How a metric is evaluated from a `{metric -> value}` map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", content = "args", rename_all = "snake_case")]
pub enum Formula {
    /// Sourced from raw data.
    Raw,
    /// Sum of the present addends. Undefined when none is present.
    Sum(Vec<&'static str>),
    /// `a - b`, missing operands read as zero. Undefined when both are missing.
    Difference(&'static str, &'static str),
    /// `num / den`. Undefined when either is missing or `den` is zero.
    Ratio(&'static str, &'static str),
    /// `num / (den * 1000)`, for averages reported in thousands.
    PerThousand(&'static str, &'static str),
}

impl Formula {
    /// Evaluates the formula. `None` means the metric is undefined for this input.
    pub fn evaluate(&self, values: &HashMap<String, Decimal>) -> Option<Decimal> {
        let get = |name: &str| values.get(name).copied();
        match self {
            Formula::Raw => None,
            Formula::Sum(addends) => {
                let present: Vec<Decimal> = addends.iter().filter_map(|a| get(a)).collect();
                if present.is_empty() {
                    None
                } else {
                    Some(present.into_iter().sum())
                }
            }
            Formula::Difference(a, b) => match (get(a), get(b)) {
                (None, None) => None,
                (x, y) => Some(x.unwrap_or(Decimal::ZERO) - y.unwrap_or(Decimal::ZERO)),
            },
            Formula::Ratio(num, den) => {
                let den = get(den).filter(|d| !d.is_zero())?;
                get(num)?.checked_div(den)
            }
            Formula::PerThousand(num, den) => {
                let den = get(den).filter(|d| !d.is_zero())?.checked_mul(dec!(1000))?;
                get(num)?.checked_div(den)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// One registry entry.
#[derive(Debug, Clone, Serialize)]
pub struct MetricDefinition {
    pub name: &'static str,
    /// Metrics this one needs, in declaration order.
    pub dependencies: Vec<&'static str>,
    pub formula: Formula,
    pub unit_type: UnitType,
    /// Forms where the metric is present in raw data.
    pub source_forms: BTreeSet<ReportingForm>,
    pub label: &'static str,
}

impl MetricDefinition {
    /// Sourced raw with no dependencies.
    pub fn is_base(&self) -> bool {
        self.dependencies.is_empty() && !self.source_forms.is_empty()
    }

    /// Names that read as ratios need every dependency to be meaningful.
    pub fn is_ratio_named(&self) -> bool {
        is_ratio_like(self.name)
    }

    /// Dependencies whose absence still lets the formula evaluate.
    ///
    /// Detected by probing: every other dependency is set to one and the
    /// formula must still produce a value.
    pub fn optional_dependencies(&self) -> Vec<&'static str> {
        if self.is_ratio_named() {
            return Vec::new();
        }
        self.dependencies
            .iter()
            .copied()
            .filter(|omitted| {
                let probe: HashMap<String, Decimal> = self
                    .dependencies
                    .iter()
                    .filter(|d| *d != omitted)
                    .map(|d| (d.to_string(), Decimal::ONE))
                    .collect();
                self.formula.evaluate(&probe).is_some()
            })
            .collect()
    }
}

/// True for names that denote ratios, rates, differences or averages.
pub fn is_ratio_like(name: &str) -> bool {
    name.ends_with("_ratio")
        || name.ends_with("_rate")
        || name.ends_with("_diff")
        || name.starts_with("average_")
}

/// The metric registry: an ordered name to definition map.
#[derive(Debug, Clone)]
pub struct MetricRegistry {
    definitions: Vec<MetricDefinition>,
    index: HashMap<&'static str, usize>,
}

static STANDARD: Lazy<MetricRegistry> = Lazy::new(MetricRegistry::build_standard);

impl MetricRegistry {
    /// The registry of Russian insurance market metrics.
    pub fn standard() -> &'static MetricRegistry {
        &STANDARD
    }

    pub fn from_definitions(definitions: Vec<MetricDefinition>) -> Self {
        let index = definitions
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name, i))
            .collect();
        MetricRegistry { definitions, index }
    }

    pub fn get(&self, name: &str) -> Option<&MetricDefinition> {
        self.index.get(name).map(|&i| &self.definitions[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricDefinition> {
        self.definitions.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.definitions.iter().map(|d| d.name)
    }

    pub fn label<'a>(&self, name: &'a str) -> &'a str {
        self.get(name).map(|d| d.label).unwrap_or(name)
    }

    /// Registry key that is the longest prefix of `metric`, if any.
    pub fn longest_prefix_root(&self, metric: &str) -> Option<&'static str> {
        self.names()
            .filter(|root| metric.starts_with(root))
            .max_by_key(|root| root.len())
    }

    /// Base metrics sourced by `form`.
    pub fn base_metrics(&self, form: ReportingForm) -> Vec<&'static str> {
        self.definitions
            .iter()
            .filter(|d| d.is_base() && d.source_forms.contains(&form))
            .map(|d| d.name)
            .collect()
    }

    /// Metrics present as raw rows in `form`'s dataset: bases plus derived
    /// metrics none of whose dependencies the form sources.
    pub fn raw_metrics(&self, form: ReportingForm) -> Vec<&'static str> {
        let sourced = |name: &str| {
            self.get(name)
                .map(|d| d.source_forms.contains(&form))
                .unwrap_or(false)
        };
        self.definitions
            .iter()
            .filter(|d| d.source_forms.contains(&form))
            .filter(|d| d.dependencies.iter().all(|dep| !sourced(dep)))
            .map(|d| d.name)
            .collect()
    }

    fn build_standard() -> MetricRegistry {
        use ReportingForm::{Form0420158 as F158, Form0420162 as F162};
        use UnitType::{AverageValue, Quantity, Ratio, Value};

        let both = [F158, F162];
        let only162 = [F162];

        fn base(
            name: &'static str,
            unit_type: UnitType,
            forms: &[ReportingForm],
            label: &'static str,
        ) -> MetricDefinition {
            MetricDefinition {
                name,
                dependencies: Vec::new(),
                formula: Formula::Raw,
                unit_type,
                source_forms: forms.iter().copied().collect(),
                label,
            }
        }

        fn derived(
            name: &'static str,
            dependencies: &[&'static str],
            formula: Formula,
            unit_type: UnitType,
            forms: &[ReportingForm],
            label: &'static str,
        ) -> MetricDefinition {
            MetricDefinition {
                name,
                dependencies: dependencies.to_vec(),
                formula,
                unit_type,
                source_forms: forms.iter().copied().collect(),
                label,
            }
        }

        let definitions = vec![
            base("direct_premiums", Value, &only162, "Премии по прямому страхованию"),
            base("direct_losses", Value, &only162, "Выплаты по прямому страхованию"),
            base("inward_premiums", Value, &only162, "Премии по входящему перестрахованию"),
            base("inward_losses", Value, &only162, "Выплаты по входящему перестрахованию"),
            base("ceded_premiums", Value, &both, "Исходящее перестрахование - Премии"),
            base("ceded_losses", Value, &both, "Исходящее перестрахование - Убытки"),
            base("new_contracts", Quantity, &only162, "Кол-во заключенных договоров"),
            base("contracts_end", Quantity, &only162, "Кол-во действующих договоров"),
            base("premiums_interm", Value, &only162, "Премии через посредников"),
            base("commissions_interm", Value, &only162, "Вознаграждение посредникам"),
            base("new_sums", Value, &only162, "Страховая сумма по новым договорам"),
            base("sums_end", Value, &only162, "Страховая сумма по действующим договорам"),
            base("claims_reported", Quantity, &only162, "Заявленные убытки"),
            base("claims_settled", Quantity, &only162, "Урегулированные убытки"),
            // Totals are sourced raw in 0420158 and derived in 0420162.
            derived(
                "total_premiums",
                &["direct_premiums", "inward_premiums"],
                Formula::Sum(vec!["direct_premiums", "inward_premiums"]),
                Value,
                &both,
                "Премии",
            ),
            derived(
                "total_losses",
                &["direct_losses", "inward_losses"],
                Formula::Sum(vec!["direct_losses", "inward_losses"]),
                Value,
                &both,
                "Выплаты",
            ),
            derived(
                "net_premiums",
                &["total_premiums", "ceded_premiums"],
                Formula::Difference("total_premiums", "ceded_premiums"),
                Value,
                &both,
                "Премии-нетто перестрахование",
            ),
            derived(
                "net_losses",
                &["total_losses", "ceded_losses"],
                Formula::Difference("total_losses", "ceded_losses"),
                Value,
                &both,
                "Выплаты нетто-перестрахование",
            ),
            derived(
                "net_result",
                &["net_premiums", "net_losses"],
                Formula::Difference("net_premiums", "net_losses"),
                Value,
                &both,
                "Результат нетто",
            ),
            derived(
                "gross_result",
                &["total_premiums", "total_losses"],
                Formula::Difference("total_premiums", "total_losses"),
                Value,
                &both,
                "Результат брутто",
            ),
            derived(
                "average_new_premium",
                &["direct_premiums", "new_contracts"],
                Formula::PerThousand("direct_premiums", "new_contracts"),
                AverageValue,
                &only162,
                "Средняя премия по новым договорам",
            ),
            derived(
                "average_loss",
                &["direct_losses", "claims_settled"],
                Formula::PerThousand("direct_losses", "claims_settled"),
                AverageValue,
                &only162,
                "Средняя сумма выплаты",
            ),
            derived(
                "average_rate",
                &["new_sums", "direct_premiums"],
                Formula::PerThousand("direct_premiums", "new_sums"),
                Ratio,
                &only162,
                "Средняя ставка",
            ),
            derived(
                "average_sum_insured",
                &["sums_end", "contracts_end"],
                Formula::PerThousand("sums_end", "contracts_end"),
                AverageValue,
                &only162,
                "Средняя страховая сумма",
            ),
            derived(
                "average_new_sum_insured",
                &["new_sums", "new_contracts"],
                Formula::PerThousand("new_sums", "new_contracts"),
                AverageValue,
                &only162,
                "Средняя страховая сумма по новым договорам",
            ),
            derived(
                "ceded_premiums_ratio",
                &["ceded_premiums", "total_premiums"],
                Formula::Ratio("ceded_premiums", "total_premiums"),
                Ratio,
                &both,
                "Доля премий, переданных в перестрахование",
            ),
            derived(
                "ceded_losses_ratio",
                &["ceded_losses", "total_losses"],
                Formula::Ratio("ceded_losses", "total_losses"),
                Ratio,
                &both,
                "Доля выплат, переданных в перестрахование",
            ),
            derived(
                "premiums_interm_ratio",
                &["direct_premiums", "premiums_interm"],
                Formula::Ratio("premiums_interm", "direct_premiums"),
                Ratio,
                &only162,
                "Доля премий от посредников",
            ),
            derived(
                "commissions_rate",
                &["premiums_interm", "commissions_interm"],
                Formula::Ratio("commissions_interm", "premiums_interm"),
                Ratio,
                &only162,
                "Вознаграждение к премии",
            ),
            derived(
                "net_loss_ratio",
                &["net_losses", "net_premiums"],
                Formula::Ratio("net_losses", "net_premiums"),
                Ratio,
                &both,
                "Убыточность нетто",
            ),
            derived(
                "gross_loss_ratio",
                &["total_losses", "total_premiums"],
                Formula::Ratio("total_losses", "total_premiums"),
                Ratio,
                &both,
                "Убыточность брутто",
            ),
            derived(
                "direct_loss_ratio",
                &["direct_losses", "direct_premiums"],
                Formula::Ratio("direct_losses", "direct_premiums"),
                Ratio,
                &only162,
                "Убыточность прямого страхования",
            ),
            derived(
                "inward_loss_ratio",
                &["inward_losses", "inward_premiums"],
                Formula::Ratio("inward_losses", "inward_premiums"),
                Ratio,
                &only162,
                "Убыточность входящего перестрахования",
            ),
            derived(
                "ceded_losses_to_ceded_premiums_ratio",
                &["ceded_losses", "ceded_premiums"],
                Formula::Ratio("ceded_losses", "ceded_premiums"),
                Ratio,
                &both,
                "Убыточность исходящего перестрахования",
            ),
            derived(
                "ceded_ratio_diff",
                &["ceded_losses_ratio", "ceded_premiums_ratio"],
                Formula::Difference("ceded_losses_ratio", "ceded_premiums_ratio"),
                Ratio,
                &both,
                "Разница долей перестрахования",
            ),
            derived(
                "effect_on_loss_ratio",
                &["gross_loss_ratio", "net_loss_ratio"],
                Formula::Difference("gross_loss_ratio", "net_loss_ratio"),
                Ratio,
                &both,
                "Влияние на убыточность",
            ),
        ];
        MetricRegistry::from_definitions(definitions)
    }
}

/// Strips growth and market-share suffixes (and the legacy infix) to recover
/// the underlying metric name.
pub fn strip_metric_suffix(metric: &str) -> String {
    let normalized = metric.replace(LEGACY_GROWTH_INFIX, "");
    for suffix in METRIC_SUFFIXES {
        if let Some(stripped) = normalized.strip_suffix(suffix) {
            return stripped.to_string();
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, Decimal)]) -> HashMap<String, Decimal> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_standard_registry_has_no_cycles_and_known_deps() {
        let reg = MetricRegistry::standard();
        for def in reg.iter() {
            for dep in &def.dependencies {
                assert!(reg.contains(dep), "{} depends on unknown {}", def.name, dep);
            }
        }
        let order = crate::metrics::calculator::calculation_order(
            &reg.names().map(String::from).collect::<Vec<_>>(),
            reg,
        );
        assert_eq!(order.len(), reg.iter().count());
    }

    #[test]
    fn test_base_metrics_per_form() {
        let reg = MetricRegistry::standard();
        let f158 = reg.base_metrics(ReportingForm::Form0420158);
        assert_eq!(f158, vec!["ceded_premiums", "ceded_losses"]);
        assert!(reg
            .base_metrics(ReportingForm::Form0420162)
            .contains(&"direct_premiums"));
        assert!(!reg.get("total_premiums").unwrap().is_base());
    }

    #[test]
    fn test_raw_metrics_include_sourced_totals() {
        let reg = MetricRegistry::standard();
        assert_eq!(
            reg.raw_metrics(ReportingForm::Form0420158),
            vec!["ceded_premiums", "ceded_losses", "total_premiums", "total_losses"]
        );
        let raw162 = reg.raw_metrics(ReportingForm::Form0420162);
        assert!(!raw162.contains(&"total_premiums"));
        assert_eq!(raw162.len(), 14);
    }

    #[test]
    fn test_sum_and_difference() {
        let sum = Formula::Sum(vec!["a", "b"]);
        assert_eq!(sum.evaluate(&values(&[("a", dec!(2))])), Some(dec!(2)));
        assert_eq!(sum.evaluate(&values(&[])), None);
        let diff = Formula::Difference("a", "b");
        assert_eq!(
            diff.evaluate(&values(&[("a", dec!(10)), ("b", dec!(4))])),
            Some(dec!(6))
        );
        assert_eq!(diff.evaluate(&values(&[("b", dec!(4))])), Some(dec!(-4)));
    }

    #[test]
    fn test_ratio_zero_or_missing_denominator_is_undefined() {
        let ratio = Formula::Ratio("a", "b");
        assert_eq!(ratio.evaluate(&values(&[("a", dec!(1)), ("b", dec!(0))])), None);
        assert_eq!(ratio.evaluate(&values(&[("a", dec!(1))])), None);
        assert_eq!(
            ratio.evaluate(&values(&[("a", dec!(1)), ("b", dec!(4))])),
            Some(dec!(0.25))
        );
    }

    #[test]
    fn test_per_thousand() {
        let avg = Formula::PerThousand("premiums", "contracts");
        assert_eq!(
            avg.evaluate(&values(&[("premiums", dec!(5000)), ("contracts", dec!(5))])),
            Some(dec!(1))
        );
    }

    #[test]
    fn test_optional_dependencies_by_probing() {
        let reg = MetricRegistry::standard();
        assert_eq!(
            reg.get("total_premiums").unwrap().optional_dependencies(),
            vec!["direct_premiums", "inward_premiums"]
        );
        assert!(reg
            .get("ceded_premiums_ratio")
            .unwrap()
            .optional_dependencies()
            .is_empty());
    }

    #[test]
    fn test_longest_prefix_root() {
        let reg = MetricRegistry::standard();
        assert_eq!(
            reg.longest_prefix_root("ceded_premiums_ratio_change"),
            Some("ceded_premiums_ratio")
        );
        assert_eq!(
            reg.longest_prefix_root("direct_premiums_market_share"),
            Some("direct_premiums")
        );
        assert_eq!(reg.longest_prefix_root("unknown"), None);
    }

    #[test]
    fn test_strip_metric_suffix() {
        assert_eq!(strip_metric_suffix("direct_premiums_market_share_change"), "direct_premiums");
        assert_eq!(strip_metric_suffix("direct_premiums_q_to_q_change"), "direct_premiums");
        assert_eq!(strip_metric_suffix("net_loss_ratio"), "net_loss_ratio");
    }
}

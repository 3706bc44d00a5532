use serde::{Deserialize, Serialize};

use crate::metrics::registry::{strip_metric_suffix, MetricRegistry};
use crate::types::{BusinessType, ReportingForm};

/// State of the business-type checklist for a metric selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessTypeConfig {
    /// The user cannot change the values.
    pub readonly: bool,
    pub values: Vec<BusinessType>,
}

const TOTALS: [&str; 2] = ["total_premiums", "total_losses"];
const CEDED_AND_NET: [&str; 6] = [
    "ceded_premiums",
    "ceded_losses",
    "ceded_premiums_ratio",
    "ceded_losses_to_ceded_premiums_ratio",
    "net_premiums",
    "net_losses",
];

/// Checklist group of one metric: (readonly, allowed business types).
fn metric_group(metric: &str, form: ReportingForm, registry: &MetricRegistry) -> (bool, Vec<BusinessType>) {
    use BusinessType::{Direct, Inward};

    if TOTALS.contains(&metric) {
        return (form == ReportingForm::Form0420158, vec![Direct, Inward]);
    }
    if CEDED_AND_NET.contains(&metric) || depends_on_combined_totals(metric, registry) {
        return (true, vec![Direct, Inward]);
    }
    match metric {
        "inward_premiums" | "inward_losses" => (true, vec![Inward]),
        "direct_premiums" | "direct_losses" => (true, vec![Direct]),
        _ => (false, vec![Direct]),
    }
}

/// True when any transitive dependency is a total, ceded or net metric.
fn depends_on_combined_totals(metric: &str, registry: &MetricRegistry) -> bool {
    let mut stack = vec![metric];
    while let Some(current) = stack.pop() {
        let Some(def) = registry.get(current) else {
            continue;
        };
        for dep in &def.dependencies {
            if TOTALS.contains(dep) || CEDED_AND_NET.contains(dep) {
                return true;
            }
            stack.push(*dep);
        }
    }
    false
}

/// Resolves the business-type checklist for `selected` metrics.
///
/// Read-only groups force their allowed values. Otherwise the current values
/// that are still allowed are kept, falling back to every allowed value.
pub fn business_type_config(
    selected: &[String],
    form: ReportingForm,
    current: &[BusinessType],
    registry: &MetricRegistry,
) -> BusinessTypeConfig {
    if selected.is_empty() {
        return BusinessTypeConfig {
            readonly: false,
            values: vec![BusinessType::Direct],
        };
    }

    let mut readonly = false;
    let mut allowed: Vec<BusinessType> = Vec::new();
    for metric in selected {
        let (locked, types) = metric_group(&strip_metric_suffix(metric), form, registry);
        readonly |= locked;
        allowed.extend(types);
    }
    allowed.sort();
    allowed.dedup();

    if readonly {
        return BusinessTypeConfig {
            readonly,
            values: allowed,
        };
    }

    let mut kept: Vec<BusinessType> = current
        .iter()
        .copied()
        .filter(|bt| allowed.contains(bt))
        .collect();
    kept.sort();
    kept.dedup();
    BusinessTypeConfig {
        readonly,
        values: if kept.is_empty() { allowed } else { kept },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BusinessType::{Direct, Inward};

    fn cfg(metrics: &[&str], form: ReportingForm, current: &[BusinessType]) -> BusinessTypeConfig {
        let selected: Vec<String> = metrics.iter().map(|m| m.to_string()).collect();
        business_type_config(&selected, form, current, MetricRegistry::standard())
    }

    #[test]
    fn test_empty_selection_defaults_to_direct() {
        let c = cfg(&[], ReportingForm::Form0420162, &[Inward]);
        assert_eq!(c, BusinessTypeConfig { readonly: false, values: vec![Direct] });
    }

    #[test]
    fn test_ceded_ratio_forces_both_readonly() {
        let c = cfg(&["ceded_premiums_ratio"], ReportingForm::Form0420162, &[Direct]);
        assert!(c.readonly);
        assert_eq!(c.values, vec![Direct, Inward]);
    }

    #[test]
    fn test_derived_on_net_metrics_is_locked() {
        let c = cfg(&["net_loss_ratio"], ReportingForm::Form0420162, &[Direct]);
        assert!(c.readonly);
        assert_eq!(c.values, vec![Direct, Inward]);
    }

    #[test]
    fn test_totals_editable_only_in_0420162() {
        let c162 = cfg(&["total_premiums"], ReportingForm::Form0420162, &[Inward]);
        assert_eq!(c162, BusinessTypeConfig { readonly: false, values: vec![Inward] });
        let c158 = cfg(&["total_premiums"], ReportingForm::Form0420158, &[Inward]);
        assert!(c158.readonly);
        assert_eq!(c158.values, vec![Direct, Inward]);
    }

    #[test]
    fn test_single_type_groups() {
        let c = cfg(&["inward_premiums_change"], ReportingForm::Form0420162, &[Direct]);
        assert_eq!(c, BusinessTypeConfig { readonly: true, values: vec![Inward] });
        let c = cfg(&["direct_losses"], ReportingForm::Form0420162, &[]);
        assert_eq!(c, BusinessTypeConfig { readonly: true, values: vec![Direct] });
    }

    #[test]
    fn test_other_metrics_allow_direct_only() {
        let c = cfg(&["new_contracts"], ReportingForm::Form0420162, &[Inward]);
        assert_eq!(c, BusinessTypeConfig { readonly: false, values: vec![Direct] });
    }
}

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::metrics::registry::{MetricRegistry, VALID_METRICS};
use crate::types::ReportingForm;

/// A dropdown entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionItem {
    pub label: String,
    pub value: String,
}

/// Allowed options and validated values for the two metric dropdowns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricOptions {
    pub primary_options: Vec<OptionItem>,
    pub secondary_options: Vec<OptionItem>,
    pub primary_values: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_value: Option<String>,
}

/// Default primary selection per reporting form.
pub fn default_metrics(form: ReportingForm) -> Vec<String> {
    match form {
        ReportingForm::Form0420162 => vec!["direct_premiums".to_string()],
        ReportingForm::Form0420158 => vec!["total_premiums".to_string()],
    }
}

/// Every metric computable in `form`: its raw metrics plus the derived
/// metrics reachable from them, iterated to a fixed point.
///
/// A derived metric is reachable when all of its required dependencies are
/// reachable and, if it has optional ones, at least one of those is.
pub fn reachable_metrics(form: ReportingForm, registry: &MetricRegistry) -> Vec<&'static str> {
    let mut reachable: HashSet<&'static str> = registry.raw_metrics(form).into_iter().collect();

    loop {
        let mut added = false;
        for def in registry.iter() {
            if reachable.contains(def.name)
                || def.dependencies.is_empty()
                || !def.source_forms.contains(&form)
            {
                continue;
            }
            let optional = def.optional_dependencies();
            let required_ok = def
                .dependencies
                .iter()
                .filter(|d| !optional.contains(d))
                .all(|d| reachable.contains(d));
            let optional_ok = optional.is_empty() || optional.iter().any(|d| reachable.contains(d));
            if required_ok && optional_ok {
                reachable.insert(def.name);
                added = true;
            }
        }
        if !added {
            break;
        }
    }

    registry.names().filter(|n| reachable.contains(n)).collect()
}

/// Resolves dropdown options for the primary (multi) and secondary (single)
/// metric selectors.
pub fn metric_options(
    form: ReportingForm,
    primary: &[String],
    secondary: Option<&str>,
    registry: &MetricRegistry,
) -> MetricOptions {
    let raw: HashSet<&str> = registry.raw_metrics(form).into_iter().collect();
    let reachable = reachable_metrics(form, registry);
    let reachable_set: HashSet<&str> = reachable.iter().copied().collect();

    let mut primary_values: Vec<String> = primary
        .iter()
        .filter(|m| reachable_set.contains(m.as_str()))
        .cloned()
        .collect();
    if primary_values.is_empty() {
        primary_values = default_metrics(form);
    }

    let primary_set: HashSet<&str> = raw
        .iter()
        .copied()
        .chain(primary_values.iter().map(String::as_str))
        .collect();

    let option = |name: &str| OptionItem {
        label: registry.label(name).to_string(),
        value: name.to_string(),
    };
    let offered = |name: &&&str| VALID_METRICS.contains(*name);

    let primary_options: Vec<OptionItem> = reachable
        .iter()
        .filter(|n| primary_set.contains(**n))
        .filter(offered)
        .map(|n| option(*n))
        .collect();
    let secondary_options: Vec<OptionItem> = reachable
        .iter()
        .filter(|n| !primary_set.contains(**n))
        .filter(offered)
        .map(|n| option(*n))
        .collect();

    let secondary_value = secondary
        .filter(|s| secondary_options.iter().any(|o| o.value == *s))
        .map(str::to_string);

    debug!(
        form = %form,
        primary = primary_options.len(),
        secondary = secondary_options.len(),
        "resolved metric options"
    );

    MetricOptions {
        primary_options,
        secondary_options,
        primary_values,
        secondary_value,
    }
}

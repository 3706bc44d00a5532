use std::collections::{BTreeSet, HashMap, HashSet};

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::frame::{dedup_keep_last, group_indices, Dim, FactRecord, Frame};
use crate::metrics::registry::{strip_metric_suffix, MetricRegistry};
use crate::types::BusinessType;

// ---------------------------------------------------------------------------
// Required metrics
// ---------------------------------------------------------------------------

/// Metrics needed to produce `selected`: the stripped selections first, then
/// each one's transitive dependencies (sorted per selection).
pub fn required_metrics(selected: &[String], registry: &MetricRegistry) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    let bases: Vec<String> = selected.iter().map(|m| strip_metric_suffix(m)).collect();
    for base in &bases {
        if seen.insert(base.clone()) {
            out.push(base.clone());
        }
    }

    for base in &bases {
        let mut deps: Vec<String> = transitive_dependencies(base, registry).into_iter().collect();
        deps.sort();
        for dep in deps {
            if seen.insert(dep.clone()) {
                out.push(dep);
            }
        }
    }
    out
}

fn transitive_dependencies(metric: &str, registry: &MetricRegistry) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    let mut stack = vec![metric.to_string()];
    while let Some(current) = stack.pop() {
        let Some(def) = registry.get(&current) else {
            continue;
        };
        for dep in &def.dependencies {
            if found.insert(dep.to_string()) {
                stack.push(dep.to_string());
            }
        }
    }
    found
}

/// Drops the base metrics of business types that are not selected.
pub fn filter_by_business_type(required: &[String], business_types: &[BusinessType]) -> Vec<String> {
    required
        .iter()
        .filter(|m| {
            BusinessType::ALL.iter().all(|bt| {
                business_types.contains(bt)
                    || !matches!(
                        m.strip_prefix(bt.metric_prefix()),
                        Some("premiums") | Some("losses")
                    )
            })
        })
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// Calculation order
// ---------------------------------------------------------------------------

/// Topological order of `required` (dependencies first, alphabetical ties).
///
/// Dependencies outside `required` are ignored. Metrics left over by a cycle
/// are dropped with a warning.
pub fn calculation_order(required: &[String], registry: &MetricRegistry) -> Vec<String> {
    let members: HashSet<&str> = required.iter().map(String::as_str).collect();

    let mut in_degree: HashMap<&str, usize> = members.iter().map(|m| (*m, 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for metric in &members {
        let Some(def) = registry.get(metric) else {
            continue;
        };
        for dep in def.dependencies.iter().filter(|d| members.contains(*d)) {
            *in_degree.entry(*metric).or_default() += 1;
            dependents.entry(*dep).or_default().push(*metric);
        }
    }

    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(m, _)| *m)
        .collect();
    let mut order = Vec::with_capacity(members.len());

    while let Some(next) = ready.pop_first() {
        order.push(next.to_string());
        for dependent in dependents.get(next).into_iter().flatten() {
            if let Some(deg) = in_degree.get_mut(dependent) {
                *deg -= 1;
                if *deg == 0 {
                    ready.insert(*dependent);
                }
            }
        }
    }

    if order.len() < members.len() {
        let stuck: BTreeSet<&str> = members
            .iter()
            .filter(|m| !order.iter().any(|o| o == *m))
            .copied()
            .collect();
        warn!(?stuck, "dependency cycle among metrics; skipping them");
    }
    order
}

// ---------------------------------------------------------------------------
// Per-group evaluation
// ---------------------------------------------------------------------------

/// Evaluates every missing metric of `order` per group and keeps only `selected`.
///
/// Groups are formed over all dimensions except the metric. Metrics already
/// present in a group are never recomputed; duplicate keys keep the last row.
/// Output rows follow the order of `selected`.
pub fn calculate_metrics(
    frame: &[FactRecord],
    selected: &[String],
    order: &[String],
    registry: &MetricRegistry,
) -> Frame {
    let mut computed: Frame = Vec::new();
    let mut skipped = 0usize;

    for (_, indices) in group_indices(frame, &[Dim::Metric]) {
        let mut values: HashMap<String, Decimal> = indices
            .iter()
            .filter_map(|&i| frame[i].value.map(|v| (frame[i].metric.clone(), v)))
            .collect();
        let present: HashSet<&str> = indices.iter().map(|&i| frame[i].metric.as_str()).collect();
        let template = &frame[indices[0]];

        for metric in order {
            if present.contains(metric.as_str()) || values.contains_key(metric) {
                continue;
            }
            let Some(def) = registry.get(metric) else {
                continue;
            };
            match def.formula.evaluate(&values) {
                Some(v) => {
                    values.insert(metric.clone(), v);
                    computed.push(template.derive(metric.clone(), Some(v)));
                }
                None => skipped += 1,
            }
        }
    }

    debug!(
        rows_in = frame.len(),
        computed = computed.len(),
        skipped,
        "calculated derived metrics"
    );

    let merged = dedup_keep_last(frame.iter().cloned().chain(computed).collect());

    let position: HashMap<&str, usize> = selected
        .iter()
        .enumerate()
        .map(|(i, m)| (m.as_str(), i))
        .collect();
    let mut out: Frame = merged
        .into_iter()
        .filter(|r| position.contains_key(r.metric.as_str()))
        .collect();
    out.sort_by_key(|r| position[r.metric.as_str()]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::YearQuarter;
    use rust_decimal_macros::dec;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn row(metric: &str, insurer: &str, value: Decimal) -> FactRecord {
        FactRecord::new(YearQuarter::new(2024, 1).unwrap(), metric, insurer, "все линии", value)
    }

    #[test]
    fn test_required_metrics_selected_first_then_deps() {
        let reg = MetricRegistry::standard();
        let req = required_metrics(&names(&["net_premiums_change"]), reg);
        assert_eq!(
            req,
            names(&[
                "net_premiums",
                "ceded_premiums",
                "direct_premiums",
                "inward_premiums",
                "total_premiums"
            ])
        );
    }

    #[test]
    fn test_required_metrics_is_idempotent() {
        let reg = MetricRegistry::standard();
        let once = required_metrics(&names(&["net_loss_ratio", "direct_premiums"]), reg);
        let twice = required_metrics(&once, reg);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_business_type_filter() {
        let req = names(&["total_premiums", "direct_premiums", "inward_premiums", "inward_losses"]);
        let filtered = filter_by_business_type(&req, &[BusinessType::Direct]);
        assert_eq!(filtered, names(&["total_premiums", "direct_premiums"]));
        assert_eq!(
            filter_by_business_type(&req, &[BusinessType::Direct, BusinessType::Inward]),
            req
        );
    }

    #[test]
    fn test_calculation_order_dependencies_first_alphabetical_ties() {
        let reg = MetricRegistry::standard();
        let req = required_metrics(&names(&["net_loss_ratio"]), reg);
        let order = calculation_order(&req, reg);
        let pos = |m: &str| order.iter().position(|o| o == m).unwrap();
        assert!(pos("total_premiums") < pos("net_premiums"));
        assert!(pos("net_premiums") < pos("net_loss_ratio"));
        assert!(pos("net_losses") < pos("net_loss_ratio"));
        assert_eq!(order[0], "ceded_losses");
        assert_eq!(order.len(), req.len());
    }

    #[test]
    fn test_calculation_order_drops_cycles() {
        use crate::metrics::registry::{Formula, MetricDefinition};
        use crate::types::UnitType;
        let def = |name: &'static str, dep: &'static str| MetricDefinition {
            name,
            dependencies: vec![dep],
            formula: Formula::Sum(vec![dep]),
            unit_type: UnitType::Value,
            source_forms: Default::default(),
            label: name,
        };
        let reg = MetricRegistry::from_definitions(vec![def("a", "b"), def("b", "a")]);
        let order = calculation_order(&names(&["a", "b", "c"]), &reg);
        assert_eq!(order, names(&["c"]));
    }

    #[test]
    fn test_calculate_metrics_emits_exactly_selected() {
        let reg = MetricRegistry::standard();
        let frame = vec![
            row("direct_premiums", "a", dec!(100)),
            row("inward_premiums", "a", dec!(20)),
            row("ceded_premiums", "a", dec!(30)),
            row("direct_premiums", "b", dec!(50)),
        ];
        let selected = names(&["net_premiums", "ceded_premiums_ratio"]);
        let order = calculation_order(&required_metrics(&selected, reg), reg);
        let out = calculate_metrics(&frame, &selected, &order, reg);

        let a_net = out
            .iter()
            .find(|r| r.insurer == "a" && r.metric == "net_premiums")
            .unwrap();
        assert_eq!(a_net.value, Some(dec!(90)));
        let a_ratio = out
            .iter()
            .find(|r| r.insurer == "a" && r.metric == "ceded_premiums_ratio")
            .unwrap();
        assert_eq!(a_ratio.value, Some(dec!(0.25)));
        // b has no ceded premiums: net is total, ratio is undefined and absent
        let b: Vec<_> = out.iter().filter(|r| r.insurer == "b").collect();
        assert_eq!(b.len(), 1);
        assert_eq!(b[0].value, Some(dec!(50)));
        assert!(out.iter().all(|r| selected.contains(&r.metric)));
        assert_eq!(out[0].metric, "net_premiums");
    }

    #[test]
    fn test_calculate_metrics_keeps_raw_values() {
        let reg = MetricRegistry::standard();
        let frame = vec![
            row("total_premiums", "a", dec!(500)),
            row("direct_premiums", "a", dec!(100)),
        ];
        let selected = names(&["total_premiums"]);
        let order = calculation_order(&required_metrics(&selected, reg), reg);
        let out = calculate_metrics(&frame, &selected, &order, reg);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].value, Some(dec!(500)));
    }
}

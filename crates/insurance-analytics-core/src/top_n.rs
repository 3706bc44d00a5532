use rust_decimal::Decimal;
use tracing::debug;

use crate::frame::{group_indices, Dim, FactRecord, Frame};
use crate::types::{top_n_id, InsurerKind};

/// Appends a synthetic `top-N` row per group (every dimension but the
/// insurer) holding the sum of the `N` largest real-insurer values.
///
/// Ties keep input order. Rows with no value do not rank. Groups without any
/// ranked insurer get no cohort row.
pub fn add_top_n_rows(frame: &[FactRecord], cohorts: &[u32]) -> Frame {
    let mut synthetic: Frame = Vec::new();

    for (_, indices) in group_indices(frame, &[Dim::Insurer]) {
        let mut ranked: Vec<(&FactRecord, Decimal)> = indices
            .iter()
            .map(|&i| &frame[i])
            .filter(|r| r.kind() == InsurerKind::Real)
            .filter_map(|r| r.value.map(|v| (r, v)))
            .collect();
        if ranked.is_empty() {
            continue;
        }
        // stable sort keeps first-appearance order among equal values
        ranked.sort_by(|a, b| b.1.cmp(&a.1));

        let template = ranked[0].0;
        for &n in cohorts {
            let sum: Decimal = ranked.iter().take(n as usize).map(|(_, v)| *v).sum();
            let mut row = template.derive(template.metric.clone(), Some(sum));
            row.insurer = top_n_id(n);
            synthetic.push(row);
        }
    }

    debug!(rows_in = frame.len(), added = synthetic.len(), "added top-N rows");
    frame.iter().cloned().chain(synthetic).collect()
}

use std::collections::HashMap;
use std::time::Instant;

use rust_decimal::Decimal;
use tracing::debug;

use super::columns::{metric_columns, order_columns, ColumnId, ColumnVisibility, TableColumn};
use super::{
    table_subtitle, table_title, DisplayCell, DisplayRow, DisplayTable, RowKind, INSURER_COLUMN,
    LINE_COLUMN, RANK_COLUMN,
};
use crate::frame::FactRecord;
use crate::insurer_filter::Rankings;
use crate::insurers::InsurerDirectory;
use crate::labels::translate;
use crate::lines::{LineTree, TABLE_INDENT};
use crate::metrics::registry::MetricRegistry;
use crate::types::{InsurerKind, PeriodType, SplitMode};

/// Everything the transformer needs besides the frame.
#[derive(Debug, Clone, Copy)]
pub struct TableContext<'a> {
    pub selected_metrics: &'a [String],
    pub selected_lines: &'a [String],
    pub rankings: &'a Rankings,
    pub split_mode: SplitMode,
    pub period_type: PeriodType,
    pub top_n: u32,
    pub visibility: ColumnVisibility,
    /// Show the market total as a summary row.
    pub show_total: bool,
    pub lines: &'a LineTree,
    pub insurers: &'a InsurerDirectory,
    pub registry: &'a MetricRegistry,
}

/// Pivot of one section: `(insurer, line)` rows in first-appearance order.
struct Pivot {
    keys: Vec<(String, String)>,
    slots: HashMap<(String, String), usize>,
    cells: Vec<Vec<DisplayCell>>,
}

impl Pivot {
    fn new() -> Self {
        Pivot {
            keys: Vec::new(),
            slots: HashMap::new(),
            cells: Vec::new(),
        }
    }

    /// Keeps the first defined value per cell.
    fn put(&mut self, record: &FactRecord, column: usize, width: usize) {
        let key = (record.insurer.clone(), record.linemain.clone());
        let slot = match self.slots.get(&key) {
            Some(&slot) => slot,
            None => {
                self.slots.insert(key.clone(), self.keys.len());
                self.keys.push(key);
                self.cells.push(vec![DisplayCell::Absent; width]);
                self.keys.len() - 1
            }
        };
        let cell = &mut self.cells[slot][column];
        let replace = match cell {
            DisplayCell::Absent => true,
            DisplayCell::Undefined => record.value.is_some(),
            _ => false,
        };
        if replace {
            *cell = DisplayCell::from_value(record.value);
        }
    }
}

/// Summary rows: cohorts by size, then the total.
fn summary_order(insurer: &str) -> (u8, u32) {
    match InsurerKind::of(insurer) {
        InsurerKind::TopN(n) => (1, n),
        InsurerKind::Total => (2, 0),
        InsurerKind::Real => (0, 0),
    }
}

/// Descending by `value`; rows without a number go last.
fn by_value_desc(a: Option<Decimal>, b: Option<Decimal>) -> std::cmp::Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    }
}

/// Pivots the long-form frame into the display table.
///
/// Sections follow the split mode: one per line with insurers as rows, or one
/// per insurer with lines as rows. Regular rows carry the rank change cell.
/// In `line` mode they are sorted by the first metric column; in `insurer`
/// mode lines follow the depth-first order of the line tree and are indented
/// relative to the shallowest line shown. Summary rows close each section.
pub fn transform_table(frame: &[FactRecord], ctx: &TableContext<'_>) -> DisplayTable {
    let start = Instant::now();

    let records: Vec<&FactRecord> = frame
        .iter()
        .filter(|r| ctx.show_total || r.kind() != InsurerKind::Total)
        .collect();

    // 1. Structured column ids, ordered by metric family and quarter.
    let ids: Vec<ColumnId> = records
        .iter()
        .map(|r| ColumnId::new(&r.metric, r.year_quarter))
        .collect();
    let ordered = order_columns(&ids, ctx.registry);
    let position: HashMap<&ColumnId, usize> =
        ordered.iter().enumerate().map(|(i, c)| (c, i)).collect();
    let width = ordered.len();

    // 2. One pivot per section, sections in first-appearance order.
    let mut sections: Vec<(String, Pivot)> = Vec::new();
    for (record, id) in records.iter().zip(&ids) {
        let group = match ctx.split_mode {
            SplitMode::Line => &record.linemain,
            SplitMode::Insurer => &record.insurer,
        };
        let idx = match sections.iter().position(|(g, _)| g == group) {
            Some(idx) => idx,
            None => {
                sections.push((group.clone(), Pivot::new()));
                sections.len() - 1
            }
        };
        sections[idx].1.put(record, position[id], width);
    }

    // 3. Rows per section.
    let dfs: HashMap<String, (usize, usize)> = ctx
        .lines
        .dfs_order()
        .into_iter()
        .enumerate()
        .map(|(pos, (code, depth))| (code, (pos, depth)))
        .collect();
    let mut rows: Vec<DisplayRow> = Vec::new();
    for (group, pivot) in sections {
        let group_label = match ctx.split_mode {
            SplitMode::Line => ctx.lines.label(&group).to_string(),
            SplitMode::Insurer => ctx.insurers.map_insurer(&group),
        };
        let mut regular: Vec<DisplayRow> = Vec::new();
        let mut summary: Vec<DisplayRow> = Vec::new();
        for ((insurer, linemain), cells) in pivot.keys.into_iter().zip(pivot.cells) {
            let kind = if InsurerKind::of(&insurer).is_synthetic() {
                RowKind::Summary
            } else {
                RowKind::Regular
            };
            let rank = match kind {
                RowKind::Regular => ctx.rankings.rank_change(&linemain, &insurer),
                RowKind::Summary => None,
            };
            let row = DisplayRow {
                kind,
                group: group.clone(),
                group_label: group_label.clone(),
                insurer_label: ctx.insurers.map_insurer(&insurer),
                line_label: ctx.lines.label(&linemain).to_string(),
                insurer,
                linemain,
                rank,
                cells,
            };
            match kind {
                RowKind::Regular => regular.push(row),
                RowKind::Summary => summary.push(row),
            }
        }

        match ctx.split_mode {
            SplitMode::Line => {
                regular.sort_by(|a, b| {
                    let first = |r: &DisplayRow| r.cells.first().and_then(DisplayCell::number);
                    by_value_desc(first(a), first(b))
                });
                summary.sort_by_key(|r| summary_order(&r.insurer));
                rows.extend(regular);
                rows.extend(summary);
            }
            SplitMode::Insurer => {
                let mut section: Vec<DisplayRow> = regular.into_iter().chain(summary).collect();
                section.sort_by_key(|r| dfs.get(&r.linemain).map(|(pos, _)| *pos).unwrap_or(usize::MAX));
                rows.extend(section);
            }
        }
    }

    // 4. Hierarchy indent, relative to the shallowest line present.
    if ctx.split_mode == SplitMode::Insurer {
        let min_depth = rows
            .iter()
            .filter_map(|r| dfs.get(&r.linemain).map(|(_, depth)| *depth))
            .min()
            .unwrap_or(0);
        for row in &mut rows {
            if let Some((_, depth)) = dfs.get(&row.linemain) {
                row.line_label = format!("{}{}", TABLE_INDENT.repeat(depth - min_depth), row.line_label);
            }
        }
    }

    // 5. Column configuration.
    let section_label = section_header(&rows, ctx.split_mode);
    let identifier_columns: Vec<TableColumn> = match ctx.split_mode {
        SplitMode::Line => vec![
            TableColumn::identifier(RANK_COLUMN, &section_label),
            TableColumn::identifier(INSURER_COLUMN, &section_label),
        ],
        SplitMode::Insurer => vec![
            TableColumn::identifier(LINE_COLUMN, &section_label),
            TableColumn::identifier(RANK_COLUMN, &section_label),
        ],
    };
    let columns = metric_columns(&ordered, ctx.period_type, ctx.visibility, ctx.registry);

    let primary = ctx.selected_metrics.first().map(String::as_str).unwrap_or_default();
    let line_labels: Vec<String> = ctx
        .selected_lines
        .iter()
        .map(|l| ctx.lines.label(l).to_string())
        .collect();

    debug!(
        rows_in = frame.len(),
        rows_out = rows.len(),
        columns = columns.len(),
        elapsed_us = start.elapsed().as_micros() as u64,
        "transformed table"
    );
    DisplayTable {
        split_mode: ctx.split_mode,
        identifier_columns,
        columns,
        rows,
        title: table_title(ctx.top_n),
        subtitle: table_subtitle(primary, &line_labels),
    }
}

/// Top header level above the identifier columns: the section's own label
/// when there is one section, otherwise the name of the grouping dimension.
fn section_header(rows: &[DisplayRow], split_mode: SplitMode) -> String {
    match rows.first() {
        Some(first) if rows.iter().all(|r| r.group == first.group) => first.group_label.clone(),
        Some(_) => match split_mode {
            SplitMode::Line => translate(LINE_COLUMN),
            SplitMode::Insurer => translate(INSURER_COLUMN),
        },
        None => String::new(),
    }
}

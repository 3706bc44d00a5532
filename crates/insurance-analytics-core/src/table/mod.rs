//! Wide display table built from the long-form frame.
//!
//! Cells keep absent, zero and undefined values apart; all three collapse to
//! `"-"` only when rendered.

pub mod columns;
pub mod transformer;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

pub use columns::{ColumnId, ColumnVisibility, TableColumn, Variant};
pub use transformer::{transform_table, TableContext};

use crate::labels::translate;
use crate::types::{InsurerKind, SplitMode};

/// Display symbol for any cell without a meaningful number.
pub const PLACEHOLDER: &str = "-";

pub const RANK_COLUMN: &str = "N";
pub const INSURER_COLUMN: &str = "insurer";
pub const LINE_COLUMN: &str = "linemain";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DisplayCell {
    Number(Decimal),
    /// Numerically zero.
    Zero,
    /// The cell exists but its value could not be computed.
    Undefined,
    /// No record for this row and column.
    Absent,
}

impl DisplayCell {
    pub fn from_value(value: Option<Decimal>) -> Self {
        match value {
            Some(v) if v.is_zero() => DisplayCell::Zero,
            Some(v) => DisplayCell::Number(v),
            None => DisplayCell::Undefined,
        }
    }

    pub fn number(&self) -> Option<Decimal> {
        match self {
            DisplayCell::Number(v) => Some(*v),
            DisplayCell::Zero => Some(Decimal::ZERO),
            _ => None,
        }
    }

    pub fn render(&self) -> String {
        match self {
            DisplayCell::Number(v) => v.normalize().to_string(),
            _ => PLACEHOLDER.to_string(),
        }
    }

    /// Fixed-precision text; percentages are scaled by 100 and suffixed.
    pub fn format(&self, column: &TableColumn) -> String {
        let DisplayCell::Number(v) = self else {
            return PLACEHOLDER.to_string();
        };
        let scaled = if column.percentage { *v * Decimal::ONE_HUNDRED } else { *v };
        let rounded = scaled.round_dp_with_strategy(column.precision, RoundingStrategy::MidpointAwayFromZero);
        let prec = column.precision as usize;
        if column.percentage {
            format!("{rounded:.prec$}%")
        } else {
            format!("{rounded:.prec$}")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowKind {
    /// A real insurer.
    Regular,
    /// A `top-N` cohort or the market total.
    Summary,
}

/// One display row. Identifiers keep their raw ids next to the labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayRow {
    pub kind: RowKind,
    /// Id of the section the row belongs to: a line in `line` split mode,
    /// an insurer in `insurer` split mode.
    pub group: String,
    pub group_label: String,
    pub insurer: String,
    pub insurer_label: String,
    pub linemain: String,
    /// Line label, indented by hierarchy depth in `insurer` split mode.
    pub line_label: String,
    pub rank: Option<String>,
    /// Values aligned with [`DisplayTable::columns`].
    pub cells: Vec<DisplayCell>,
}

impl DisplayRow {
    pub fn insurer_kind(&self) -> InsurerKind {
        InsurerKind::of(&self.insurer)
    }
}

/// Final display table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayTable {
    pub split_mode: SplitMode,
    /// Visible identifier columns, in display order.
    pub identifier_columns: Vec<TableColumn>,
    pub columns: Vec<TableColumn>,
    pub rows: Vec<DisplayRow>,
    pub title: String,
    pub subtitle: String,
}

impl DisplayTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, id: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.id == id)
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&DisplayCell> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.cells.get(idx))
    }

    /// Ids of identifier then metric columns, hidden ones included.
    pub fn header(&self) -> Vec<String> {
        self.identifier_columns
            .iter()
            .chain(self.columns.iter())
            .map(|c| c.id.clone())
            .collect()
    }

    /// Every row as display strings aligned with [`DisplayTable::header`].
    pub fn rendered_rows(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| {
                let mut out: Vec<String> = self
                    .identifier_columns
                    .iter()
                    .map(|c| match c.id.as_str() {
                        RANK_COLUMN => row.rank.clone().unwrap_or_else(|| PLACEHOLDER.to_string()),
                        INSURER_COLUMN => row.insurer_label.clone(),
                        _ => row.line_label.clone(),
                    })
                    .collect();
                out.extend(row.cells.iter().map(DisplayCell::render));
                out
            })
            .collect()
    }

    /// Visible columns with their header levels joined by `sep`.
    pub fn visible_header(&self, sep: &str) -> Vec<String> {
        self.visible_columns().map(|c| c.header.join(sep)).collect()
    }

    /// Visible cells formatted for display, aligned with
    /// [`DisplayTable::visible_header`].
    pub fn formatted_rows(&self) -> Vec<Vec<String>> {
        let n_id = self.identifier_columns.len();
        self.rendered_rows()
            .into_iter()
            .zip(&self.rows)
            .map(|(rendered, row)| {
                self.identifier_columns
                    .iter()
                    .chain(self.columns.iter())
                    .enumerate()
                    .filter(|(_, c)| !c.hidden)
                    .map(|(i, c)| {
                        if i < n_id {
                            rendered[i].clone()
                        } else {
                            row.cells[i - n_id].format(c)
                        }
                    })
                    .collect()
            })
            .collect()
    }

    fn visible_columns(&self) -> impl Iterator<Item = &TableColumn> {
        self.identifier_columns
            .iter()
            .chain(self.columns.iter())
            .filter(|c| !c.hidden)
    }

    /// Text shown instead of rows when the table is empty.
    pub fn placeholder(&self) -> Option<String> {
        self.is_empty().then(|| translate("no_data"))
    }
}

/// Table title for a cohort size.
pub fn table_title(top_n: u32) -> String {
    if top_n == 0 {
        "Страховщики".to_string()
    } else {
        format!("Топ-{top_n} страховщиков")
    }
}

/// `<metric label>: <line labels>`.
pub fn table_subtitle(metric: &str, line_labels: &[String]) -> String {
    format!("{}: {}", translate(metric), line_labels.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_cells_collapse_only_at_render() {
        assert_eq!(DisplayCell::from_value(Some(dec!(0))), DisplayCell::Zero);
        assert_eq!(DisplayCell::from_value(None), DisplayCell::Undefined);
        assert_ne!(DisplayCell::Zero, DisplayCell::Absent);
        for cell in [DisplayCell::Zero, DisplayCell::Undefined, DisplayCell::Absent] {
            assert_eq!(cell.render(), "-");
        }
        assert_eq!(DisplayCell::Number(dec!(1.50)).render(), "1.5");
    }

    #[test]
    fn test_format_uses_column_precision() {
        let mut column = TableColumn::identifier("x", "");
        column.precision = 3;
        assert_eq!(DisplayCell::Number(dec!(1234.5)).format(&column), "1234.500");
        column.percentage = true;
        column.precision = 2;
        assert_eq!(DisplayCell::Number(dec!(0.12345)).format(&column), "12.35%");
        assert_eq!(DisplayCell::Zero.format(&column), "-");
    }

    #[test]
    fn test_title_and_subtitle() {
        assert_eq!(table_title(10), "Топ-10 страховщиков");
        assert_eq!(
            table_subtitle("direct_premiums", &["Все линии".into(), "ОСАГО".into()]),
            format!("{}: Все линии, ОСАГО", translate("direct_premiums"))
        );
    }
}

//! Raw-data store: the two long-form tables plus the label dictionaries.
//!
//! Everything here is loaded once and read-only afterwards. Accessors hand
//! out copies so that no stage can mutate shared state.

use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::AnalyticsError;
use crate::frame::{quarters, FactRecord, Frame};
use crate::insurers::InsurerDirectory;
use crate::lines::LineTree;
use crate::types::{ReportingForm, YearQuarter};
use crate::AnalyticsResult;

const CORE_COLUMNS: [&str; 5] = ["year_quarter", "metric", "insurer", "linemain", "value"];

/// Locations of the raw tables and dictionaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataConfig {
    pub form_0420162: PathBuf,
    pub form_0420158: PathBuf,
    pub lines_0420162: PathBuf,
    pub lines_0420158: PathBuf,
    pub insurers: PathBuf,
}

impl DataConfig {
    /// Conventional file names inside one directory.
    pub fn from_dir(dir: &Path) -> Self {
        DataConfig {
            form_0420162: dir.join("form_0420162.csv"),
            form_0420158: dir.join("form_0420158.csv"),
            lines_0420162: dir.join("lines_0420162.json"),
            lines_0420158: dir.join("lines_0420158.json"),
            insurers: dir.join("insurers.json"),
        }
    }

    pub fn table_path(&self, form: ReportingForm) -> &Path {
        match form {
            ReportingForm::Form0420162 => &self.form_0420162,
            ReportingForm::Form0420158 => &self.form_0420158,
        }
    }

    pub fn lines_path(&self, form: ReportingForm) -> &Path {
        match form {
            ReportingForm::Form0420162 => &self.lines_0420162,
            ReportingForm::Form0420158 => &self.lines_0420158,
        }
    }
}

/// In-memory tables and dictionaries shared by all requests.
#[derive(Debug, Clone, Default)]
pub struct DataStore {
    tables: HashMap<ReportingForm, Frame>,
    lines: HashMap<ReportingForm, LineTree>,
    insurers: InsurerDirectory,
}

impl DataStore {
    pub fn new(insurers: InsurerDirectory) -> Self {
        DataStore {
            insurers,
            ..Default::default()
        }
    }

    pub fn with_form(mut self, form: ReportingForm, table: Frame, lines: LineTree) -> Self {
        self.tables.insert(form, table);
        self.lines.insert(form, lines);
        self
    }

    /// Loads every table and dictionary named by `config`.
    pub fn load(config: &DataConfig) -> AnalyticsResult<Self> {
        let mut store = DataStore::new(InsurerDirectory::from_path(&config.insurers)?);
        for form in ReportingForm::ALL {
            let table = read_table_path(config.table_path(form))?;
            let lines = LineTree::from_path(config.lines_path(form))?;
            info!(form = %form, rows = table.len(), lines = lines.len(), "loaded reporting form");
            store = store.with_form(form, table, lines);
        }
        Ok(store)
    }

    /// A private copy of the raw table for `form`.
    pub fn dataset(&self, form: ReportingForm) -> AnalyticsResult<Frame> {
        self.tables
            .get(&form)
            .cloned()
            .ok_or_else(|| AnalyticsError::InsufficientData(format!("no table loaded for form {form}")))
    }

    pub fn lines(&self, form: ReportingForm) -> AnalyticsResult<&LineTree> {
        self.lines
            .get(&form)
            .ok_or_else(|| AnalyticsError::InsufficientData(format!("no line tree loaded for form {form}")))
    }

    pub fn insurers(&self) -> &InsurerDirectory {
        &self.insurers
    }

    /// Sorted quarters present in the raw table of `form`.
    pub fn year_quarters(&self, form: ReportingForm) -> Vec<YearQuarter> {
        self.tables.get(&form).map(|t| quarters(t)).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

fn read_table_path(path: &Path) -> AnalyticsResult<Frame> {
    let file = std::fs::File::open(path).map_err(|e| AnalyticsError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let frame = read_table(file)?;
    debug!(path = %path.display(), rows = frame.len(), "read raw table");
    Ok(frame)
}

/// Parses a long-form CSV table. Columns beyond the five core ones become
/// grouping extras; an empty value cell is an absent value.
pub fn read_table<R: Read>(reader: R) -> AnalyticsResult<Frame> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = rdr.headers()?.clone();

    let mut positions = [0usize; 5];
    for (slot, name) in CORE_COLUMNS.iter().enumerate() {
        positions[slot] = headers.iter().position(|h| h == *name).ok_or_else(|| {
            AnalyticsError::invalid_input("csv header", format!("missing column '{name}'"))
        })?;
    }
    let extra_columns: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| !CORE_COLUMNS.contains(h))
        .map(|(i, h)| (i, h.to_string()))
        .collect();

    let mut frame = Frame::new();
    for (line_no, record) in rdr.records().enumerate() {
        let record = record?;
        let field = |slot: usize| record.get(positions[slot]).unwrap_or("");

        let year_quarter = parse_year_quarter(field(0)).map_err(|reason| {
            AnalyticsError::invalid_input("year_quarter", format!("row {}: {reason}", line_no + 2))
        })?;
        let value = parse_value(field(4)).map_err(|reason| {
            AnalyticsError::invalid_input("value", format!("row {}: {reason}", line_no + 2))
        })?;
        let extras: BTreeMap<String, String> = extra_columns
            .iter()
            .map(|(i, name)| (name.clone(), record.get(*i).unwrap_or("").to_string()))
            .collect();

        frame.push(FactRecord {
            year_quarter,
            metric: field(1).to_string(),
            insurer: field(2).to_string(),
            linemain: field(3).to_string(),
            extras,
            value,
        });
    }
    Ok(frame)
}

/// Accepts an ISO date (optionally with a time part) or a `YYYYQn` label.
fn parse_year_quarter(raw: &str) -> Result<YearQuarter, String> {
    let date_part = raw.split([' ', 'T']).next().unwrap_or(raw);
    if let Ok(date) = NaiveDate::parse_from_str(date_part, "%Y-%m-%d") {
        return Ok(YearQuarter::from_date(date));
    }
    YearQuarter::from_str(raw).map_err(|_| format!("cannot parse '{raw}' as a date"))
}

fn parse_value(raw: &str) -> Result<Option<Decimal>, String> {
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map(Some)
        .map_err(|_| format!("cannot parse '{raw}' as a number"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const CSV: &str = "\
year_quarter,metric,insurer,linemain,value,region
2024-01-01,direct_premiums,1,все линии,100.5,north
2024-04-01 00:00:00,direct_premiums,1,все линии,,north
2024-07-01,direct_premiums,total,все линии,1e3,north
";

    #[test]
    fn test_read_table_parses_dates_values_and_extras() {
        let frame = read_table(CSV.as_bytes()).unwrap();
        assert_eq!(frame.len(), 3);
        assert_eq!(frame[0].year_quarter, YearQuarter::new(2024, 1).unwrap());
        assert_eq!(frame[0].value, Some(dec!(100.5)));
        assert_eq!(frame[1].year_quarter, YearQuarter::new(2024, 2).unwrap());
        assert_eq!(frame[1].value, None);
        assert_eq!(frame[2].value, Some(dec!(1000)));
        assert_eq!(frame[0].extras.get("region").map(String::as_str), Some("north"));
    }

    #[test]
    fn test_read_table_missing_column() {
        let err = read_table("year_quarter,metric,value\n".as_bytes()).unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidInput { .. }));
    }

    #[test]
    fn test_dataset_returns_a_copy() {
        let table = read_table(CSV.as_bytes()).unwrap();
        let store = DataStore::default().with_form(ReportingForm::Form0420162, table, LineTree::default());
        let mut copy = store.dataset(ReportingForm::Form0420162).unwrap();
        copy.clear();
        assert_eq!(store.dataset(ReportingForm::Form0420162).unwrap().len(), 3);
        assert!(store.dataset(ReportingForm::Form0420158).is_err());
    }

    #[test]
    fn test_load_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("form_0420162.csv"), CSV).unwrap();
        std::fs::write(
            dir.path().join("form_0420158.csv"),
            "year_quarter,metric,insurer,linemain,value\n",
        )
        .unwrap();
        let tree = r#"{"все линии": {"label": "Все линии"}}"#;
        std::fs::write(dir.path().join("lines_0420162.json"), tree).unwrap();
        std::fs::write(dir.path().join("lines_0420158.json"), tree).unwrap();
        std::fs::write(dir.path().join("insurers.json"), "[]").unwrap();

        let store = DataStore::load(&DataConfig::from_dir(dir.path())).unwrap();
        assert_eq!(
            store.year_quarters(ReportingForm::Form0420162).len(),
            3
        );
        assert!(store.dataset(ReportingForm::Form0420158).unwrap().is_empty());
        assert_eq!(store.insurers().map_insurer("total"), "Весь рынок");
    }
}

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::AnalyticsError;

/// Metric values. `None` marks a structurally absent or undefined cell.
pub type Value = Option<Decimal>;

/// Market aggregate insurer id present in raw data.
pub const TOTAL_INSURER: &str = "total";

/// Pseudo insurer id for the remainder of the market.
pub const OTHERS_INSURER: &str = "others";

/// Root node of every line hierarchy.
pub const ROOT_LINE: &str = "все линии";

/// Cohort sizes for the synthetic `top-N` rows.
pub const TOP_N_COHORTS: [u32; 3] = [5, 10, 20];

// ---------------------------------------------------------------------------
// Reporting form
// ---------------------------------------------------------------------------

/// Regulatory report schema a dataset comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReportingForm {
    #[default]
    #[serde(rename = "0420162")]
    Form0420162,
    #[serde(rename = "0420158")]
    Form0420158,
}

impl ReportingForm {
    pub const ALL: [ReportingForm; 2] = [ReportingForm::Form0420162, ReportingForm::Form0420158];

    pub fn code(&self) -> &'static str {
        match self {
            ReportingForm::Form0420162 => "0420162",
            ReportingForm::Form0420158 => "0420158",
        }
    }
}

impl fmt::Display for ReportingForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for ReportingForm {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "0420162" => Ok(ReportingForm::Form0420162),
            "0420158" => Ok(ReportingForm::Form0420158),
            other => Err(AnalyticsError::UnknownReportingForm(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Year-quarter
// ---------------------------------------------------------------------------

/// A calendar quarter. Orders chronologically and renders as `YYYYQn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct YearQuarter {
    pub year: i32,
    pub quarter: u32,
}

impl YearQuarter {
    pub fn new(year: i32, quarter: u32) -> Result<Self, AnalyticsError> {
        if !(1..=4).contains(&quarter) {
            return Err(AnalyticsError::InvalidQuarter {
                quarter: format!("{year}Q{quarter}"),
                reason: "quarter must be between 1 and 4".into(),
            });
        }
        Ok(YearQuarter { year, quarter })
    }

    /// The quarter containing `date`.
    pub fn from_date(date: NaiveDate) -> Self {
        YearQuarter {
            year: date.year(),
            quarter: (date.month0() / 3) + 1,
        }
    }

    /// First day of the quarter.
    pub fn start_date(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, (self.quarter - 1) * 3 + 1, 1).unwrap_or_default()
    }

    /// Last day of the quarter.
    pub fn end_date(&self) -> NaiveDate {
        self.shift(1).start_date().pred_opt().unwrap_or_default()
    }

    /// Linear index, used for quarter arithmetic.
    pub fn index(&self) -> i64 {
        self.year as i64 * 4 + (self.quarter as i64 - 1)
    }

    pub fn from_index(idx: i64) -> Self {
        YearQuarter {
            year: idx.div_euclid(4) as i32,
            quarter: idx.rem_euclid(4) as u32 + 1,
        }
    }

    /// Moves `n` quarters forward (negative `n` moves back).
    pub fn shift(&self, n: i64) -> Self {
        YearQuarter::from_index(self.index() + n)
    }
}

impl fmt::Display for YearQuarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Q{}", self.year, self.quarter)
    }
}

impl FromStr for YearQuarter {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| AnalyticsError::InvalidQuarter {
            quarter: s.to_string(),
            reason: reason.to_string(),
        };
        let trimmed = s.trim();
        let (year, quarter) = trimmed
            .split_once(['Q', 'q'])
            .ok_or_else(|| invalid("expected format YYYYQn"))?;
        let year: i32 = year.parse().map_err(|_| invalid("year is not a number"))?;
        let quarter: u32 = quarter
            .parse()
            .map_err(|_| invalid("quarter is not a number"))?;
        YearQuarter::new(year, quarter)
    }
}

impl Serialize for YearQuarter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for YearQuarter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Request enums
// ---------------------------------------------------------------------------

/// Period-type semantics applied by the period engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodType {
    /// Quarter over quarter.
    Qoq,
    /// Same quarter of each year.
    YoyQ,
    /// Trailing four quarters at the end quarter of each year.
    YoyY,
    /// Year to date.
    #[default]
    Ytd,
    /// Moving annual total.
    Mat,
}

impl PeriodType {
    pub fn code(&self) -> &'static str {
        match self {
            PeriodType::Qoq => "qoq",
            PeriodType::YoyQ => "yoy_q",
            PeriodType::YoyY => "yoy_y",
            PeriodType::Ytd => "ytd",
            PeriodType::Mat => "mat",
        }
    }
}

impl FromStr for PeriodType {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().replace('-', "_").as_str() {
            "qoq" => Ok(PeriodType::Qoq),
            "yoy_q" => Ok(PeriodType::YoyQ),
            "yoy_y" => Ok(PeriodType::YoyY),
            "ytd" => Ok(PeriodType::Ytd),
            "mat" => Ok(PeriodType::Mat),
            other => Err(AnalyticsError::invalid_input(
                "period_type",
                format!("unknown period type '{other}'"),
            )),
        }
    }
}

/// Whether the display table is partitioned per line or per insurer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitMode {
    #[default]
    Line,
    Insurer,
}

/// Direct insurance or inward reinsurance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusinessType {
    Direct,
    Inward,
}

impl BusinessType {
    pub const ALL: [BusinessType; 2] = [BusinessType::Direct, BusinessType::Inward];

    /// Name prefix shared by the base metrics of this business type.
    pub fn metric_prefix(&self) -> &'static str {
        match self {
            BusinessType::Direct => "direct_",
            BusinessType::Inward => "inward_",
        }
    }
}

/// Unit of a metric. Drives formatting and the market-share/growth skip policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitType {
    Value,
    Quantity,
    Ratio,
    AverageValue,
}

/// What an insurer id stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "n", rename_all = "snake_case")]
pub enum InsurerKind {
    Real,
    TopN(u32),
    Total,
}

impl InsurerKind {
    pub fn of(insurer: &str) -> Self {
        if insurer == TOTAL_INSURER {
            return InsurerKind::Total;
        }
        match insurer
            .strip_prefix("top-")
            .and_then(|n| n.parse::<u32>().ok())
        {
            Some(n) => InsurerKind::TopN(n),
            None => InsurerKind::Real,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        !matches!(self, InsurerKind::Real)
    }
}

/// Synthetic insurer id of a top-N cohort.
pub fn top_n_id(n: u32) -> String {
    format!("top-{n}")
}

// ---------------------------------------------------------------------------
// Output envelope
// ---------------------------------------------------------------------------

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}

use std::path::Path;

use clap::{Args, ValueEnum};
use serde_json::Value;

use insurance_analytics_core::{
    pipeline, PeriodType, PipelineRequest, ReportingForm, SplitMode, YearQuarter,
};

use crate::input;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SplitArg {
    Line,
    Insurer,
}

impl From<SplitArg> for SplitMode {
    fn from(arg: SplitArg) -> Self {
        match arg {
            SplitArg::Line => SplitMode::Line,
            SplitArg::Insurer => SplitMode::Insurer,
        }
    }
}

/// Arguments for a pipeline run. Flags override fields of the request file.
#[derive(Args)]
pub struct RunArgs {
    /// Path to a JSON or YAML request file
    #[arg(long)]
    pub input: Option<String>,

    /// Reporting form (0420162 or 0420158)
    #[arg(long)]
    pub form: Option<ReportingForm>,

    /// Metric to show; repeat for secondary metrics
    #[arg(long = "metric")]
    pub metrics: Vec<String>,

    /// Line code; repeat for several lines
    #[arg(long = "line")]
    pub lines: Vec<String>,

    /// Insurer id, `top-N` or `total`; repeat for several
    #[arg(long = "insurer")]
    pub insurers: Vec<String>,

    /// Period type: qoq, yoy_q, yoy_y, ytd or mat
    #[arg(long)]
    pub period_type: Option<PeriodType>,

    /// Number of displayed periods
    #[arg(long)]
    pub num_periods: Option<usize>,

    /// Last quarter of the window, e.g. 2024Q3
    #[arg(long)]
    pub end_quarter: Option<YearQuarter>,

    /// Top cohort size; 0 for none
    #[arg(long)]
    pub top_n: Option<u32>,

    /// Table partitioning
    #[arg(long)]
    pub split: Option<SplitArg>,

    /// Hide market-share columns
    #[arg(long)]
    pub hide_market_share: bool,

    /// Hide change columns
    #[arg(long)]
    pub hide_change: bool,
}

fn base_request(args: &RunArgs) -> Result<PipelineRequest, Box<dyn std::error::Error>> {
    if let Some(ref path) = args.input {
        return input::file::read_request(path);
    }
    Ok(input::stdin::read_request()?.unwrap_or_default())
}

pub fn build_request(args: &RunArgs) -> Result<PipelineRequest, Box<dyn std::error::Error>> {
    let mut request = base_request(args)?;
    if let Some(form) = args.form {
        request.reporting_form = form;
    }
    if !args.metrics.is_empty() {
        request.selected_metrics = args.metrics.clone();
    }
    if !args.lines.is_empty() {
        request.selected_lines = args.lines.clone();
    }
    if !args.insurers.is_empty() {
        request.selected_insurers = args.insurers.clone();
    }
    if let Some(period_type) = args.period_type {
        request.period_type = period_type;
    }
    if let Some(n) = args.num_periods {
        request.num_periods = n;
    }
    if args.end_quarter.is_some() {
        request.end_quarter = args.end_quarter;
    }
    if let Some(top_n) = args.top_n {
        request.top_n = top_n;
    }
    if let Some(split) = args.split {
        request.split_mode = split.into();
    }
    request.show_market_share &= !args.hide_market_share;
    request.show_change &= !args.hide_change;
    Ok(request)
}

pub fn run_pipeline(args: RunArgs, data_dir: &Path) -> Result<Value, Box<dyn std::error::Error>> {
    let request = build_request(&args)?;
    let store = super::load_store(data_dir)?;
    let result = pipeline::run_pipeline(&store, &request)?;
    Ok(serde_json::to_value(result)?)
}

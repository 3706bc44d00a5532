use std::path::Path;

use clap::Args;
use serde_json::{json, Value};

use insurance_analytics_core::lines::LineTree;
use insurance_analytics_core::metrics::options::{default_metrics, metric_options};
use insurance_analytics_core::metrics::MetricRegistry;
use insurance_analytics_core::period::year_quarter_options;
use insurance_analytics_core::{DataConfig, ReportingForm, ROOT_LINE};

/// Arguments for the metric dropdowns
#[derive(Args)]
pub struct MetricsArgs {
    /// Reporting form (0420162 or 0420158)
    #[arg(long, default_value = "0420162")]
    pub form: ReportingForm,

    /// Currently selected primary metric; repeat for several
    #[arg(long = "metric")]
    pub metrics: Vec<String>,

    /// Currently selected secondary metric
    #[arg(long)]
    pub secondary: Option<String>,
}

/// Arguments for the line dropdown
#[derive(Args)]
pub struct LinesArgs {
    #[arg(long, default_value = "0420162")]
    pub form: ReportingForm,

    /// Deepest tree level to list
    #[arg(long)]
    pub max_depth: Option<usize>,
}

/// Arguments for the quarter dropdown
#[derive(Args)]
pub struct QuartersArgs {
    #[arg(long, default_value = "0420162")]
    pub form: ReportingForm,
}

/// Arguments for the insurer dropdown
#[derive(Args)]
pub struct InsurersArgs {
    #[arg(long, default_value = "0420162")]
    pub form: ReportingForm,

    /// Ranking metric; the form default when omitted
    #[arg(long = "metric")]
    pub metrics: Vec<String>,

    /// Lines the ranking sums over
    #[arg(long = "line")]
    pub lines: Vec<String>,
}

pub fn run_metrics(args: MetricsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let options = metric_options(
        args.form,
        &args.metrics,
        args.secondary.as_deref(),
        MetricRegistry::standard(),
    );
    Ok(serde_json::to_value(options)?)
}

pub fn run_lines(args: LinesArgs, data_dir: &Path) -> Result<Value, Box<dyn std::error::Error>> {
    let config = DataConfig::from_dir(data_dir);
    let tree = LineTree::from_path(config.lines_path(args.form))?;
    Ok(json!({ "options": tree.options(args.max_depth) }))
}

pub fn run_quarters(args: QuartersArgs, data_dir: &Path) -> Result<Value, Box<dyn std::error::Error>> {
    let store = super::load_store(data_dir)?;
    let available = store.year_quarters(args.form);
    Ok(json!({
        "latest": available.last().map(|q| q.to_string()),
        "options": year_quarter_options(&available),
    }))
}

pub fn run_insurers(args: InsurersArgs, data_dir: &Path) -> Result<Value, Box<dyn std::error::Error>> {
    let store = super::load_store(data_dir)?;
    let metrics = if args.metrics.is_empty() {
        default_metrics(args.form)
    } else {
        args.metrics
    };
    let lines = if args.lines.is_empty() {
        vec![ROOT_LINE.to_string()]
    } else {
        args.lines
    };
    let frame = store.dataset(args.form)?;
    let options = store.insurers().options(&frame, &metrics, &lines);
    Ok(json!({ "options": options }))
}

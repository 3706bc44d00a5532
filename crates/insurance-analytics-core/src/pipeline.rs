use std::collections::HashSet;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug_span, info};

use crate::error::AnalyticsError;
use crate::frame::Frame;
use crate::growth::add_growth_rows;
use crate::insurer_filter::{compute_rankings, filter_by_insurer, InsurerSelection, Rankings};
use crate::market_share::add_market_share_rows;
use crate::metrics::business_type::{business_type_config, BusinessTypeConfig};
use crate::metrics::calculator::{
    calculate_metrics, calculation_order, filter_by_business_type, required_metrics,
};
use crate::metrics::registry::{strip_metric_suffix, MetricRegistry};
use crate::period::{filter_by_period_type, get_start_quarter};
use crate::store::DataStore;
use crate::table::{transform_table, ColumnVisibility, DisplayTable, TableContext};
use crate::top_n::add_top_n_rows;
use crate::types::{
    with_metadata, BusinessType, ComputationOutput, PeriodType, ReportingForm, SplitMode,
    YearQuarter, ROOT_LINE, TOP_N_COHORTS, TOTAL_INSURER,
};
use crate::AnalyticsResult;

// ---------------------------------------------------------------------------
// Input / Output types
// ---------------------------------------------------------------------------

/// One dashboard request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineRequest {
    pub reporting_form: ReportingForm,
    /// First is the primary metric, the rest are secondary.
    pub selected_metrics: Vec<String>,
    pub business_type: Vec<BusinessType>,
    /// Line codes of the form's tree.
    pub selected_lines: Vec<String>,
    /// Last quarter of the window; the latest available when `None`.
    pub end_quarter: Option<YearQuarter>,
    pub num_periods: usize,
    pub period_type: PeriodType,
    /// Insurer ids, possibly including `top-5`, `top-10`, `top-20`, `total`.
    pub selected_insurers: Vec<String>,
    /// Cohort size; 0 means none.
    pub top_n: u32,
    pub split_mode: SplitMode,
    pub show_market_share: bool,
    pub show_change: bool,
}

impl Default for PipelineRequest {
    fn default() -> Self {
        PipelineRequest {
            reporting_form: ReportingForm::Form0420162,
            selected_metrics: vec!["direct_premiums".to_string()],
            business_type: vec![BusinessType::Direct],
            selected_lines: vec![ROOT_LINE.to_string()],
            end_quarter: None,
            num_periods: 5,
            period_type: PeriodType::Ytd,
            selected_insurers: Vec::new(),
            top_n: 10,
            split_mode: SplitMode::Line,
            show_market_share: true,
            show_change: true,
        }
    }
}

/// Pipeline result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub table: DisplayTable,
    pub rankings: Rankings,
    /// Business-type checklist state the request ran with.
    pub business_type: BusinessTypeConfig,
    /// Metrics the calculator materialised, in evaluation order.
    pub calculation_order: Vec<String>,
    pub end_quarter: YearQuarter,
    /// First quarter the window reads, when history allows.
    pub start_quarter: Option<YearQuarter>,
}

/// Long-form result of stages 3 to 9 plus the state the table needs.
#[derive(Debug, Clone)]
pub struct PreparedFrame {
    pub frame: Frame,
    pub rankings: Rankings,
    pub business_type: BusinessTypeConfig,
    pub calculation_order: Vec<String>,
    pub end_quarter: YearQuarter,
    pub start_quarter: Option<YearQuarter>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Runs the whole pipeline for one request and returns the display table.
pub fn run_pipeline(
    store: &DataStore,
    request: &PipelineRequest,
) -> AnalyticsResult<ComputationOutput<PipelineOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();
    info!(
        form = %request.reporting_form,
        metrics = ?request.selected_metrics,
        period_type = request.period_type.code(),
        split_mode = ?request.split_mode,
        "running pipeline"
    );

    let prepared = prepare_frame(store, request)?;
    if prepared.frame.is_empty() {
        warnings.push("No data after filters".to_string());
    } else if prepared.rankings.previous_quarter.is_none() {
        warnings.push(format!(
            "End quarter {} has no prior period for ranking",
            prepared.end_quarter
        ));
    }
    if prepared.start_quarter.is_none() {
        warnings.push(format!(
            "Not enough history for {} periods of type {}",
            request.num_periods,
            request.period_type.code()
        ));
    }

    // ------------------------------------------------------------------
    // 10. Table transformer
    // ------------------------------------------------------------------
    let lines = store.lines(request.reporting_form)?;
    let table = {
        let _span = debug_span!("stage", name = "table").entered();
        // A `top-k` marker sets the cohort when `top_n` is 0.
        let cohort = InsurerSelection::from_request(&request.selected_insurers, request.top_n).cohort;
        let ctx = TableContext {
            selected_metrics: &request.selected_metrics,
            selected_lines: &request.selected_lines,
            rankings: &prepared.rankings,
            split_mode: request.split_mode,
            period_type: request.period_type,
            top_n: u32::try_from(cohort).unwrap_or(request.top_n),
            visibility: ColumnVisibility {
                show_market_share: request.show_market_share,
                show_change: request.show_change,
            },
            show_total: request.selected_insurers.iter().any(|i| i == TOTAL_INSURER),
            lines,
            insurers: store.insurers(),
            registry: MetricRegistry::standard(),
        };
        transform_table(&prepared.frame, &ctx)
    };

    let output = PipelineOutput {
        table,
        rankings: prepared.rankings,
        business_type: prepared.business_type,
        calculation_order: prepared.calculation_order,
        end_quarter: prepared.end_quarter,
        start_quarter: prepared.start_quarter,
    };
    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Insurance market table: metric DAG, period transform, top-N, market share, growth",
        request,
        warnings,
        elapsed,
        output,
    ))
}

/// Stages 3 to 9: everything up to the long-form frame the table pivots.
pub fn prepare_frame(store: &DataStore, request: &PipelineRequest) -> AnalyticsResult<PreparedFrame> {
    let registry = MetricRegistry::standard();

    // ------------------------------------------------------------------
    // 1. Validate
    // ------------------------------------------------------------------
    validate_request(store, request, registry)?;
    let available = store.year_quarters(request.reporting_form);
    let end = resolve_end_quarter(request.end_quarter, &available)?;
    let start_quarter = get_start_quarter(end, request.period_type, request.num_periods, &available);

    // ------------------------------------------------------------------
    // 2. Metrics to materialise
    // ------------------------------------------------------------------
    let business_type = business_type_config(
        &request.selected_metrics,
        request.reporting_form,
        &request.business_type,
        registry,
    );
    let required = filter_by_business_type(
        &required_metrics(&request.selected_metrics, registry),
        &business_type.values,
    );
    let order = calculation_order(&required, registry);

    // ------------------------------------------------------------------
    // 3. Line / metric pre-filter
    // ------------------------------------------------------------------
    let raw = store.dataset(request.reporting_form)?;
    let frame: Frame = {
        let _span = debug_span!("stage", name = "prefilter").entered();
        let lines: HashSet<&str> = request.selected_lines.iter().map(String::as_str).collect();
        let metrics: HashSet<&str> = required.iter().map(String::as_str).collect();
        raw.into_iter()
            .filter(|r| lines.contains(r.linemain.as_str()) && metrics.contains(r.metric.as_str()))
            .collect()
    };

    // ------------------------------------------------------------------
    // 4. Period filter and transform
    // ------------------------------------------------------------------
    let frame = {
        let _span = debug_span!("stage", name = "period").entered();
        filter_by_period_type(&frame, end, request.period_type, request.num_periods)
    };

    // ------------------------------------------------------------------
    // 5-6. Top-N cohorts, then the metric DAG
    // ------------------------------------------------------------------
    let frame = {
        let _span = debug_span!("stage", name = "top_n").entered();
        add_top_n_rows(&frame, &TOP_N_COHORTS)
    };
    let frame = {
        let _span = debug_span!("stage", name = "calculate").entered();
        let selected: Vec<String> = request
            .selected_metrics
            .iter()
            .map(|m| strip_metric_suffix(m))
            .collect();
        calculate_metrics(&frame, &selected, &order, registry)
    };

    // ------------------------------------------------------------------
    // 7. Rankings and insurer filter
    // ------------------------------------------------------------------
    let rankings = compute_rankings(&frame, &request.selected_metrics);
    let frame = {
        let _span = debug_span!("stage", name = "insurers").entered();
        let selection = InsurerSelection::from_request(&request.selected_insurers, request.top_n);
        filter_by_insurer(&frame, &request.selected_metrics, &selection, request.split_mode)
    };

    // ------------------------------------------------------------------
    // 8-9. Market share and growth
    // ------------------------------------------------------------------
    let frame = {
        let _span = debug_span!("stage", name = "market_share").entered();
        add_market_share_rows(&frame)
    };
    let frame = {
        let _span = debug_span!("stage", name = "growth").entered();
        add_growth_rows(&frame, request.num_periods)
    };

    Ok(PreparedFrame {
        frame,
        rankings,
        business_type,
        calculation_order: order,
        end_quarter: end,
        start_quarter,
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_request(
    store: &DataStore,
    request: &PipelineRequest,
    registry: &MetricRegistry,
) -> AnalyticsResult<()> {
    if request.selected_metrics.is_empty() {
        return Err(AnalyticsError::invalid_input(
            "selected_metrics",
            "at least one metric is required",
        ));
    }
    if let Some(unknown) = request
        .selected_metrics
        .iter()
        .find(|m| !registry.contains(&strip_metric_suffix(m)))
    {
        return Err(AnalyticsError::UnknownMetric(unknown.clone()));
    }
    if request.selected_lines.is_empty() {
        return Err(AnalyticsError::invalid_input(
            "selected_lines",
            "at least one line is required",
        ));
    }
    let tree = store.lines(request.reporting_form)?;
    if let Some(unknown) = request.selected_lines.iter().find(|l| !tree.contains(l)) {
        return Err(AnalyticsError::UnknownLine {
            line: unknown.clone(),
            form: request.reporting_form.to_string(),
        });
    }
    if request.num_periods == 0 {
        return Err(AnalyticsError::invalid_input("num_periods", "must be at least 1"));
    }
    Ok(())
}

fn resolve_end_quarter(requested: Option<YearQuarter>, available: &[YearQuarter]) -> AnalyticsResult<YearQuarter> {
    match requested {
        Some(q) if available.contains(&q) => Ok(q),
        Some(q) => Err(AnalyticsError::InvalidQuarter {
            quarter: q.to_string(),
            reason: "no data for this quarter".into(),
        }),
        None => available.last().copied().ok_or_else(|| {
            AnalyticsError::InsufficientData("the reporting form has no quarters".into())
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults_from_partial_json() {
        let req: PipelineRequest =
            serde_json::from_str(r#"{"reporting_form": "0420158", "top_n": 5}"#).unwrap();
        assert_eq!(req.reporting_form, ReportingForm::Form0420158);
        assert_eq!(req.top_n, 5);
        assert_eq!(req.selected_metrics, vec!["direct_premiums".to_string()]);
        assert_eq!(req.period_type, PeriodType::Ytd);
        assert_eq!(req.num_periods, 5);
        assert!(req.show_change);
    }

    #[test]
    fn test_resolve_end_quarter() {
        let q = |s: &str| s.parse::<YearQuarter>().unwrap();
        let available = vec![q("2024Q1"), q("2024Q2")];
        assert_eq!(resolve_end_quarter(None, &available).unwrap(), q("2024Q2"));
        assert_eq!(resolve_end_quarter(Some(q("2024Q1")), &available).unwrap(), q("2024Q1"));
        assert!(matches!(
            resolve_end_quarter(Some(q("2025Q1")), &available),
            Err(AnalyticsError::InvalidQuarter { .. })
        ));
        assert!(resolve_end_quarter(None, &[]).is_err());
    }
}

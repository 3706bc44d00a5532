use std::path::Path;

use napi::Result as NapiResult;
use napi_derive::napi;
use once_cell::sync::OnceCell;

use insurance_analytics_core::metrics::business_type::business_type_config;
use insurance_analytics_core::metrics::options::metric_options;
use insurance_analytics_core::metrics::MetricRegistry;
use insurance_analytics_core::period::{get_start_quarter, year_quarter_options};
use insurance_analytics_core::{
    BusinessType, DataConfig, DataStore, PeriodType, PipelineRequest, ReportingForm, YearQuarter,
};
use serde::Deserialize;

/// Store shared by every call after `init_store`.
static STORE: OnceCell<DataStore> = OnceCell::new();

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

fn store() -> NapiResult<&'static DataStore> {
    STORE
        .get()
        .ok_or_else(|| to_napi_error("data store not initialised; call initStore first"))
}

fn parse_form(form: &str) -> NapiResult<ReportingForm> {
    form.parse().map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Loads the raw tables from `data_dir`. Later calls are no-ops.
#[napi]
pub fn init_store(data_dir: String) -> NapiResult<()> {
    if STORE.get().is_some() {
        return Ok(());
    }
    let loaded = DataStore::load(&DataConfig::from_dir(Path::new(&data_dir))).map_err(to_napi_error)?;
    // A concurrent initialisation may have won; both loaded the same files.
    let _ = STORE.set(loaded);
    Ok(())
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[napi]
pub fn run_pipeline(request_json: String) -> NapiResult<String> {
    let request: PipelineRequest = serde_json::from_str(&request_json).map_err(to_napi_error)?;
    let output = insurance_analytics_core::run_pipeline(store()?, &request).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Dropdown options
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct MetricOptionsInput {
    reporting_form: ReportingForm,
    #[serde(default)]
    primary: Vec<String>,
    #[serde(default)]
    secondary: Option<String>,
}

#[napi]
pub fn metric_options_json(input_json: String) -> NapiResult<String> {
    let input: MetricOptionsInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let options = metric_options(
        input.reporting_form,
        &input.primary,
        input.secondary.as_deref(),
        MetricRegistry::standard(),
    );
    serde_json::to_string(&options).map_err(to_napi_error)
}

#[derive(Deserialize)]
struct BusinessTypeInput {
    reporting_form: ReportingForm,
    selected_metrics: Vec<String>,
    #[serde(default)]
    current: Vec<BusinessType>,
}

#[napi]
pub fn business_type_options(input_json: String) -> NapiResult<String> {
    let input: BusinessTypeInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let config = business_type_config(
        &input.selected_metrics,
        input.reporting_form,
        &input.current,
        MetricRegistry::standard(),
    );
    serde_json::to_string(&config).map_err(to_napi_error)
}

#[napi]
pub fn line_options(reporting_form: String, max_depth: Option<u32>) -> NapiResult<String> {
    let tree = store()?.lines(parse_form(&reporting_form)?).map_err(to_napi_error)?;
    let options = tree.options(max_depth.map(|d| d as usize));
    serde_json::to_string(&options).map_err(to_napi_error)
}

#[derive(Deserialize)]
struct LineSelectionInput {
    reporting_form: ReportingForm,
    previous: Vec<String>,
    added: Option<String>,
    #[serde(default)]
    detailize: bool,
}

/// Applies a toggle to the line selection and normalises it.
#[napi]
pub fn line_selection(input_json: String) -> NapiResult<String> {
    let input: LineSelectionInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let tree = store()?.lines(input.reporting_form).map_err(to_napi_error)?;
    let toggled = match input.added {
        Some(added) => tree.toggle_selection(&input.previous, &added),
        None => input.previous,
    };
    let selection = tree.normalize_selection(&toggled, input.detailize);
    serde_json::to_string(&selection).map_err(to_napi_error)
}

#[napi]
pub fn insurer_options(reporting_form: String, metrics_json: String, lines_json: String) -> NapiResult<String> {
    let form = parse_form(&reporting_form)?;
    let metrics: Vec<String> = serde_json::from_str(&metrics_json).map_err(to_napi_error)?;
    let lines: Vec<String> = serde_json::from_str(&lines_json).map_err(to_napi_error)?;
    let store = store()?;
    let frame = store.dataset(form).map_err(to_napi_error)?;
    let options = store.insurers().options(&frame, &metrics, &lines);
    serde_json::to_string(&options).map_err(to_napi_error)
}

#[napi]
pub fn year_quarters(reporting_form: String) -> NapiResult<String> {
    let available = store()?.year_quarters(parse_form(&reporting_form)?);
    serde_json::to_string(&year_quarter_options(&available)).map_err(to_napi_error)
}

/// First quarter the window needs, or `null` when history is short.
#[napi]
pub fn start_quarter(
    reporting_form: String,
    end_quarter: String,
    period_type: String,
    num_periods: u32,
) -> NapiResult<Option<String>> {
    let available = store()?.year_quarters(parse_form(&reporting_form)?);
    let end: YearQuarter = end_quarter.parse().map_err(to_napi_error)?;
    let period_type: PeriodType = period_type.parse().map_err(to_napi_error)?;
    Ok(get_start_quarter(end, period_type, num_periods as usize, &available).map(|q| q.to_string()))
}

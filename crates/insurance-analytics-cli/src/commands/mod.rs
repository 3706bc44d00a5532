pub mod options;
pub mod run;

use std::path::Path;

use insurance_analytics_core::{DataConfig, DataStore};
use tracing::debug;

/// Loads every table and dictionary under `data_dir`.
pub fn load_store(data_dir: &Path) -> Result<DataStore, Box<dyn std::error::Error>> {
    debug!(data_dir = %data_dir.display(), "loading data store");
    Ok(DataStore::load(&DataConfig::from_dir(data_dir))?)
}

pub mod error;
pub mod frame;
pub mod growth;
pub mod insurer_filter;
pub mod insurers;
pub mod labels;
pub mod lines;
pub mod market_share;
pub mod metrics;
pub mod period;
pub mod pipeline;
pub mod store;
pub mod table;
pub mod top_n;
pub mod types;

pub use error::AnalyticsError;
pub use frame::{FactRecord, Frame};
pub use pipeline::{prepare_frame, run_pipeline, PipelineOutput, PipelineRequest};
pub use store::{DataConfig, DataStore};
pub use types::*;

/// Standard result type for all analytics operations
pub type AnalyticsResult<T> = Result<T, AnalyticsError>;

pub mod business_type;
pub mod calculator;
pub mod options;
pub mod registry;

pub use registry::{MetricDefinition, MetricRegistry};

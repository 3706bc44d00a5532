use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Unknown reporting form: {0}")]
    UnknownReportingForm(String),

    #[error("Unknown line '{line}' for reporting form {form}")]
    UnknownLine { line: String, form: String },

    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    #[error("Invalid quarter: {quarter} — {reason}")]
    InvalidQuarter { quarter: String, reason: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("I/O error reading {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl AnalyticsError {
    pub fn invalid_input(field: &str, reason: impl Into<String>) -> Self {
        AnalyticsError::InvalidInput {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for AnalyticsError {
    fn from(e: serde_json::Error) -> Self {
        AnalyticsError::SerializationError(e.to_string())
    }
}

impl From<csv::Error> for AnalyticsError {
    fn from(e: csv::Error) -> Self {
        AnalyticsError::Csv(e.to_string())
    }
}

use std::io::{self, Read};

use insurance_analytics_core::PipelineRequest;

/// Reads a request piped on stdin, JSON first and YAML otherwise.
/// Returns `None` when stdin is a terminal or carries nothing.
pub fn read_request() -> Result<Option<PipelineRequest>, Box<dyn std::error::Error>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }

    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;
    let trimmed = buffer.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    match serde_json::from_str(trimmed) {
        Ok(request) => Ok(Some(request)),
        Err(json_err) => serde_yaml::from_str(trimmed)
            .map(Some)
            .map_err(|_| format!("stdin is neither a JSON nor a YAML request: {json_err}").into()),
    }
}

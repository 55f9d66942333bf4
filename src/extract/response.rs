//! Cleanup of raw extraction-service responses.

use serde_json::{Map, Value};
use tracing::debug;

/// Strip a markdown code fence around a JSON object, if present.
///
/// When the response contains a fence, everything from the first `{` to the
/// last `}` is kept. Unfenced responses are only trimmed.
pub fn strip_code_fence(response: &str) -> &str {
    let trimmed = response.trim();
    if !trimmed.contains("```") {
        return trimmed;
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => "",
    }
}

/// Parse a response into a JSON object.
///
/// Malformed JSON, or JSON that is not an object, yields an empty map.
pub fn parse_llm_response(response: &str) -> Map<String, Value> {
    let cleaned = strip_code_fence(response);
    match serde_json::from_str::<Value>(cleaned) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            debug!(kind = json_kind(&other), "Extraction response was not a JSON object");
            Map::new()
        }
        Err(e) => {
            debug!(error = %e, len = response.len(), "Extraction response was not valid JSON");
            Map::new()
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

//! Tolerant parsing of LLM JSON replies.
//!
//! Models wrap JSON in code fences and prose more often than not; the
//! pipeline strips ``` fences first, then falls back to the outermost
//! brace-delimited object.

use serde_json::Value;

/// Extracts a JSON object from a model reply.
///
/// Returns `None` when no parseable object can be found.
pub(crate) fn extract_json_object(text: &str) -> Option<Value> {
    let stripped = strip_code_fences(text);
    if let Ok(value) = serde_json::from_str::<Value>(stripped.trim()) {
        if value.is_object() {
            return Some(value);
        }
    }

    // Fall back to the outermost braces to tolerate surrounding prose.
    let start = stripped.find('{')?;
    let end = stripped.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&stripped[start..=end])
        .ok()
        .filter(Value::is_object)
}

/// Strips a surrounding ```/```json fence, returning the inner text.
pub(crate) fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag on the fence line.
    let rest = rest
        .split_once('\n')
        .map_or("", |(_, body)| body);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_bare_json() {
        let value = extract_json_object(r#"{"facts": ["a"]}"#).unwrap();
        assert_eq!(value, json!({"facts": ["a"]}));
    }

    #[test]
    fn strips_json_fence() {
        let text = "```json\n{\"facts\": [\"a\", \"b\"]}\n```";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["facts"], json!(["a", "b"]));
    }

    #[test]
    fn strips_plain_fence() {
        let text = "```\n{\"memory\": []}\n```";
        assert!(extract_json_object(text).is_some());
    }

    #[test]
    fn tolerates_surrounding_prose() {
        let text = "Here is the result you asked for:\n{\"facts\": []}\nHope that helps!";
        assert_eq!(extract_json_object(text).unwrap(), json!({"facts": []}));
    }

    #[test]
    fn rejects_non_json() {
        assert!(extract_json_object("no json here").is_none());
        assert!(extract_json_object("{broken").is_none());
    }

    #[test]
    fn rejects_top_level_arrays() {
        assert!(extract_json_object("[1, 2, 3]").is_none());
    }
}

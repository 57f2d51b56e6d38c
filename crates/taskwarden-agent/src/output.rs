use serde_json::Value;
use tracing::debug;

use taskwarden_core::error::{Result, TaskwardenError};

/// Parse a typed reply, repairing the usual model mistakes first: code
/// fences, prose around the object, unbalanced braces. The object must carry
/// every key the schema lists as required.
pub fn parse_typed_reply(text: &str, schema: &Value) -> Result<Value> {
    let value = match serde_json::from_str::<Value>(text.trim()) {
        Ok(v) => v,
        Err(_) => {
            let repaired = heuristic_repair(text);
            debug!(original_len = text.len(), repaired_len = repaired.len(), "Repaired typed reply");
            serde_json::from_str::<Value>(&repaired)
                .map_err(|e| TaskwardenError::MalformedOutput(format!("not valid JSON: {}", e)))?
        }
    };
    check_required(&value, schema)?;
    Ok(value)
}

/// Heuristic repairs, no model call.
pub fn heuristic_repair(output: &str) -> String {
    let stripped = strip_code_fences(output);
    let trimmed = stripped.trim();
    let body = extract_object(trimmed).unwrap_or(trimmed);
    if body.starts_with('{') || body.starts_with('[') {
        balance_braces(body)
    } else {
        body.to_string()
    }
}

fn check_required(value: &Value, schema: &Value) -> Result<()> {
    let Some(required) = schema.get("required").and_then(|r| r.as_array()) else {
        return Ok(());
    };
    let obj = value
        .as_object()
        .ok_or_else(|| TaskwardenError::MalformedOutput("expected a JSON object".into()))?;
    let missing: Vec<&str> = required
        .iter()
        .filter_map(|k| k.as_str())
        .filter(|k| !obj.contains_key(*k))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(TaskwardenError::MalformedOutput(format!(
            "missing required key(s): {}",
            missing.join(", ")
        )))
    }
}

fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed.to_string();
    };
    let after = &trimmed[start + 3..];
    // Language tag runs to the end of the fence line.
    let content_start = after.find('\n').map_or(0, |p| p + 1);
    let after = &after[content_start..];
    match after.find("```") {
        Some(end) => after[..end].trim().to_string(),
        None => after.trim().to_string(),
    }
}

/// The span from the first `{` to the last `}`, when prose surrounds it.
fn extract_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    if start == 0 {
        return None;
    }
    match text.rfind('}') {
        Some(end) if end > start => Some(&text[start..=end]),
        _ => Some(&text[start..]),
    }
}

fn balance_braces(text: &str) -> String {
    let mut closers = Vec::new();
    let mut in_string = false;
    let mut escape_next = false;

    for ch in text.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => closers.push('}'),
            '[' if !in_string => closers.push(']'),
            '}' | ']' if !in_string => {
                closers.pop();
            }
            _ => {}
        }
    }

    let mut result = text.to_string();
    if in_string {
        result.push('"');
    }
    while let Some(c) = closers.pop() {
        result.push(c);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({"type": "object", "required": ["answer", "tasks"]})
    }

    #[test]
    fn test_clean_json_accepted() {
        let v = parse_typed_reply(r#"{"answer": "ok", "tasks": []}"#, &schema()).unwrap();
        assert_eq!(v["answer"], "ok");
    }

    #[test]
    fn test_fenced_json() {
        let text = "```json\n{\"answer\": \"ok\", \"tasks\": []}\n```";
        let v = parse_typed_reply(text, &schema()).unwrap();
        assert_eq!(v["tasks"], json!([]));
    }

    #[test]
    fn test_prose_around_object() {
        let text = "Sure! Here you go: {\"answer\": \"done\", \"tasks\": []} Anything else?";
        let v = parse_typed_reply(text, &schema()).unwrap();
        assert_eq!(v["answer"], "done");
    }

    #[test]
    fn test_truncated_object_balanced() {
        let text = r#"{"answer": "x", "tasks": [{"id": 1"#;
        let repaired = heuristic_repair(text);
        assert!(repaired.ends_with("}]}"));
        assert!(serde_json::from_str::<Value>(&repaired).is_ok());
    }

    #[test]
    fn test_missing_required_key() {
        let err = parse_typed_reply(r#"{"answer": "x"}"#, &schema()).unwrap_err();
        assert!(matches!(err, TaskwardenError::MalformedOutput(ref m) if m.contains("tasks")));
    }

    #[test]
    fn test_plain_text_is_malformed() {
        let err = parse_typed_reply("I could not find anything.", &schema()).unwrap_err();
        assert!(matches!(err, TaskwardenError::MalformedOutput(_)));
    }
}

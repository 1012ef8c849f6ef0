//! Fallback ladder for structured LLM output.
//!
//! LLMs asked for JSON frequently wrap it in prose or code fences. Parsing
//! degrades gracefully: strict parse first, then the first balanced `{...}`
//! substring, and callers fall back to their own defaults when both fail.

/// Extract a JSON object from raw LLM output.
pub fn extract_json_object(raw: &str) -> Option<serde_json::Value> {
    let trimmed = raw.trim();

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if value.is_object() {
            return Some(value);
        }
    }

    first_balanced_object(trimmed)
        .and_then(|candidate| serde_json::from_str::<serde_json::Value>(candidate).ok())
        .filter(|value| value.is_object())
}

/// Find the first `{...}` substring with balanced braces, skipping braces
/// inside JSON string literals.
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_strict_json() {
        let value = extract_json_object(r#"{"is_complete": true}"#).unwrap();
        assert_eq!(value, json!({"is_complete": true}));
    }

    #[test]
    fn extracts_object_from_prose() {
        let raw = "Here is my analysis:\n```json\n{\"todos\": [\"a\"]}\n```\nDone.";
        let value = extract_json_object(raw).unwrap();
        assert_eq!(value, json!({"todos": ["a"]}));
    }

    #[test]
    fn handles_braces_inside_strings() {
        let raw = r#"prefix {"note": "uses { and } inside", "n": 1} suffix"#;
        let value = extract_json_object(raw).unwrap();
        assert_eq!(value["n"], 1);
    }

    #[test]
    fn handles_nested_objects() {
        let raw = r#"result: {"outer": {"inner": 2}} trailing"#;
        let value = extract_json_object(raw).unwrap();
        assert_eq!(value["outer"]["inner"], 2);
    }

    #[test]
    fn returns_none_for_garbage() {
        assert!(extract_json_object("no json here").is_none());
        assert!(extract_json_object("{unbalanced").is_none());
        assert!(extract_json_object("[1, 2, 3]").is_none());
    }
}

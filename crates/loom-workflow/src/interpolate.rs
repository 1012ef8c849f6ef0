//! `${name}` / `${a.b.c}` substitution over variables and step results.
//!
//! Missing names stay literal so a later consumer can still see what was
//! asked for; substitution never fails.

/// Resolve a dotted path (object keys and numeric array indices).
pub fn lookup_path<'a>(scope: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    let mut current = scope;
    for part in path.split('.') {
        current = match part.parse::<usize>() {
            Ok(index) => current.get(index)?,
            Err(_) => current.get(part)?,
        };
    }
    Some(current)
}

/// Substitute every `${...}` occurrence in a string. Idempotent: substituted
/// output contains no further placeholders for names bound in the scope.
pub fn interpolate_string(input: &str, scope: &serde_json::Value) -> String {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match lookup_path(scope, name) {
                    Some(value) => output.push_str(&value_to_text(value)),
                    None => {
                        // Unknown name: keep the placeholder literally.
                        output.push_str(&rest[start..start + 2 + end + 1]);
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                output.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    output.push_str(rest);
    output
}

/// Recurse into arrays and maps. A string that is exactly one placeholder is
/// replaced by the looked-up value itself, preserving its JSON type.
pub fn interpolate_value(input: &serde_json::Value, scope: &serde_json::Value) -> serde_json::Value {
    match input {
        serde_json::Value::String(text) => {
            if let Some(name) = exact_placeholder(text) {
                if let Some(value) = lookup_path(scope, name) {
                    return value.clone();
                }
            }
            serde_json::Value::String(interpolate_string(text, scope))
        }
        serde_json::Value::Array(items) => serde_json::Value::Array(
            items.iter().map(|item| interpolate_value(item, scope)).collect(),
        ),
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), interpolate_value(value, scope)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn exact_placeholder(text: &str) -> Option<&str> {
    let inner = text.strip_prefix("${")?.strip_suffix('}')?;
    (!inner.contains("${")).then_some(inner)
}

fn value_to_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

//! JSON text extraction: best-effort flattening of a document's textual
//! content. Looks for a conventional `content`/`text`/`body` field first,
//! falling back to concatenating every string leaf in document order.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

const CONTENT_KEYS: &[&str] = &["content", "text", "body"];

pub fn extract(path: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read JSON: {}", path.display()))?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse JSON: {}", path.display()))?;
    Ok(extract_from_value(&value))
}

pub fn extract_from_value(value: &Value) -> String {
    if let Value::Object(map) = value {
        for key in CONTENT_KEYS {
            if let Some(Value::String(s)) = map.get(*key) {
                if !s.trim().is_empty() {
                    return s.clone();
                }
            }
        }
    }

    let mut leaves = Vec::new();
    collect_string_leaves(value, &mut leaves);
    leaves.join("\n")
}

fn collect_string_leaves(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            if !s.trim().is_empty() {
                out.push(s.clone());
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_string_leaves(item, out);
            }
        }
        Value::Object(map) => {
            for v in map.values() {
                collect_string_leaves(v, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_conventional_content_field() {
        let value: Value = serde_json::from_str(r#"{"title":"T","content":"The body."}"#).unwrap();
        assert_eq!(extract_from_value(&value), "The body.");
    }

    #[test]
    fn falls_back_to_string_leaves() {
        let value: Value = serde_json::from_str(r#"{"a":"one","b":{"c":"two"}}"#).unwrap();
        assert_eq!(extract_from_value(&value), "one\ntwo");
    }
}

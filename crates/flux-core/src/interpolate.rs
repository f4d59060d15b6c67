use serde_json::Value;

use crate::context::Context;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InterpolationError {
    #[error("no value at path '{0}'")]
    MissingPath(String),
}

/// Walks an arbitrary JSON tree, substituting `${dotted.path}` references
/// found in string leaves against `ctx`.
///
/// A string that is *entirely* a single placeholder resolves to the
/// referenced value with its original JSON type preserved (an integer
/// reference stays an integer). A placeholder embedded in a larger string
/// is substituted in place as text.
pub fn interpolate_value(subject: &Value, ctx: &Context) -> Result<Value, InterpolationError> {
    match subject {
        Value::String(s) => interpolate_text(s, ctx),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(interpolate_value(item, ctx)?);
            }
            Ok(Value::Array(out))
        }
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, value) in map {
                out.insert(key.clone(), interpolate_value(value, ctx)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn interpolate_text(s: &str, ctx: &Context) -> Result<Value, InterpolationError> {
    if let Some(path) = whole_placeholder(s) {
        let value = ctx
            .resolve(path)
            .ok_or_else(|| InterpolationError::MissingPath(path.to_string()))?;
        return Ok(value.clone());
    }

    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            result.push_str(rest);
            rest = "";
            break;
        };
        let end = start + end;
        result.push_str(&rest[..start]);
        let path = &rest[start + 2..end];
        let value = ctx
            .resolve(path)
            .ok_or_else(|| InterpolationError::MissingPath(path.to_string()))?;
        result.push_str(&stringify(value));
        rest = &rest[end + 1..];
    }
    result.push_str(rest);
    Ok(Value::String(result))
}

/// If `s` is exactly one `${path}` placeholder with no surrounding text,
/// returns the enclosed path.
fn whole_placeholder(s: &str) -> Option<&str> {
    let inner = s.strip_prefix("${")?.strip_suffix('}')?;
    if inner.contains("${") || inner.is_empty() {
        return None;
    }
    Some(inner)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Context {
        Context::from_value(json!({
            "run": {"id": 42, "name": "demo"},
            "step": {"out": {"status": "ok"}},
        }))
    }

    #[test]
    fn whole_match_preserves_type() {
        let result = interpolate_value(&json!("${run.id}"), &ctx()).unwrap();
        assert_eq!(result, json!(42));
    }

    #[test]
    fn embedded_match_stringifies() {
        let result = interpolate_value(&json!("run-${run.id}-${run.name}"), &ctx()).unwrap();
        assert_eq!(result, json!("run-42-demo"));
    }

    #[test]
    fn recurses_into_nested_structures() {
        let subject = json!({"params": ["${run.id}", {"nested": "${step.out.status}"}]});
        let result = interpolate_value(&subject, &ctx()).unwrap();
        assert_eq!(
            result,
            json!({"params": [42, {"nested": "ok"}]})
        );
    }

    #[test]
    fn missing_path_errors() {
        let err = interpolate_value(&json!("${run.missing}"), &ctx()).unwrap_err();
        assert_eq!(err, InterpolationError::MissingPath("run.missing".to_string()));
    }

    #[test]
    fn passthrough_for_plain_strings() {
        let result = interpolate_value(&json!("no placeholders here"), &ctx()).unwrap();
        assert_eq!(result, json!("no placeholders here"));
    }
}

//! Request validation against tool input schemas.
//!
//! A separate pass before dispatch: covers the subset of JSON Schema the
//! tool definitions use (object types, required properties, property
//! types, enums, integer bounds, array item types). Failures name the
//! offending field path.

use serde_json::Value;

/// Validates `value` against `schema`. Returns the field path and reason
/// on failure.
pub fn validate_against_schema(schema: &Value, value: &Value) -> Result<(), String> {
    validate_node(schema, value, "")
}

fn validate_node(schema: &Value, value: &Value, path: &str) -> Result<(), String> {
    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        check_type(expected, value, path)?;
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            return Err(format!(
                "{}: value {value} not in enum {}",
                display_path(path),
                Value::Array(allowed.clone())
            ));
        }
    }

    if let Some(minimum) = schema.get("minimum").and_then(Value::as_i64) {
        if let Some(n) = value.as_i64() {
            if n < minimum {
                return Err(format!("{}: {n} below minimum {minimum}", display_path(path)));
            }
        }
    }
    if let Some(maximum) = schema.get("maximum").and_then(Value::as_i64) {
        if let Some(n) = value.as_i64() {
            if n > maximum {
                return Err(format!("{}: {n} above maximum {maximum}", display_path(path)));
            }
        }
    }

    if let Some(object) = value.as_object() {
        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for name in required.iter().filter_map(Value::as_str) {
                if !object.contains_key(name) {
                    return Err(format!(
                        "{}: missing required property '{name}'",
                        display_path(path)
                    ));
                }
            }
        }
        if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
            for (name, property_schema) in properties {
                if let Some(property_value) = object.get(name) {
                    if property_value.is_null() {
                        continue;
                    }
                    let child_path = if path.is_empty() {
                        name.clone()
                    } else {
                        format!("{path}.{name}")
                    };
                    validate_node(property_schema, property_value, &child_path)?;
                }
            }
        }
    }

    if let (Some(items), Some(array)) = (schema.get("items"), value.as_array()) {
        for (i, item) in array.iter().enumerate() {
            validate_node(items, item, &format!("{path}[{i}]"))?;
        }
    }

    Ok(())
}

fn check_type(expected: &str, value: &Value, path: &str) -> Result<(), String> {
    let ok = match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(format!(
            "{}: expected {expected}, got {}",
            display_path(path),
            type_name(value)
        ))
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() { "request" } else { path }
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "document_type": {
                    "type": "string",
                    "enum": ["spec", "guide"]
                },
                "authority_level": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 10
                },
                "tags": {
                    "type": "array",
                    "items": {"type": "string"}
                }
            },
            "required": ["document_type"]
        })
    }

    #[test]
    fn test_valid_request_passes() {
        let value = json!({
            "document_type": "spec",
            "authority_level": 8,
            "tags": ["auth"]
        });
        assert!(validate_against_schema(&schema(), &value).is_ok());
    }

    #[test]
    fn test_missing_required() {
        let err = validate_against_schema(&schema(), &json!({})).unwrap_err();
        assert!(err.contains("document_type"));
    }

    #[test]
    fn test_enum_violation_names_field() {
        let value = json!({"document_type": "novel"});
        let err = validate_against_schema(&schema(), &value).unwrap_err();
        assert!(err.starts_with("document_type"));
        assert!(err.contains("enum"));
    }

    #[test]
    fn test_bounds() {
        let value = json!({"document_type": "spec", "authority_level": 11});
        let err = validate_against_schema(&schema(), &value).unwrap_err();
        assert!(err.contains("above maximum"));
    }

    #[test]
    fn test_array_item_type() {
        let value = json!({"document_type": "spec", "tags": ["ok", 3]});
        let err = validate_against_schema(&schema(), &value).unwrap_err();
        assert!(err.contains("tags[1]"));
    }

    #[test]
    fn test_wrong_top_level_type() {
        let err = validate_against_schema(&schema(), &json!("nope")).unwrap_err();
        assert!(err.contains("expected object"));
    }
}

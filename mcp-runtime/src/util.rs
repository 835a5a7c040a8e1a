use serde_json::{Map, Value, json};

/// Argument or dispatch problem detected before any request is made.
#[derive(Debug, Clone)]
pub struct ToolError {
    pub code: String,
    pub message: String,
    pub field: Option<String>,
}

impl ToolError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            field: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn to_value(&self) -> Value {
        let mut payload = json!({
            "error": self.code,
            "message": self.message
        });
        if let Some(field) = &self.field {
            payload["field"] = Value::String(field.clone());
        }
        payload
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

fn not_a_string(key: &str) -> ToolError {
    ToolError::new("validation_failed", format!("'{key}' must be a string")).with_field(key)
}

pub fn required_string(args: &Map<String, Value>, key: &str) -> Result<String, ToolError> {
    let value = args.get(key).ok_or_else(|| {
        ToolError::new(
            "validation_failed",
            format!("Missing required field '{key}'"),
        )
        .with_field(key)
    })?;
    match value {
        Value::String(v) => Ok(v.clone()),
        _ => Err(not_a_string(key)),
    }
}

pub fn arg_string(args: &Map<String, Value>, key: &str, default: &str) -> Result<String, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(default.to_string()),
        Some(Value::String(v)) => Ok(v.clone()),
        Some(_) => Err(not_a_string(key)),
    }
}

/// `""` counts as absent; whitespace is kept as given.
pub fn arg_optional_string(
    args: &Map<String, Value>,
    key: &str,
) -> Result<Option<String>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(v)) if v.is_empty() => Ok(None),
        Some(Value::String(v)) => Ok(Some(v.clone())),
        Some(_) => Err(not_a_string(key)),
    }
}

pub fn arg_u32(args: &Map<String, Value>, key: &str, default: u32) -> Result<u32, ToolError> {
    let invalid = || {
        ToolError::new(
            "validation_failed",
            format!("'{key}' must be a non-negative integer"),
        )
        .with_field(key)
    };
    match args.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(invalid),
        Some(_) => Err(invalid()),
    }
}

/// Display text for `data[key]`: strings raw, other scalars as JSON text,
/// nested values as compact JSON, missing or null as `default`.
pub fn field_text(data: &Value, key: &str, default: &str) -> String {
    match data.get(key) {
        None | Some(Value::Null) => default.to_string(),
        Some(value) => value_text(value),
    }
}

pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn to_pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn required_string_reports_missing_and_wrong_type() {
        let err = required_string(&args(json!({})), "user_id").unwrap_err();
        assert_eq!(err.field.as_deref(), Some("user_id"));
        assert!(err.message.contains("Missing required field 'user_id'"));

        // Blank values go to the API as given.
        assert_eq!(
            required_string(&args(json!({"query": "  "})), "query").unwrap(),
            "  "
        );
        assert_eq!(required_string(&args(json!({"query": ""})), "query").unwrap(), "");

        let err = required_string(&args(json!({"user_id": 5})), "user_id").unwrap_err();
        assert!(err.message.contains("must be a string"));

        assert_eq!(
            required_string(&args(json!({"user_id": "u1"})), "user_id").unwrap(),
            "u1"
        );
    }

    #[test]
    fn optional_string_treats_only_empty_as_absent() {
        let a = args(json!({"title": "", "description": null, "other": "x", "pad": "   "}));
        assert_eq!(arg_optional_string(&a, "title").unwrap(), None);
        assert_eq!(arg_optional_string(&a, "description").unwrap(), None);
        assert_eq!(arg_optional_string(&a, "missing").unwrap(), None);
        assert_eq!(
            arg_optional_string(&a, "other").unwrap().as_deref(),
            Some("x")
        );
        assert_eq!(
            arg_optional_string(&a, "pad").unwrap().as_deref(),
            Some("   ")
        );
    }

    #[test]
    fn arg_u32_applies_default_and_rejects_negatives() {
        assert_eq!(arg_u32(&args(json!({})), "limit", 10).unwrap(), 10);
        assert_eq!(arg_u32(&args(json!({"limit": 3})), "limit", 10).unwrap(), 3);
        assert!(arg_u32(&args(json!({"limit": -1})), "limit", 10).is_err());
        assert!(arg_u32(&args(json!({"limit": "3"})), "limit", 10).is_err());
    }

    #[test]
    fn field_text_renders_values() {
        let data = json!({"s": "x", "n": 3, "b": true, "z": null, "o": {"a": 1}});
        assert_eq!(field_text(&data, "s", "Unknown"), "x");
        assert_eq!(field_text(&data, "n", "Unknown"), "3");
        assert_eq!(field_text(&data, "b", "Unknown"), "true");
        assert_eq!(field_text(&data, "z", "Unknown"), "Unknown");
        assert_eq!(field_text(&data, "missing", "Unknown"), "Unknown");
        assert_eq!(field_text(&data, "o", "Unknown"), "{\"a\":1}");
    }
}

//! Argument validation and coercion against a tool's declared parameters.
//!
//! Runs before the tool body: required parameters must be present, absent
//! optional ones receive their defaults, values are coerced to the declared
//! type, then range and pattern constraints are checked. The first failure
//! is reported as [`ToolError::InvalidParameter`].

use ferroact_core::error::ToolError;
use ferroact_core::tool::{ParameterDefinition, ParameterType, ToolArgs};
use serde_json::{Number, Value};
use std::collections::BTreeMap;

/// Validate `args` for `tool_name`, returning the coerced arguments.
///
/// Arguments with no matching definition are passed through untouched.
pub fn validate_arguments(
    tool_name: &str,
    definitions: &BTreeMap<String, ParameterDefinition>,
    mut args: ToolArgs,
) -> Result<ToolArgs, ToolError> {
    for (name, def) in definitions {
        let supplied = args.remove(name).filter(|v| !v.is_null());

        let raw = match (supplied, &def.default) {
            (Some(value), _) => value,
            (None, _) if def.required => {
                return Err(invalid(tool_name, name, "required parameter is missing"));
            }
            (None, Some(default)) => default.clone(),
            (None, None) => continue,
        };

        let value = coerce(&raw, def.param_type)
            .map_err(|reason| invalid(tool_name, name, reason))?;
        check_range(&value, def).map_err(|reason| invalid(tool_name, name, reason))?;
        check_pattern(&value, def).map_err(|reason| invalid(tool_name, name, reason))?;

        args.insert(name.clone(), value);
    }
    Ok(args)
}

fn invalid(tool_name: &str, parameter: &str, reason: impl Into<String>) -> ToolError {
    ToolError::InvalidParameter {
        tool_name: tool_name.to_string(),
        parameter: parameter.to_string(),
        reason: reason.into(),
    }
}

// ── Coercion ──────────────────────────────────────────────────────────────

fn coerce(value: &Value, target: ParameterType) -> Result<Value, String> {
    match target {
        ParameterType::String => coerce_string(value),
        ParameterType::Integer => {
            let n = coerce_whole(value, "integer")?;
            i32::try_from(n)
                .map(|n| Value::from(n as i64))
                .map_err(|_| format!("{n} does not fit in a 32-bit integer"))
        }
        ParameterType::Long => coerce_whole(value, "long").map(Value::from),
        ParameterType::Double => {
            let f = coerce_float(value)?;
            Number::from_f64(f)
                .map(Value::Number)
                .ok_or_else(|| format!("{f} is not a finite number"))
        }
        ParameterType::Boolean => coerce_bool(value).map(Value::Bool),
        ParameterType::Array => coerce_structured(value, Value::is_array, "array"),
        ParameterType::Object => coerce_structured(value, Value::is_object, "object"),
    }
}

fn coerce_string(value: &Value) -> Result<Value, String> {
    match value {
        Value::String(_) => Ok(value.clone()),
        Value::Number(n) => Ok(Value::String(n.to_string())),
        Value::Bool(b) => Ok(Value::String(b.to_string())),
        other => Err(format!("expected string, got {}", kind(other))),
    }
}

fn coerce_whole(value: &Value, label: &str) -> Result<i64, String> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(i);
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
                _ => Err(format!("expected {label}, got {n}")),
            }
        }
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                return Ok(i);
            }
            match trimmed.parse::<f64>() {
                Ok(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
                _ => Err(format!("cannot convert '{s}' to {label}")),
            }
        }
        Value::Bool(b) => Ok(i64::from(*b)),
        other => Err(format!("expected {label}, got {}", kind(other))),
    }
}

fn coerce_float(value: &Value) -> Result<f64, String> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| format!("expected double, got {n}")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("cannot convert '{s}' to double")),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        other => Err(format!("expected double, got {}", kind(other))),
    }
}

fn coerce_bool(value: &Value) -> Result<bool, String> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f == 1.0 => Ok(true),
            Some(f) if f == 0.0 => Ok(false),
            _ => Err(format!("cannot convert {n} to boolean")),
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" => Ok(false),
            _ => Err(format!("cannot convert '{s}' to boolean")),
        },
        other => Err(format!("expected boolean, got {}", kind(other))),
    }
}

/// Arrays and objects may also arrive as JSON text.
fn coerce_structured(value: &Value, accepts: fn(&Value) -> bool, label: &str) -> Result<Value, String> {
    if accepts(value) {
        return Ok(value.clone());
    }
    if let Value::String(s) = value
        && let Ok(parsed) = serde_json::from_str::<Value>(s)
        && accepts(&parsed)
    {
        return Ok(parsed);
    }
    Err(format!("expected {label}, got {}", kind(value)))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── Constraints ───────────────────────────────────────────────────────────

fn check_range(value: &Value, def: &ParameterDefinition) -> Result<(), String> {
    if def.min.is_none() && def.max.is_none() {
        return Ok(());
    }

    let (measured, what) = match value {
        Value::Number(n) => (n.as_f64().unwrap_or(f64::NAN), "value"),
        Value::String(s) => (s.chars().count() as f64, "length"),
        Value::Array(items) => (items.len() as f64, "length"),
        _ => return Ok(()),
    };

    if let Some(min) = def.min
        && measured < min
    {
        return Err(format!("{what} {measured} is below the minimum of {min}"));
    }
    if let Some(max) = def.max
        && measured > max
    {
        return Err(format!("{what} {measured} is above the maximum of {max}"));
    }
    Ok(())
}

/// Patterns must match the whole string.
fn check_pattern(value: &Value, def: &ParameterDefinition) -> Result<(), String> {
    let (Some(pattern), Value::String(s)) = (&def.pattern, value) else {
        return Ok(());
    };
    let re = regex_lite::Regex::new(&format!("^(?:{pattern})$"))
        .map_err(|e| format!("invalid pattern '{pattern}': {e}"))?;
    if re.is_match(s) {
        Ok(())
    } else {
        Err(format!("'{s}' does not match pattern '{pattern}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> ToolArgs {
        value.as_object().cloned().unwrap()
    }

    fn single(name: &str, def: ParameterDefinition) -> BTreeMap<String, ParameterDefinition> {
        BTreeMap::from([(name.to_string(), def)])
    }

    #[test]
    fn integer_string_is_coerced() {
        let defs = single("count", ParameterDefinition::new(ParameterType::Integer, "").required());
        let out = validate_arguments("t", &defs, args(json!({"count": "123"}))).unwrap();
        assert_eq!(out["count"], json!(123));
    }

    #[test]
    fn boolean_words_are_coerced() {
        let defs = single("flag", ParameterDefinition::new(ParameterType::Boolean, ""));
        let yes = validate_arguments("t", &defs, args(json!({"flag": "yes"}))).unwrap();
        assert_eq!(yes["flag"], json!(true));
        let zero = validate_arguments("t", &defs, args(json!({"flag": "0"}))).unwrap();
        assert_eq!(zero["flag"], json!(false));
        let upper = validate_arguments("t", &defs, args(json!({"flag": "FALSE"}))).unwrap();
        assert_eq!(upper["flag"], json!(false));
        let one = validate_arguments("t", &defs, args(json!({"flag": 1}))).unwrap();
        assert_eq!(one["flag"], json!(true));
    }

    #[test]
    fn boolean_rejects_other_words() {
        let defs = single("flag", ParameterDefinition::new(ParameterType::Boolean, ""));
        let err = validate_arguments("t", &defs, args(json!({"flag": "maybe"}))).unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameter { ref parameter, .. } if parameter == "flag"));
    }

    #[test]
    fn string_length_bounds() {
        let defs = single(
            "name",
            ParameterDefinition::new(ParameterType::String, "").with_range(Some(3.0), Some(20.0)),
        );
        let err = validate_arguments("t", &defs, args(json!({"name": "ab"}))).unwrap_err();
        match err {
            ToolError::InvalidParameter { parameter, reason, .. } => {
                assert_eq!(parameter, "name");
                assert!(reason.contains("minimum"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(validate_arguments("t", &defs, args(json!({"name": "abc"}))).is_ok());
    }

    #[test]
    fn numeric_bounds() {
        let defs = single(
            "n",
            ParameterDefinition::new(ParameterType::Double, "").with_range(Some(0.0), Some(1.0)),
        );
        assert!(validate_arguments("t", &defs, args(json!({"n": "0.5"}))).is_ok());
        assert!(validate_arguments("t", &defs, args(json!({"n": 1.5}))).is_err());
    }

    #[test]
    fn missing_required_parameter() {
        let defs = single("q", ParameterDefinition::new(ParameterType::String, "").required());
        let err = validate_arguments("search", &defs, ToolArgs::new()).unwrap_err();
        assert!(err.to_string().contains("'q'"));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn defaults_fill_absent_optionals() {
        let defs = single(
            "limit",
            ParameterDefinition::new(ParameterType::Integer, "").with_default(json!("5")),
        );
        let out = validate_arguments("t", &defs, ToolArgs::new()).unwrap();
        assert_eq!(out["limit"], json!(5));
    }

    #[test]
    fn absent_optional_without_default_stays_absent() {
        let defs = single("opt", ParameterDefinition::new(ParameterType::String, ""));
        let out = validate_arguments("t", &defs, ToolArgs::new()).unwrap();
        assert!(!out.contains_key("opt"));
    }

    #[test]
    fn pattern_must_match_whole_value() {
        let defs = single(
            "code",
            ParameterDefinition::new(ParameterType::String, "").with_pattern("[A-Z]{3}"),
        );
        assert!(validate_arguments("t", &defs, args(json!({"code": "USD"}))).is_ok());
        assert!(validate_arguments("t", &defs, args(json!({"code": "USDX"}))).is_err());
    }

    #[test]
    fn numbers_become_strings() {
        let defs = single("s", ParameterDefinition::new(ParameterType::String, ""));
        let out = validate_arguments("t", &defs, args(json!({"s": 42}))).unwrap();
        assert_eq!(out["s"], json!("42"));
    }

    #[test]
    fn integer_overflow_rejected_but_long_accepts() {
        let big = json!({"n": 5_000_000_000_i64});
        let int = single("n", ParameterDefinition::new(ParameterType::Integer, ""));
        assert!(validate_arguments("t", &int, args(big.clone())).is_err());
        let long = single("n", ParameterDefinition::new(ParameterType::Long, ""));
        assert_eq!(
            validate_arguments("t", &long, args(big)).unwrap()["n"],
            json!(5_000_000_000_i64)
        );
    }

    #[test]
    fn array_accepts_json_text() {
        let defs = single("items", ParameterDefinition::new(ParameterType::Array, ""));
        let out = validate_arguments("t", &defs, args(json!({"items": "[1, 2]"}))).unwrap();
        assert_eq!(out["items"], json!([1, 2]));
        assert!(validate_arguments("t", &defs, args(json!({"items": "nope"}))).is_err());
    }

    #[test]
    fn unknown_arguments_pass_through() {
        let defs = single("a", ParameterDefinition::new(ParameterType::String, ""));
        let out = validate_arguments("t", &defs, args(json!({"a": "x", "extra": true}))).unwrap();
        assert_eq!(out["extra"], json!(true));
    }
}

//! Built-in scalar types and their coercion rules.

use crate::types::ScalarDef;
use serde_json::{Number, Value};

/// Failure to convert a value into or out of a type's internal form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct CoercionError {
    pub message: String,
}

impl CoercionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Result of a scalar coercion.
pub type CoercionResult = Result<Value, CoercionError>;

/// The five scalars every schema starts with.
pub fn built_in_scalars() -> Vec<ScalarDef> {
    vec![
        ScalarDef::new("Int")
            .description("Signed 32-bit integer")
            .coerce_input(coerce_int)
            .coerce_result(coerce_int),
        ScalarDef::new("Float")
            .description("Double-precision floating point value")
            .coerce_input(coerce_float)
            .coerce_result(coerce_float),
        ScalarDef::new("String")
            .description("UTF-8 character sequence")
            .coerce_input(input_string)
            .coerce_result(result_string),
        ScalarDef::new("Boolean")
            .description("true or false")
            .coerce_input(coerce_boolean)
            .coerce_result(coerce_boolean),
        ScalarDef::new("ID")
            .description("Unique identifier, serialized as a string")
            .coerce_input(coerce_id)
            .coerce_result(coerce_id),
    ]
}

/// Whole-valued floats are accepted (`2.0` becomes `2`); strings are not.
fn coerce_int(value: &Value) -> CoercionResult {
    let int = match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.is_finite())
                .map(|f| f as i64)
        }),
        _ => None,
    };
    match int {
        Some(i) if i32::try_from(i).is_ok() => Ok(Value::from(i)),
        _ => Err(CoercionError::new(format!(
            "Int cannot represent value: {value}"
        ))),
    }
}

fn coerce_float(value: &Value) -> CoercionResult {
    value
        .as_f64()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| CoercionError::new(format!("Float cannot represent value: {value}")))
}

fn input_string(value: &Value) -> CoercionResult {
    match value {
        Value::String(_) => Ok(value.clone()),
        _ => Err(CoercionError::new(format!(
            "String cannot represent a non string value: {value}"
        ))),
    }
}

fn result_string(value: &Value) -> CoercionResult {
    match value {
        Value::String(_) => Ok(value.clone()),
        Value::Number(n) => Ok(Value::String(n.to_string())),
        Value::Bool(b) => Ok(Value::String(b.to_string())),
        _ => Err(CoercionError::new(format!(
            "String cannot represent value: {value}"
        ))),
    }
}

fn coerce_boolean(value: &Value) -> CoercionResult {
    match value {
        Value::Bool(_) => Ok(value.clone()),
        _ => Err(CoercionError::new(format!(
            "Boolean cannot represent a non boolean value: {value}"
        ))),
    }
}

fn coerce_id(value: &Value) -> CoercionResult {
    match value {
        Value::String(_) => Ok(value.clone()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(Value::String(n.to_string())),
        _ => Err(CoercionError::new(format!("ID cannot represent value: {value}"))),
    }
}

//! JSON <-> JavaScript Value Conversions
//!
//! Invocation input and context arrive as JSON and are converted into engine
//! values before the handler is called; the handler's return value is converted
//! back to JSON for the result record.
//!
//! # Type Mapping
//!
//! | JSON Type | JavaScript Type |
//! |-----------|-----------------|
//! | null | null |
//! | boolean | Boolean |
//! | number | Number |
//! | string | String |
//! | array | Array |
//! | object | Object |
//!
//! Going back to JSON follows `JSON.stringify` where it matters for handlers:
//! `undefined` and functions become `null` at the top level and inside arrays and
//! are omitted from objects, `NaN` and infinities become `null`, and integral
//! numbers stay integers. `BigInt` values and structures nested deeper than
//! [`MAX_DEPTH`] (which includes cycles) cannot be represented.

use boa_engine::{
    js_string,
    object::{builtins::JsArray, JsObject},
    property::PropertyKey,
    value::JsValue,
    Context,
};
use serde_json::{Map, Number, Value as JsonValue};
use thiserror::Error;

/// Deepest nesting converted in either direction.
pub const MAX_DEPTH: usize = 64;

/// Largest integer an f64 holds exactly (2^53).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    #[error("value nested deeper than {0} levels (or cyclic)")]
    TooDeep(usize),

    #[error("BigInt values cannot be represented as JSON")]
    BigInt,

    #[error("number {0} is out of range")]
    NumberOutOfRange(String),

    #[error("{0}")]
    Engine(String),
}

/// Convert serde_json::Value to Boa JsValue.
pub fn json_to_js_value(json: &JsonValue, ctx: &mut Context) -> Result<JsValue, ConversionError> {
    json_to_js_at(json, ctx, 0)
}

fn json_to_js_at(json: &JsonValue, ctx: &mut Context, depth: usize) -> Result<JsValue, ConversionError> {
    if depth > MAX_DEPTH {
        return Err(ConversionError::TooDeep(MAX_DEPTH));
    }

    match json {
        JsonValue::Null => Ok(JsValue::null()),
        JsonValue::Bool(b) => Ok(JsValue::new(*b)),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64().and_then(|i| i32::try_from(i).ok()) {
                return Ok(JsValue::new(i));
            }
            n.as_f64()
                .map(JsValue::new)
                .ok_or_else(|| ConversionError::NumberOutOfRange(n.to_string()))
        }
        JsonValue::String(s) => Ok(JsValue::new(js_string!(s.as_str()))),
        JsonValue::Array(arr) => {
            let js_array = JsArray::new(ctx);
            for (i, v) in arr.iter().enumerate() {
                let js_value = json_to_js_at(v, ctx, depth + 1)?;
                js_array.push(js_value, ctx).map_err(|e| {
                    ConversionError::Engine(format!("failed to push array element {}: {}", i, e))
                })?;
            }
            Ok(js_array.into())
        }
        JsonValue::Object(obj) => {
            let js_obj = JsObject::with_object_proto(ctx.intrinsics());
            for (key, value) in obj {
                let js_value = json_to_js_at(value, ctx, depth + 1)?;
                js_obj
                    .create_data_property_or_throw(js_string!(key.as_str()), js_value, ctx)
                    .map_err(|e| {
                        ConversionError::Engine(format!("failed to set property '{}': {}", key, e))
                    })?;
            }
            Ok(js_obj.into())
        }
    }
}

/// Convert Boa JsValue to serde_json::Value.
pub fn js_value_to_json(value: &JsValue, ctx: &mut Context) -> Result<JsonValue, ConversionError> {
    Ok(js_to_json_at(value, ctx, 0)?.unwrap_or(JsonValue::Null))
}

/// Returns `None` for values `JSON.stringify` drops from objects.
fn js_to_json_at(
    value: &JsValue,
    ctx: &mut Context,
    depth: usize,
) -> Result<Option<JsonValue>, ConversionError> {
    if depth > MAX_DEPTH {
        return Err(ConversionError::TooDeep(MAX_DEPTH));
    }

    if value.is_undefined() || value.is_callable() {
        return Ok(None);
    }

    if value.is_null() || value.is_symbol() {
        return Ok(Some(JsonValue::Null));
    }

    if value.is_bigint() {
        return Err(ConversionError::BigInt);
    }

    if let Some(b) = value.as_boolean() {
        return Ok(Some(JsonValue::Bool(b)));
    }

    if let Some(i) = value.as_i32() {
        return Ok(Some(JsonValue::Number(i.into())));
    }

    if let Some(n) = value.as_number() {
        return Ok(Some(number_to_json(n)));
    }

    if let Some(s) = value.as_string() {
        return Ok(Some(JsonValue::String(s.to_std_string_escaped())));
    }

    if let Some(obj) = value.as_object() {
        if obj.is_array() {
            let array = JsArray::from_object(obj.clone())
                .map_err(|e| ConversionError::Engine(format!("object is not a valid array: {}", e)))?;

            let length: usize = array
                .length(ctx)
                .map_err(|e| ConversionError::Engine(format!("failed to get array length: {}", e)))?
                .try_into()
                .map_err(|_| ConversionError::Engine("array length overflow".into()))?;

            let mut result = Vec::with_capacity(length);
            for i in 0..length {
                let elem = array.get(i, ctx).map_err(|e| {
                    ConversionError::Engine(format!("failed to get array element {}: {}", i, e))
                })?;
                result.push(js_to_json_at(&elem, ctx, depth + 1)?.unwrap_or(JsonValue::Null));
            }
            return Ok(Some(JsonValue::Array(result)));
        }

        let keys = obj
            .own_property_keys(ctx)
            .map_err(|e| ConversionError::Engine(format!("failed to get object keys: {}", e)))?;

        let mut result = Map::new();
        for key in keys {
            let key_str = match &key {
                PropertyKey::String(s) => s.to_std_string_escaped(),
                PropertyKey::Index(i) => i.get().to_string(),
                PropertyKey::Symbol(_) => continue,
            };

            let prop_value = obj.get(key.clone(), ctx).map_err(|e| {
                ConversionError::Engine(format!("failed to get property '{}': {}", key_str, e))
            })?;
            if let Some(json) = js_to_json_at(&prop_value, ctx, depth + 1)? {
                result.insert(key_str, json);
            }
        }
        return Ok(Some(JsonValue::Object(result)));
    }

    Ok(Some(JsonValue::Null))
}

fn number_to_json(n: f64) -> JsonValue {
    if !n.is_finite() {
        return JsonValue::Null;
    }
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return JsonValue::Number((n as i64).into());
    }
    Number::from_f64(n).map(JsonValue::Number).unwrap_or(JsonValue::Null)
}

//! Conversion between loosely typed JSON records and store items.

use base64::Engine;
use dynorm_model::{AttributeValue, Item};
use serde_json::{Map, Number, Value};

/// Convert a JSON value into an attribute value.
///
/// Numbers keep their decimal text; `null` becomes the `NULL` marker.
#[must_use]
pub fn to_attribute_value(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(to_attribute_value).collect()),
        Value::Object(map) => AttributeValue::M(
            map.iter()
                .map(|(k, v)| (k.clone(), to_attribute_value(v)))
                .collect(),
        ),
    }
}

/// Convert a JSON object into a store item.
#[must_use]
pub fn to_item(record: &Map<String, Value>) -> Item {
    record
        .iter()
        .map(|(k, v)| (k.clone(), to_attribute_value(v)))
        .collect()
}

/// Convert an attribute value back into JSON.
///
/// Binary values come back as base64 strings and sets as arrays.
#[must_use]
pub fn from_attribute_value(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => number_value(n),
        AttributeValue::B(b) => Value::String(encode_binary(b)),
        AttributeValue::Ss(v) => Value::Array(v.iter().cloned().map(Value::String).collect()),
        AttributeValue::Ns(v) => Value::Array(v.iter().map(|n| number_value(n)).collect()),
        AttributeValue::Bs(v) => {
            Value::Array(v.iter().map(|b| Value::String(encode_binary(b))).collect())
        }
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::L(items) => Value::Array(items.iter().map(from_attribute_value).collect()),
        AttributeValue::M(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), from_attribute_value(v)))
                .collect(),
        ),
    }
}

/// Convert a store item into a JSON object.
///
/// Attribute order is not meaningful in an item; keys come back sorted so
/// records compare and print deterministically.
#[must_use]
pub fn from_item(item: &Item) -> Map<String, Value> {
    let mut keys: Vec<&String> = item.keys().collect();
    keys.sort();
    keys.into_iter()
        .map(|k| (k.clone(), from_attribute_value(&item[k])))
        .collect()
}

fn encode_binary(b: &bytes::Bytes) -> String {
    base64::engine::general_purpose::STANDARD.encode(b)
}

/// Integers stay integers; anything else goes through `f64`.
fn number_value(n: &str) -> Value {
    if let Ok(i) = n.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(u) = n.parse::<u64>() {
        return Value::Number(u.into());
    }
    n.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map_or_else(|| Value::String(n.to_owned()), Value::Number)
}

//! Conversion between objects and DynamoDB items.

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;
use serde_json::{Map, Number, Value};

use crate::core::KEY_ATTRIBUTE;
use crate::types::{Indexable, SearchableObject};

/// A DynamoDB item.
pub(super) type Item = HashMap<String, AttributeValue>;

/// Converts a JSON value into the closest attribute value.
pub(super) fn to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(to_attribute).collect()),
        Value::Object(map) => AttributeValue::M(
            map.iter()
                .map(|(k, v)| (k.clone(), to_attribute(v)))
                .collect(),
        ),
    }
}

/// Converts an attribute value back into JSON.
///
/// Sets become arrays; binary values are dropped.
pub(super) fn from_attribute(attr: &AttributeValue) -> Value {
    match attr {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => parse_number(n),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::L(items) => Value::Array(items.iter().map(from_attribute).collect()),
        AttributeValue::M(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), from_attribute(v)))
                .collect(),
        ),
        AttributeValue::Ss(items) => Value::Array(items.iter().cloned().map(Value::String).collect()),
        AttributeValue::Ns(items) => Value::Array(items.iter().map(|n| parse_number(n)).collect()),
        _ => Value::Null,
    }
}

fn parse_number(n: &str) -> Value {
    if let Ok(i) = n.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(u) = n.parse::<u64>() {
        return Value::from(u);
    }
    n.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(n.to_string()))
}

/// Builds the item stored for an object under `storage_key`.
pub(super) fn to_item(storage_key: &str, object: &SearchableObject) -> Item {
    let mut item: Item = match object.to_document(0) {
        Value::Object(doc) => doc.iter().map(|(k, v)| (k.clone(), to_attribute(v))).collect(),
        _ => Item::new(),
    };
    item.insert(KEY_ATTRIBUTE.to_string(), AttributeValue::S(storage_key.to_string()));
    item
}

/// Reads an object from an item; `None` if it lacks an id.
pub(super) fn from_item(item: &Item) -> Option<SearchableObject> {
    let source: Map<String, Value> = item
        .iter()
        .filter(|(k, _)| k.as_str() != KEY_ATTRIBUTE)
        .map(|(k, v)| (k.clone(), from_attribute(v)))
        .collect();
    SearchableObject::from_source(&Value::Object(source)).ok()
}

/// Builds the primary key of an item.
pub(super) fn key(storage_key: &str) -> Item {
    HashMap::from([(
        KEY_ATTRIBUTE.to_string(),
        AttributeValue::S(storage_key.to_string()),
    )])
}

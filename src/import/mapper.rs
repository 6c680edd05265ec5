//! Flattening of upstream product payloads into the `products` column layout.
//!
//! Mapping never fails. Nested groups that are missing fall back to defaults,
//! while the identity fields (`id`, `title`, `slug`) are copied as-is so the
//! validator can report them when they are absent or malformed.

use crate::api::RawRecord;
use crate::models::ProductStatus;
use serde_json::{Map, Value};

/// Mapped product in column space, not yet validated.
pub type MappedRecord = Map<String, Value>;

const FLAGS: [&str; 5] = [
    "is_new",
    "is_hot_sale",
    "is_featured",
    "is_bulk_sale",
    "accept_offers",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct DataMapper;

impl DataMapper {
    pub fn new() -> Self {
        Self
    }

    pub fn map_to_database_format(&self, raw: &RawRecord) -> MappedRecord {
        let mut out = Map::new();

        for key in ["id", "title", "slug"] {
            if let Some(value) = raw.get(key) {
                out.insert(key.to_string(), value.clone());
            }
        }
        out.insert("content".into(), field(raw, "content"));

        let price = nested(raw, "price", "current");
        out.insert(
            "price".into(),
            Value::from(price.and_then(to_f64).unwrap_or(0.0)),
        );
        out.insert(
            "old_price".into(),
            nested(raw, "price", "old")
                .and_then(to_f64)
                .map(Value::from)
                .unwrap_or(Value::Null),
        );
        out.insert(
            "discount_percentage".into(),
            nested(raw, "price", "discount")
                .and_then(to_i64)
                .map(Value::from)
                .unwrap_or(Value::Null),
        );

        out.insert(
            "quantity".into(),
            Value::from(nested(raw, "stock", "quantity").and_then(to_i64).unwrap_or(0)),
        );
        out.insert(
            "in_stock".into(),
            Value::Bool(nested(raw, "stock", "in_stock").is_some_and(truthy)),
        );

        out.insert("image_cover".into(), nested_string(raw, "image", "cover"));
        out.insert("image_thumbnail".into(), nested_string(raw, "image", "thumbnail"));

        out.insert("container_type".into(), container_types(raw));
        out.insert("container_size".into(), nested_string(raw, "container", "size"));
        out.insert("production_year".into(), field(raw, "production_year"));
        out.insert("condition".into(), field(raw, "condition"));

        out.insert("location_city".into(), nested_string(raw, "location", "city"));
        out.insert("location_district".into(), nested_string(raw, "location", "district"));
        out.insert("location_country".into(), nested_string(raw, "location", "country"));

        out.insert("type".into(), field(raw, "type"));
        for flag in FLAGS {
            let value = match raw.get(flag) {
                None | Some(Value::Null) => Value::Bool(false),
                Some(other) => other.clone(),
            };
            out.insert(flag.to_string(), value);
        }
        out.insert("status".into(), Value::from(status(raw).as_str()));

        out.insert("colors".into(), field(raw, "colors"));
        out.insert("all_prices".into(), field(raw, "all_prices"));
        out.insert("technical_specs".into(), field(raw, "technical_specs"));
        out.insert("user_info".into(), field(raw, "user"));

        out
    }
}

fn field(raw: &RawRecord, key: &str) -> Value {
    raw.get(key).cloned().unwrap_or(Value::Null)
}

fn nested<'a>(raw: &'a RawRecord, group: &str, key: &str) -> Option<&'a Value> {
    raw.get(group)?
        .as_object()?
        .get(key)
        .filter(|value| !value.is_null())
}

fn nested_string(raw: &RawRecord, group: &str, key: &str) -> Value {
    nested(raw, group, key).cloned().unwrap_or(Value::Null)
}

fn container_types(raw: &RawRecord) -> Value {
    let Some(types) = nested(raw, "container", "types").and_then(Value::as_array) else {
        return Value::Null;
    };

    let joined: Vec<String> = types
        .iter()
        .filter_map(|item| match item {
            Value::String(text) => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        })
        .collect();

    if joined.is_empty() {
        Value::Null
    } else {
        Value::from(joined.join(","))
    }
}

fn status(raw: &RawRecord) -> ProductStatus {
    raw.get("status")
        .and_then(Value::as_str)
        .and_then(|value| value.parse().ok())
        .unwrap_or_default()
}

fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|f| f.trunc() as i64)),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<i64>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().map(|f| f.trunc() as i64))
        }
        Value::Bool(flag) => Some(i64::from(*flag)),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !(text.is_empty() || text == "0"),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

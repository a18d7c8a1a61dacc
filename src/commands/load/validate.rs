use std::fmt;

use rusqlite::types::Value as SqlValue;
use serde_json::{Map, Value};

use crate::model::ProductRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    NotAnObject,
    MissingId,
    InvalidId(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnObject => f.write_str("item is not a JSON object"),
            Self::MissingId => f.write_str("missing 'id'"),
            Self::InvalidId(raw) => write!(f, "invalid 'id' {raw}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub index: usize,
    pub reason: RejectReason,
}

#[derive(Debug, Default)]
pub struct ValidatedBatch {
    pub records: Vec<ProductRecord>,
    pub rejections: Vec<Rejection>,
}

pub fn validate_items(items: &[Value], source_file: &str) -> ValidatedBatch {
    let mut batch = ValidatedBatch::default();
    for (index, item) in items.iter().enumerate() {
        match validate_record(item, index, source_file) {
            Ok(record) => batch.records.push(record),
            Err(rejection) => batch.rejections.push(rejection),
        }
    }
    batch
}

pub fn validate_record(
    raw: &Value,
    index: usize,
    source_file: &str,
) -> Result<ProductRecord, Rejection> {
    let reject = |reason| Rejection { index, reason };

    let Value::Object(fields) = raw else {
        return Err(reject(RejectReason::NotAnObject));
    };

    let id = match fields.get("id") {
        None | Some(Value::Null) => return Err(reject(RejectReason::MissingId)),
        Some(value) => {
            coerce_id(value).ok_or_else(|| reject(RejectReason::InvalidId(value.to_string())))?
        }
    };

    let images = fields
        .get("images")
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new()));
    let images_json = images.to_string();

    Ok(ProductRecord {
        id,
        name: loose_field(fields, "name"),
        url_key: loose_field(fields, "url_key"),
        price: loose_field(fields, "price"),
        description: loose_field(fields, "description"),
        images,
        images_json,
        source_file: source_file.to_string(),
    })
}

/// Integer conversion for the primary key: integers as-is, floats truncated,
/// booleans as 0/1, and decimal strings (surrounding whitespace and single
/// underscores between digits allowed). Everything else fails.
pub fn coerce_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            let float = number.as_f64()?;
            let truncated = float.trunc();
            // i64::MAX is not representable as f64; the exclusive bound is 2^63.
            (float.is_finite() && truncated >= i64::MIN as f64 && truncated < i64::MAX as f64)
                .then_some(truncated as i64)
        }),
        Value::Bool(flag) => Some(i64::from(*flag)),
        Value::String(text) => parse_integer_text(text),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn parse_integer_text(text: &str) -> Option<i64> {
    let trimmed = text.trim();
    let (sign, digits) = match trimmed.as_bytes().first().copied()? {
        b'-' => ("-", &trimmed[1..]),
        b'+' => ("", &trimmed[1..]),
        _ => ("", trimmed),
    };

    if digits.is_empty()
        || digits.starts_with('_')
        || digits.ends_with('_')
        || digits.contains("__")
        || !digits.chars().all(|ch| ch.is_ascii_digit() || ch == '_')
    {
        return None;
    }

    format!("{sign}{}", digits.replace('_', "")).parse().ok()
}

fn loose_field(fields: &Map<String, Value>, key: &str) -> Option<SqlValue> {
    match fields.get(key)? {
        Value::Null => None,
        Value::Bool(flag) => Some(SqlValue::Integer(i64::from(*flag))),
        Value::Number(number) => Some(match number.as_i64() {
            Some(integer) => SqlValue::Integer(integer),
            None => SqlValue::Real(number.as_f64().unwrap_or(f64::NAN)),
        }),
        Value::String(text) => Some(SqlValue::Text(text.clone())),
        other => Some(SqlValue::Text(other.to_string())),
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Measurement points.
//!
//! Pollers hand the writer JSON-shaped points:
//!
//! ```text
//! {"measurement": "Tautulli", "tags": {"server": 1}, "fields": {"hash": "abc"}, "time": "2026-01-09T15:03:18Z"}
//! ```
//!
//! Tags are always carried as strings (numbers and booleans are
//! stringified on the way in); fields keep their JSON type.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A typed field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Boolean value.
    Boolean(bool),
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit floating point.
    Float(f64),
    /// UTF-8 string.
    String(String),
}

impl FieldValue {
    /// Convert a JSON value, preserving its type. Null, arrays and objects
    /// have no field representation.
    pub fn from_json(val: &serde_json::Value) -> Option<FieldValue> {
        match val {
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(FieldValue::Integer(i))
                } else {
                    n.as_f64().map(FieldValue::Float)
                }
            }
            serde_json::Value::String(s) => Some(FieldValue::String(s.clone())),
            serde_json::Value::Bool(b) => Some(FieldValue::Boolean(*b)),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Boolean(v) => write!(f, "{}", v),
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::String(v) => f.write_str(v),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Boolean(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Integer(v.into())
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let val = serde_json::Value::deserialize(deserializer)?;
        FieldValue::from_json(&val)
            .ok_or_else(|| de::Error::custom(format!("unsupported field value: {}", val)))
    }
}

/// Point timestamp as produced by pollers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointTime {
    /// Nanoseconds since the Unix epoch.
    Nanos(i64),
    /// ISO-8601 date-time text.
    Iso(String),
}

impl From<i64> for PointTime {
    fn from(v: i64) -> Self {
        PointTime::Nanos(v)
    }
}

impl From<&str> for PointTime {
    fn from(v: &str) -> Self {
        PointTime::Iso(v.to_string())
    }
}

impl From<String> for PointTime {
    fn from(v: String) -> Self {
        PointTime::Iso(v)
    }
}

/// One measurement point.
///
/// `None` tag and field values stand for JSON nulls; the normalizer strips
/// null fields and the encoders skip null tags.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    #[serde(default)]
    pub measurement: String,
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub tags: BTreeMap<String, Option<String>>,
    #[serde(default)]
    pub fields: BTreeMap<String, Option<FieldValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<PointTime>,
}

impl Point {
    /// Start a point for `measurement`.
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            ..Self::default()
        }
    }

    /// Add a tag.
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), Some(value.into()));
        self
    }

    /// Add a field.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), Some(value.into()));
        self
    }

    /// Add a null field (dropped by normalization).
    pub fn null_field(mut self, key: impl Into<String>) -> Self {
        self.fields.insert(key.into(), None);
        self
    }

    /// Set the timestamp.
    pub fn time(mut self, time: impl Into<PointTime>) -> Self {
        self.time = Some(time.into());
        self
    }

    /// Iterate over non-null tags.
    pub fn present_tags(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tags
            .iter()
            .filter_map(|(k, v)| v.as_deref().map(|v| (k.as_str(), v)))
    }

    /// Iterate over non-null fields.
    pub fn present_fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields
            .iter()
            .filter_map(|(k, v)| v.as_ref().map(|v| (k.as_str(), v)))
    }
}

/// Tag values: strings kept, numbers and booleans stringified, null kept as
/// `None`. Arrays and objects are rejected.
fn deserialize_tags<'de, D>(deserializer: D) -> Result<BTreeMap<String, Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(k, v)| {
            let value = match v {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some(s),
                serde_json::Value::Number(n) => Some(n.to_string()),
                serde_json::Value::Bool(b) => Some(b.to_string()),
                other => {
                    return Err(de::Error::custom(format!(
                        "tag `{}` has non-scalar value {}",
                        k, other
                    )))
                }
            };
            Ok((k, value))
        })
        .collect()
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! InfluxDB Line Protocol encoder.
//!
//! Line Protocol format:
//! ```text
//! measurement,tag1=val1,tag2=val2 field1=val1,field2=val2 timestamp_ns
//! ```
//!
//! Shared by every backend that ingests line protocol (InfluxDB 1.x/2.x/3.x,
//! QuestDB, VictoriaMetrics).
//!
//! See: <https://docs.influxdata.com/influxdb/v2/reference/syntax/line-protocol/>

use crate::point::{FieldValue, Point, PointTime};
use chrono::{DateTime, NaiveDateTime, Utc};

impl FieldValue {
    /// Format this value for InfluxDB Line Protocol.
    ///
    /// - Float: written as-is (e.g., `3.14`)
    /// - Integer: suffixed with `i` (e.g., `42i`)
    /// - String: quoted with double quotes, backslashes then quotes escaped
    /// - Boolean: `true` or `false`
    pub fn to_line_protocol(&self) -> String {
        match self {
            FieldValue::Float(v) => format!("{}", v),
            FieldValue::Integer(v) => format!("{}i", v),
            FieldValue::String(v) => format!("\"{}\"", escape_string_value(v)),
            FieldValue::Boolean(v) => {
                if *v {
                    "true".to_string()
                } else {
                    "false".to_string()
                }
            }
        }
    }
}

/// Encode one point as a Line Protocol line.
///
/// Returns `None` when the measurement is empty or no encodable field is
/// left. Tags are sorted by key and empty/null tags are omitted. A
/// timestamp that cannot be parsed is left off the line, so the backend
/// assigns ingest time.
pub fn encode(point: &Point) -> Option<String> {
    if point.measurement.is_empty() {
        return None;
    }

    let mut line = escape_measurement(&point.measurement);

    // BTreeMap iteration is already key-ascending.
    for (key, value) in point.present_tags() {
        if value.is_empty() {
            continue;
        }
        line.push(',');
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&escape_key(value));
    }

    line.push(' ');
    let mut written = 0usize;
    for (key, value) in point.present_fields() {
        // NaN and infinities have no Line Protocol spelling.
        if matches!(value, FieldValue::Float(f) if !f.is_finite()) {
            continue;
        }
        if written > 0 {
            line.push(',');
        }
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&value.to_line_protocol());
        written += 1;
    }
    if written == 0 {
        return None;
    }

    if let Some(ts) = point.time.as_ref().and_then(timestamp_nanos) {
        line.push(' ');
        line.push_str(&ts.to_string());
    }

    Some(line)
}

/// Encode a batch, skipping points with nothing to write.
pub fn encode_batch(points: &[Point]) -> Vec<String> {
    points.iter().filter_map(encode).collect()
}

/// Nanoseconds since the epoch for a point time.
pub fn timestamp_nanos(time: &PointTime) -> Option<i64> {
    match time {
        PointTime::Nanos(ns) => Some(*ns),
        PointTime::Iso(s) => parse_iso8601(s)?.timestamp_nanos_opt(),
    }
}

/// Parse an ISO-8601 date-time.
///
/// RFC 3339 text (`Z` or a numeric offset) is taken as-is; naive text, with
/// `T` or a space between date and time, is read as UTC.
pub fn parse_iso8601(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Escape measurement name for Line Protocol.
/// Spaces and commas must be escaped with backslash.
fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

/// Escape a tag key, tag value or field key.
/// Commas, equals signs, and spaces must be escaped.
fn escape_key(s: &str) -> String {
    s.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

/// Escape a string field value. Backslashes first, or the escapes added
/// for quotes would themselves be doubled.
fn escape_string_value(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Point normalization.
//!
//! Backends with a typed schema (InfluxDB, TimescaleDB) reject a field whose
//! type changes between writes. Pollers are not consistent about a handful
//! of well-known fields, so those are pinned to integers here, once, before
//! any backend sees the batch.

use crate::point::{FieldValue, Point};

/// Fields written as truncated percentages.
const PERCENT_FIELDS: &[&str] = &["progress_percent"];

/// Fields that must always be integers.
const INTEGER_FIELDS: &[&str] = &["season", "episode", "media_index", "parent_media_index"];

/// Normalize a batch of points.
///
/// - null fields are removed
/// - `progress_percent` is read as a float and truncated to an integer
/// - `season`, `episode`, `media_index`, `parent_media_index` are coerced
///   to integers
/// - a field that fails coercion is removed, not the point
/// - points left without fields, or without a measurement, are dropped
///
/// Tags, measurement and time are copied verbatim. The operation is
/// idempotent.
pub fn normalize(points: &[Point]) -> Vec<Point> {
    points.iter().filter_map(normalize_point).collect()
}

fn normalize_point(point: &Point) -> Option<Point> {
    if point.measurement.is_empty() {
        return None;
    }

    let fields: std::collections::BTreeMap<_, _> = point
        .present_fields()
        .filter_map(|(key, value)| {
            let value = if PERCENT_FIELDS.contains(&key) {
                percent_to_int(value)?
            } else if INTEGER_FIELDS.contains(&key) {
                coerce_int(value)?
            } else {
                value.clone()
            };
            Some((key.to_string(), Some(value)))
        })
        .collect();

    if fields.is_empty() {
        return None;
    }

    Some(Point {
        measurement: point.measurement.clone(),
        tags: point.tags.clone(),
        fields,
        time: point.time.clone(),
    })
}

/// Float parse, then truncate toward zero.
fn percent_to_int(value: &FieldValue) -> Option<FieldValue> {
    let f = match value {
        FieldValue::Integer(i) => return Some(FieldValue::Integer(*i)),
        FieldValue::Float(f) => *f,
        FieldValue::Boolean(b) => f64::from(u8::from(*b)),
        FieldValue::String(s) => s.trim().parse::<f64>().ok()?,
    };
    truncate(f).map(FieldValue::Integer)
}

/// Integer coercion. Strings must be integer literals; floats truncate.
fn coerce_int(value: &FieldValue) -> Option<FieldValue> {
    let i = match value {
        FieldValue::Integer(i) => *i,
        FieldValue::Float(f) => truncate(*f)?,
        FieldValue::Boolean(b) => i64::from(*b),
        FieldValue::String(s) => s.trim().parse::<i64>().ok()?,
    };
    Some(FieldValue::Integer(i))
}

fn truncate(f: f64) -> Option<i64> {
    let t = f.trunc();
    // i64::MAX is not exactly representable; the bound is 2^63.
    if t.is_finite() && t >= -9_223_372_036_854_775_808.0 && t < 9_223_372_036_854_775_808.0 {
        Some(t as i64)
    } else {
        None
    }
}

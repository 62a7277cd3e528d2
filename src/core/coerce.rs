// Canonical numeric coercion for cells whose encoding varies by writer

use crate::core::format::{RawRow, RawValue};
use tracing::warn;

/// Value used for numeric control fields that are missing or uncoercible.
pub const NUMERIC_FALLBACK: u64 = 0;

pub fn to_f64(value: &RawValue) -> Option<f64> {
    match value {
        RawValue::Int(v) => Some(*v as f64),
        RawValue::Float(v) => Some(*v),
        RawValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
        RawValue::Str(s) => s.trim().parse::<f64>().ok(),
        // Single-element lists are how some writers store scalars
        RawValue::List(items) if items.len() == 1 => to_f64(&items[0]),
        _ => None,
    }
}

pub fn to_u64(value: &RawValue) -> Option<u64> {
    match value {
        RawValue::Int(v) => u64::try_from(*v).ok(),
        RawValue::Float(v) if v.is_finite() && *v >= 0.0 => Some(v.round() as u64),
        RawValue::Str(s) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(|v| to_u64(&RawValue::Float(v))))
        }
        RawValue::List(items) if items.len() == 1 => to_u64(&items[0]),
        _ => None,
    }
}

pub fn to_text(value: &RawValue) -> Option<String> {
    match value {
        RawValue::Str(s) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Reads a numeric control field, degrading to `NUMERIC_FALLBACK`.
pub fn field_u64(row: &RawRow, name: &str) -> u64 {
    match row.get(name).and_then(to_u64) {
        Some(v) => v,
        None => {
            warn!(
                "field {} missing or uncoercible ({:?}), using {}",
                name,
                row.get(name),
                NUMERIC_FALLBACK
            );
            NUMERIC_FALLBACK
        }
    }
}

/// Like `field_u64` for timestamp-valued fields.
pub fn field_f64(row: &RawRow, name: &str) -> f64 {
    match row.get(name).and_then(to_f64) {
        Some(v) => v,
        None => {
            warn!("field {} missing or uncoercible, using 0.0", name);
            0.0
        }
    }
}

pub fn field_strings(row: &RawRow, name: &str) -> Vec<String> {
    match row.get(name) {
        Some(RawValue::List(items)) => items.iter().filter_map(to_text).collect(),
        Some(other) => to_text(other).into_iter().collect(),
        None => Vec::new(),
    }
}

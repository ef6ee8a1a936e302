//! Inbound feed message normalization.
//!
//! A message becomes a Tick only if it yields a parsable price from a small
//! ranked set of known fields. Event time falls back to receipt time; size
//! defaults to 0. Anything else is discarded silently; malformed input is
//! not a fatal condition.

use crate::model::{current_timestamp_ms, Tick};
use serde_json::Value;

const PRICE_FIELDS: [&str; 3] = ["p", "price", "c"];
const SIZE_FIELDS: [&str; 4] = ["q", "l", "qty", "size"];

pub fn normalize(msg: &Value) -> Option<Tick> {
    let price = PRICE_FIELDS.iter().find_map(|k| field_f64(msg.get(*k)))?;
    if !price.is_finite() {
        return None;
    }

    // Event time `E`, then trade time `T`, then receipt time. Non-positive
    // event times are treated as absent.
    let ts_ms = field_i64(msg.get("E"))
        .filter(|&t| t > 0)
        .or_else(|| field_i64(msg.get("T")).filter(|&t| t > 0))
        .unwrap_or_else(current_timestamp_ms);

    let symbol = msg
        .get("s")
        .and_then(Value::as_str)
        .or_else(|| msg.get("symbol").and_then(Value::as_str))
        .unwrap_or("UNKNOWN")
        .to_uppercase();

    let size = SIZE_FIELDS
        .iter()
        .find_map(|k| field_f64(msg.get(*k)))
        .filter(|v| v.is_finite())
        .unwrap_or(0.0);

    Some(Tick::new(symbol, ts_ms, price, size))
}

fn field_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn field_i64(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

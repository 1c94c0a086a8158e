//! Open key/value rows as delivered by the analysis endpoints.

use serde_json::{json, Map, Value};

/// One row of chart-ready data. Field names vary per chart.
pub type Record = Map<String, Value>;

/// Build a record from literal pairs.
pub fn record(pairs: &[(&str, Value)]) -> Record {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

/// Numeric view of a field. Numbers pass through, numeric strings are
/// parsed, anything else (including a missing field) is NaN.
pub fn numeric(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        Some(Value::Bool(b)) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        _ => f64::NAN,
    }
}

/// Key under which a value groups. Strings group by content, every other
/// value by its JSON text, so `1` and `"1"` share a key.
pub fn group_key(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "null".to_string(),
    }
}

/// JSON form of a computed number: integral values become integers,
/// non-finite values become null.
pub fn number(n: f64) -> Value {
    if !n.is_finite() {
        return Value::Null;
    }
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        return json!(n as i64);
    }
    json!(n)
}

/// Records out of a JSON array; non-object elements are skipped.
pub fn records_from_value(value: &Value) -> Vec<Record> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_object().cloned())
            .collect(),
        _ => Vec::new(),
    }
}

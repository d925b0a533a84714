#![forbid(unsafe_code)]

use serde_json::Value;

pub(super) fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

pub(super) fn as_int(value: &Value) -> Result<Option<i64>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(Some(i));
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Ok(Some(f as i64)),
                _ => Err(format!("`{n}` is not an integer")),
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| format!("`{s}` is not an integer")),
        other => Err(format!("expected an integer, got {other}")),
    }
}

pub(super) fn as_year(value: &Value) -> Result<Option<i32>, String> {
    as_int(value)?
        .map(|year| i32::try_from(year).map_err(|_| format!("year {year} is out of range")))
        .transpose()
}

pub(super) fn as_bounded(value: &Value, min: u8, max: u8) -> Result<Option<u8>, String> {
    let Some(raw) = as_int(value)? else {
        return Ok(None);
    };
    match u8::try_from(raw) {
        Ok(v) if (min..=max).contains(&v) => Ok(Some(v)),
        _ => Err(format!("{raw} is outside {min}..={max}")),
    }
}

pub(super) fn as_text(value: &Value) -> Result<Option<String>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(format!("expected a string, got {other}")),
    }
}

pub(super) fn as_pair(value: &Value) -> Option<(f64, f64)> {
    let Value::Array(items) = value else {
        return None;
    };
    match items.as_slice() {
        [lon, lat] => Some((as_float(lon)?, as_float(lat)?)),
        _ => None,
    }
}

/// Accepts a single reference or a list of them.
pub(super) fn as_list(value: &Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

/// Missing, `null` or `[]`. Non-list values are reported separately.
pub(super) fn is_blank_list(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}

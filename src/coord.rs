use serde_json::Value;

/// Reduces a possibly nested coordinate to a single float.
///
/// Each level of nesting is unwrapped by taking its first element. An empty
/// list at any level, or a terminal value that is not a number, yields `NaN`.
pub fn flatten_coord(coord: &Value) -> f64 {
    let mut current = coord;
    while let Value::Array(items) = current {
        match items.first() {
            Some(first) => current = first,
            None => return f64::NAN,
        }
    }

    let converted = match current {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        Value::Null | Value::Object(_) | Value::Array(_) => None,
    };
    converted.unwrap_or_else(|| {
        log::warn!(
            "Could not convert coordinate {current} to a float (input was {coord}), using NaN."
        );
        f64::NAN
    })
}

/// Smallest value, comparing each candidate against the running minimum.
///
/// A `NaN` in first position sticks, later ones are skipped.
pub(crate) fn fold_min(values: &[f64]) -> f64 {
    values
        .iter()
        .copied()
        .reduce(|acc, v| if v < acc { v } else { acc })
        .unwrap_or(f64::NAN)
}

pub(crate) fn fold_max(values: &[f64]) -> f64 {
    values
        .iter()
        .copied()
        .reduce(|acc, v| if v > acc { v } else { acc })
        .unwrap_or(f64::NAN)
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

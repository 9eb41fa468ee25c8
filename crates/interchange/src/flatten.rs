//! Result value → plain JSON.
//!
//! | Tag | JSON |
//! |---|---|
//! | `Dist` | `{"samples": [..]}` with exactly `sample_count` numbers |
//! | `Record` | object, keys in record order |
//! | `Array` | array |
//! | `String` / `Number` / `Boolean` | the primitive |
//! | anything else | `{"error": "Could not parse type <tag>"}` |
//!
//! Containers nested more than [`MAX_DEPTH`] levels deep are replaced by an
//! error marker as well.
//!
//! Unrecognized tags are encoded in place rather than failing the export,
//! so one unsupported leaf does not lose the rest of the result.

use serde_json::{json, Map, Number, Value as Json};
use sqexport_eval::{Sampler, Value};

/// Largest magnitude at which every integer is exactly representable.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Containers nested deeper than this flatten to an error marker.
pub const MAX_DEPTH: usize = 256;

pub fn flatten<S: Sampler + ?Sized>(value: &Value, sample_count: usize, sampler: &mut S) -> Json {
    flatten_at(value, 0, sample_count, sampler)
}

fn flatten_at<S: Sampler + ?Sized>(
    value: &Value,
    depth: usize,
    sample_count: usize,
    sampler: &mut S,
) -> Json {
    match value {
        Value::Record(_) | Value::Array(_) if depth >= MAX_DEPTH => json!({
            "error": format!("Could not flatten value nested deeper than {} levels", MAX_DEPTH)
        }),
        Value::Dist(dist) => {
            let samples = sampler
                .sample_n(dist, sample_count)
                .into_iter()
                .map(number_to_json)
                .collect();
            json!({ "samples": Json::Array(samples) })
        }
        Value::Record(entries) => Json::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), flatten_at(v, depth + 1, sample_count, sampler)))
                .collect::<Map<_, _>>(),
        ),
        Value::Array(items) => Json::Array(
            items
                .iter()
                .map(|v| flatten_at(v, depth + 1, sample_count, sampler))
                .collect(),
        ),
        Value::String(s) => Json::String(s.clone()),
        Value::Number(n) => number_to_json(*n),
        Value::Bool(b) => Json::Bool(*b),
        other => json!({ "error": format!("Could not parse type {}", other.tag()) }),
    }
}

/// Integral values within the exactly-representable range serialize as
/// integers (`6`, not `6.0`); non-finite values have no JSON form and
/// become `null`.
pub fn number_to_json(n: f64) -> Json {
    if !n.is_finite() {
        return Json::Null;
    }
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return Json::from(n as i64);
    }
    Number::from_f64(n).map(Json::Number).unwrap_or(Json::Null)
}

pub fn to_json_string(value: &Json, pretty: bool) -> serde_json::Result<String> {
    if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
}

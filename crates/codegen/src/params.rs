//! Parameter object → source text.
//!
//! Each top-level key that looks like an identifier becomes one line,
//! `$key = <value>`. Keys that do not are dropped: silently by default, or
//! as an error with [`EncodeOptions::strict`]. An object with no usable keys
//! produces [`NO_VALID_IMPORTS`] so the generated unit always parses.
//!
//! Value encoding:
//!
//! | JSON | Source |
//! |---|---|
//! | number | decimal form, integral values without a fraction (`5`, `0.25`, `1e-7`) |
//! | string | double-quoted; only `"` is escaped |
//! | array | `[a,b,c]` (comma-joined, no spaces) |
//! | object | `{"k":v,"k2":v2,}` (trailing comma after every pair); empty → `{}` |
//! | bool | `true` / `false` |
//! | null | `{}` (rejected in strict mode) |

use std::fmt::Write as _;

use serde_json::{Map, Number, Value};
use tracing::debug;

/// Statement emitted when no parameter survives key validation.
pub const NO_VALID_IMPORTS: &str = "$__no_valid_imports__ = 1";

/// Marks a binding as an injected parameter.
const SIGIL: char = '$';

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Fail on invalid keys and `null` values instead of dropping/coercing.
    pub strict: bool,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodegenError {
    #[error("invalid parameter name '{0}': expected a letter followed by letters or digits")]
    InvalidKey(String),
    #[error("parameter '{path}' is null, which has no source representation")]
    Null { path: String },
}

/// `[a-zA-Z][a-zA-Z0-9]*`, anchored at both ends.
pub fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => chars.all(|c| c.is_ascii_alphanumeric()),
        _ => false,
    }
}

/// Lenient encoding. Never fails; see the module docs for what is dropped.
pub fn encode_params(params: &Map<String, Value>) -> String {
    let mut out = String::new();
    for (key, value) in params {
        if !is_valid_key(key) {
            debug!(key = key.as_str(), "dropping parameter with invalid name");
            continue;
        }
        let _ = writeln!(out, "{}{} = {}", SIGIL, key, encode_value(value));
    }
    if out.is_empty() {
        out.push_str(NO_VALID_IMPORTS);
    }
    out
}

/// Encoding with explicit options. In strict mode the first invalid key or
/// `null` value is an error; otherwise identical to [`encode_params`].
pub fn encode_params_with(
    params: &Map<String, Value>,
    options: EncodeOptions,
) -> Result<String, CodegenError> {
    if options.strict {
        for (key, value) in params {
            if !is_valid_key(key) {
                return Err(CodegenError::InvalidKey(key.clone()));
            }
            reject_null(value, key)?;
        }
    }
    Ok(encode_params(params))
}

/// Source form of a single parameter value.
pub fn encode_value(value: &Value) -> String {
    match value {
        Value::Number(n) => format_number(n),
        Value::String(s) => quote(s),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(encode_value).collect();
            format!("[{}]", inner.join(","))
        }
        Value::Object(entries) if !entries.is_empty() => {
            let mut out = String::from("{");
            for (k, v) in entries {
                out.push_str(&quote(k));
                out.push(':');
                out.push_str(&encode_value(v));
                out.push(',');
            }
            out.push('}');
            out
        }
        Value::Object(_) | Value::Null => "{}".to_owned(),
    }
}

fn reject_null(value: &Value, path: &str) -> Result<(), CodegenError> {
    match value {
        Value::Null => Err(CodegenError::Null {
            path: path.to_owned(),
        }),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .try_for_each(|(i, v)| reject_null(v, &format!("{}[{}]", path, i))),
        Value::Object(entries) => entries
            .iter()
            .try_for_each(|(k, v)| reject_null(v, &format!("{}.{}", path, k))),
        _ => Ok(()),
    }
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\\\""))
}

/// Decimal form of a JSON number: integral values print without a fraction,
/// very large or very small magnitudes use exponent notation (`1e+21`,
/// `1e-7`).
fn format_number(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    let f = n.as_f64().unwrap_or(0.0);
    if f == 0.0 {
        return "0".to_owned();
    }
    let magnitude = f.abs();
    if magnitude >= 1e21 || magnitude < 1e-6 {
        let exp = format!("{:e}", f);
        return match exp.split_once('e') {
            Some((mantissa, power)) if !power.starts_with('-') => {
                format!("{}e+{}", mantissa, power)
            }
            _ => exp,
        };
    }
    // Shortest round-trip form; integral values print without a fraction.
    f.to_string()
}

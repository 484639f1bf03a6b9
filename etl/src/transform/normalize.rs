//! Field normalization
//!
//! Pure, total coercions from raw JSON scalars to typed nullable values.
//! Nothing here fails: anything unrecognized degrades to `None`, because
//! partial business data is expected in the input.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::models::Flag;

/// Leading numeric literal, optionally signed, with an optional `$`,
/// thousands separators and exponent. Whatever follows (a unit, a percent
/// sign) is ignored. A comma not followed by exactly three digits ends the
/// literal, so `"12,5"` reads as 12.
static NUMERIC_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^([+-]?)\$?\s*((?:(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?|\.\d+)(?:[eE][+-]?\d+)?)",
    )
    .expect("numeric prefix pattern compiles")
});

const NULL_TOKENS: [&str; 4] = ["null", "none", "n/a", "nan"];
const YES_TOKENS: [&str; 4] = ["yes", "y", "true", "1"];
const NO_TOKENS: [&str; 4] = ["no", "n", "false", "0"];

/// True for strings that stand for "no value": blank or a null token.
pub fn is_null_token(s: &str) -> bool {
    let trimmed = s.trim();
    trimmed.is_empty() || NULL_TOKENS.iter().any(|t| trimmed.eq_ignore_ascii_case(t))
}

/// True when a raw value carries nothing worth coercing.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => is_null_token(s),
        _ => false,
    }
}

/// Coerce to a number: `"5649 sqft"` → `5649.0`, `"$1,200"` → `1200.0`.
pub fn normalize_numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_numeric_prefix(s),
        _ => None,
    }
}

/// Coerce to an integer. Fractional numbers degrade to `None`.
pub fn normalize_integer(value: &Value) -> Option<i64> {
    if let Value::Number(n) = value {
        if let Some(i) = n.as_i64() {
            return Some(i);
        }
    }
    normalize_numeric(value)
        .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
        .map(|f| f as i64)
}

/// Coerce to YES/NO. Case-insensitive; anything else is `None`.
pub fn normalize_flag(value: &Value) -> Option<Flag> {
    match value {
        Value::Bool(true) => Some(Flag::Yes),
        Value::Bool(false) => Some(Flag::No),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(Flag::Yes),
            Some(0) => Some(Flag::No),
            _ => None,
        },
        Value::String(s) => {
            let token = s.trim();
            if YES_TOKENS.iter().any(|t| token.eq_ignore_ascii_case(t)) {
                Some(Flag::Yes)
            } else if NO_TOKENS.iter().any(|t| token.eq_ignore_ascii_case(t)) {
                Some(Flag::No)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Coerce to trimmed text. Numbers are stringified; blanks and null tokens
/// become `None`.
pub fn normalize_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if is_null_token(s) => None,
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_numeric_prefix(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if is_null_token(trimmed) {
        return None;
    }

    let caps = NUMERIC_PREFIX.captures(trimmed)?;
    let sign = caps.get(1).map_or("", |m| m.as_str());
    let digits = caps.get(2)?.as_str().replace(',', "");

    format!("{}{}", sign, digits)
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
}

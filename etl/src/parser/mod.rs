//! Input reading and batch parsing.
//!
//! Reads the raw bytes with encoding auto-detection, runs the repair pass
//! and parses the result into a list of record values. No property-specific
//! logic here.

pub mod repair;

use serde_json::Value;
use std::path::Path;

use crate::error::{InputError, InputResult, ParseError};

pub use repair::{repair, Fix, Repaired};

/// Lines of context shown on each side of a parse failure.
const CONTEXT_LINES: usize = 2;

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> InputResult<String> {
    match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|e| InputError::Encoding {
                encoding: encoding.to_string(),
                message: e.to_string(),
            }),
        "iso-8859-1" | "latin-1" | "latin1" => {
            Ok(encoding_rs::ISO_8859_15.decode(bytes).0.into_owned())
        }
        "windows-1252" | "cp1252" => Ok(encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned()),
        // Unknown charset: fall back to lossy UTF-8
        _ => Ok(String::from_utf8_lossy(bytes).into_owned()),
    }
}

/// Decode raw input bytes, dropping a UTF-8 byte order mark.
pub fn decode_input(bytes: &[u8]) -> InputResult<String> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let encoding = detect_encoding(bytes);
    decode_content(bytes, &encoding)
}

/// Read and decode an input file.
pub fn read_input<P: AsRef<Path>>(path: P) -> InputResult<String> {
    let bytes = std::fs::read(path.as_ref())?;
    decode_input(&bytes)
}

/// Parse already repaired text into a list of raw records.
///
/// A top-level array yields its elements in order; a single top-level object
/// is treated as a batch of one. Any other shape is a parse error.
pub fn parse_batch(text: &str) -> Result<Vec<Value>, ParseError> {
    let value: Value = serde_json::from_str(text).map_err(|e| {
        let (line, column) = (e.line(), e.column());
        ParseError {
            line,
            column,
            message: e.to_string(),
            context: error_context(text, line),
        }
    })?;

    match value {
        Value::Array(records) => Ok(records),
        Value::Object(_) => Ok(vec![value]),
        other => Err(ParseError {
            line: 1,
            column: 1,
            message: format!(
                "expected an array of records or a single record, found {}",
                kind_of(&other)
            ),
            context: error_context(text, 1),
        }),
    }
}

/// Repair then parse: the full text-to-records step.
pub fn repair_and_parse(text: &str) -> Result<(Vec<Value>, Vec<Fix>), ParseError> {
    let Repaired { text, fixes } = repair(text);
    let records = parse_batch(&text)?;
    Ok((records, fixes))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A few lines around `line` (1-based), the failing one marked with `>>>`.
fn error_context(text: &str, line: usize) -> String {
    let first = line.saturating_sub(CONTEXT_LINES).max(1);
    let last = line + CONTEXT_LINES;

    text.lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l))
        .filter(|(n, _)| *n >= first && *n <= last)
        .map(|(n, l)| {
            let marker = if n == line { ">>> " } else { "    " };
            format!("{}{:>4} | {}", marker, n, l)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

//! Best-effort syntactic repair of malformed JSON text.
//!
//! This is a text-to-text pass with no business semantics. It walks the input
//! once, tracking string literals and object/array nesting, and fixes:
//!
//! - bare words in value position: spelled-out numbers become digits
//!   (`Four` → `4`), numbers with a unit are quoted (`5649 sqft` →
//!   `"5649 sqft"`), capitalized literals are lowered (`True` → `true`), and
//!   any other word is quoted
//! - unquoted identifiers used as keys are quoted
//! - bare tokens where a key is expected are removed
//! - trailing and doubled separators (`,}` `,]` `,,`) are removed
//!
//! Text inside string literals is never touched. If the result still does not
//! parse, [`crate::parser::parse_batch`] reports where.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;

static JSON_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-?(?:0|[1-9]\d*)(?:\.\d+)?(?:[eE][+-]?\d+)?$").expect("number pattern compiles")
});

static NUMBER_WITH_UNIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-?\d+(?:\.\d+)?\s*[A-Za-z%][A-Za-z%.]*$").expect("unit pattern compiles")
});

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern compiles"));

/// One repair applied to the input.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fix {
    NumberWord { word: String, digits: String },
    QuotedNumberWithUnit { value: String },
    LoweredLiteral { word: String },
    QuotedBareword { word: String },
    QuotedKey { key: String },
    RemovedBareToken { token: String },
    RemovedTrailingSeparator { before: char },
    RemovedStraySeparator,
}

impl fmt::Display for Fix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fix::NumberWord { word, digits } => {
                write!(f, "Converted number word to digits: {} → {}", word, digits)
            }
            Fix::QuotedNumberWithUnit { value } => write!(f, "Quoted number with unit: {}", value),
            Fix::LoweredLiteral { word } => write!(f, "Lowercased literal: {}", word),
            Fix::QuotedBareword { word } => write!(f, "Quoted bareword: {}", word),
            Fix::QuotedKey { key } => write!(f, "Quoted unquoted key: {}", key),
            Fix::RemovedBareToken { token } => write!(f, "Removed bare token in object: {}", token),
            Fix::RemovedTrailingSeparator { before } => {
                write!(f, "Removed trailing separator before {}", before)
            }
            Fix::RemovedStraySeparator => write!(f, "Removed stray separator"),
        }
    }
}

/// Repaired text plus the list of fixes that produced it.
#[derive(Debug, Clone)]
pub struct Repaired {
    pub text: String,
    pub fixes: Vec<Fix>,
}

impl Repaired {
    pub fn is_clean(&self) -> bool {
        self.fixes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Container {
    Object,
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Expect {
    Key,
    Colon,
    Value,
    Separator,
}

#[derive(Debug)]
struct Frame {
    container: Container,
    expect: Expect,
}

/// Repair `input` so that it has a chance to parse as JSON.
pub fn repair(input: &str) -> Repaired {
    Scanner::new(input).run()
}

struct Scanner {
    chars: Vec<char>,
    pos: usize,
    out: String,
    stack: Vec<Frame>,
    fixes: Vec<Fix>,
    /// Byte offset in `out` of a separator not yet followed by a member.
    pending_separator: Option<usize>,
    /// The last significant token was removed by a repair.
    just_removed: bool,
}

impl Scanner {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            out: String::with_capacity(input.len()),
            stack: Vec::new(),
            fixes: Vec::new(),
            pending_separator: None,
            just_removed: false,
        }
    }

    fn run(mut self) -> Repaired {
        while let Some(&c) = self.chars.get(self.pos) {
            match c {
                c if c.is_whitespace() => {
                    self.out.push(c);
                    self.pos += 1;
                }
                '"' => {
                    self.copy_string();
                    self.member_seen();
                    let is_key = self.stack.last().is_some_and(|f| f.expect == Expect::Key);
                    if is_key {
                        self.expect(Expect::Colon);
                    } else {
                        self.after_value();
                    }
                }
                '{' | '[' => {
                    self.out.push(c);
                    self.pos += 1;
                    self.member_seen();
                    self.stack.push(if c == '{' {
                        Frame { container: Container::Object, expect: Expect::Key }
                    } else {
                        Frame { container: Container::Array, expect: Expect::Value }
                    });
                }
                '}' | ']' => {
                    if let Some(at) = self.pending_separator.take() {
                        self.out.remove(at);
                        self.fixes.push(Fix::RemovedTrailingSeparator { before: c });
                    }
                    self.out.push(c);
                    self.pos += 1;
                    self.stack.pop();
                    self.just_removed = false;
                    self.after_value();
                }
                ':' => {
                    self.out.push(c);
                    self.pos += 1;
                    if let Some(frame) = self.stack.last_mut() {
                        if frame.expect == Expect::Colon {
                            frame.expect = Expect::Value;
                        }
                    }
                }
                ',' => self.separator(),
                _ => self.bare_token(),
            }
        }

        Repaired {
            text: self.out,
            fixes: self.fixes,
        }
    }

    fn member_seen(&mut self) {
        self.pending_separator = None;
        self.just_removed = false;
    }

    fn expect(&mut self, next: Expect) {
        if let Some(frame) = self.stack.last_mut() {
            frame.expect = next;
        }
    }

    fn after_value(&mut self) {
        self.expect(Expect::Separator);
    }

    fn separator(&mut self) {
        self.pos += 1;
        let Some(frame) = self.stack.last_mut() else {
            self.out.push(',');
            return;
        };

        if frame.expect == Expect::Separator {
            frame.expect = match frame.container {
                Container::Object => Expect::Key,
                Container::Array => Expect::Value,
            };
            self.pending_separator = Some(self.out.len());
            self.out.push(',');
        } else if matches!(frame.expect, Expect::Key | Expect::Value) {
            // Leading, doubled, or left behind by a removed token.
            if !self.just_removed {
                self.fixes.push(Fix::RemovedStraySeparator);
            }
        } else {
            self.out.push(',');
        }
    }

    fn copy_string(&mut self) {
        self.out.push('"');
        self.pos += 1;
        let mut escaped = false;
        while let Some(&c) = self.chars.get(self.pos) {
            self.out.push(c);
            self.pos += 1;
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                break;
            }
        }
    }

    fn bare_token(&mut self) {
        let expect = self.stack.last().map(|f| f.expect);
        match expect {
            Some(Expect::Key) => self.key_token(),
            None | Some(Expect::Value) => self.value_token(),
            // Out of place token: leave it for the parser to report.
            Some(_) => {
                self.out.push(self.chars[self.pos]);
                self.pos += 1;
            }
        }
    }

    fn key_token(&mut self) {
        let start = self.pos;
        while let Some(&c) = self.chars.get(self.pos) {
            if c.is_whitespace() || matches!(c, ':' | ',' | '{' | '}' | '[' | ']' | '"') {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            // A lone structural character we do not understand.
            self.out.push(self.chars[self.pos]);
            self.pos += 1;
            return;
        }
        let token: String = self.chars[start..self.pos].iter().collect();

        let mut look = self.pos;
        while self.chars.get(look).is_some_and(|c| c.is_whitespace()) {
            look += 1;
        }
        let followed_by_colon = self.chars.get(look) == Some(&':');

        if followed_by_colon && IDENTIFIER.is_match(&token) {
            self.out.push('"');
            self.out.push_str(&token);
            self.out.push('"');
            self.fixes.push(Fix::QuotedKey { key: token });
            self.member_seen();
            self.expect(Expect::Colon);
        } else {
            self.fixes.push(Fix::RemovedBareToken { token });
            self.just_removed = true;
        }
    }

    fn value_token(&mut self) {
        let start = self.pos;
        while let Some(&c) = self.chars.get(self.pos) {
            if matches!(c, ',' | '}' | ']' | '\n' | '\r' | '"' | '{' | '[' | ':') {
                break;
            }
            self.pos += 1;
        }
        let raw: String = self.chars[start..self.pos].iter().collect();
        let token = raw.trim_end();
        let trailing_ws = &raw[token.len()..];

        if token.is_empty() {
            // Only reachable on a lone structural character.
            self.out.push(self.chars[self.pos]);
            self.pos += 1;
            return;
        }

        let replacement = self.classify_value(token);
        self.out.push_str(&replacement);
        self.out.push_str(trailing_ws);
        self.member_seen();
        self.after_value();
    }

    fn classify_value(&mut self, token: &str) -> String {
        if matches!(token, "true" | "false" | "null") || JSON_NUMBER.is_match(token) {
            return token.to_string();
        }

        let lower = token.to_ascii_lowercase();
        if matches!(lower.as_str(), "true" | "false" | "null") {
            self.fixes.push(Fix::LoweredLiteral { word: token.to_string() });
            return lower;
        }

        if NUMBER_WITH_UNIT.is_match(token) {
            self.fixes.push(Fix::QuotedNumberWithUnit { value: token.to_string() });
            return quote(token);
        }

        if let Some(n) = number_word_value(token) {
            let digits = n.to_string();
            self.fixes.push(Fix::NumberWord {
                word: token.to_string(),
                digits: digits.clone(),
            });
            return digits;
        }

        self.fixes.push(Fix::QuotedBareword { word: token.to_string() });
        quote(token)
    }
}

fn quote(token: &str) -> String {
    serde_json::to_string(token).unwrap_or_else(|_| format!("\"{}\"", token))
}

fn small_number(word: &str) -> Option<u64> {
    let n = match word {
        "zero" => 0,
        "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        "eleven" => 11,
        "twelve" => 12,
        "thirteen" => 13,
        "fourteen" => 14,
        "fifteen" => 15,
        "sixteen" => 16,
        "seventeen" => 17,
        "eighteen" => 18,
        "nineteen" => 19,
        "twenty" => 20,
        "thirty" => 30,
        "forty" => 40,
        "fifty" => 50,
        "sixty" => 60,
        "seventy" => 70,
        "eighty" => 80,
        "ninety" => 90,
        _ => return None,
    };
    Some(n)
}

/// Value of an English number phrase (`"Four"`, `"twenty-one"`,
/// `"Two Hundred"`), or `None` if any word is not a number word.
pub fn number_word_value(phrase: &str) -> Option<u64> {
    let lower = phrase.to_ascii_lowercase();
    // A hyphen only joins two words; a leading one is a sign.
    if lower.starts_with('-') || lower.ends_with('-') {
        return None;
    }
    let words: Vec<&str> = lower
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|w| !w.is_empty() && *w != "and")
        .collect();
    if words.is_empty() {
        return None;
    }

    let mut total: u64 = 0;
    let mut current: u64 = 0;
    for word in words {
        match word {
            "hundred" => current = current.max(1).checked_mul(100)?,
            "thousand" => {
                total = total.checked_add(current.max(1).checked_mul(1_000)?)?;
                current = 0;
            }
            "million" => {
                total = total.checked_add(current.max(1).checked_mul(1_000_000)?)?;
                current = 0;
            }
            w => current = current.checked_add(small_number(w)?)?,
        }
    }
    total.checked_add(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn parses(text: &str) -> Value {
        serde_json::from_str(text).unwrap_or_else(|e| panic!("{e}: {text}"))
    }

    #[test]
    fn test_clean_input_untouched() {
        let input = r#"[{"a": 1, "b": "x, y}", "c": [1, 2, 3], "d": null}]"#;
        let repaired = repair(input);
        assert!(repaired.is_clean());
        assert_eq!(repaired.text, input);
    }

    #[test]
    fn test_number_word_rewritten() {
        let repaired = repair(r#"{"Bed": Four, "Bath": Two}"#);
        let v = parses(&repaired.text);
        assert_eq!(v["Bed"], 4);
        assert_eq!(v["Bath"], 2);
        assert!(repaired
            .fixes
            .contains(&Fix::NumberWord { word: "Four".into(), digits: "4".into() }));
    }

    #[test]
    fn test_signed_number_word_is_quoted_not_converted() {
        let repaired = repair(r#"{"a": -Four}"#);
        let v = parses(&repaired.text);
        assert_eq!(v["a"], "-Four");
        assert!(repaired
            .fixes
            .contains(&Fix::QuotedBareword { word: "-Four".into() }));
        assert!(!repaired
            .fixes
            .iter()
            .any(|f| matches!(f, Fix::NumberWord { .. })));
    }

    #[test]
    fn test_unknown_bareword_quoted() {
        let repaired = repair(r#"{"Layout": Ranch, "Pool": Yes}"#);
        let v = parses(&repaired.text);
        assert_eq!(v["Layout"], "Ranch");
        assert_eq!(v["Pool"], "Yes");
    }

    #[test]
    fn test_number_with_unit_quoted() {
        let repaired = repair("{\"SQFT_Total\": 5649 sqft,\n \"Bed\": 3}");
        let v = parses(&repaired.text);
        assert_eq!(v["SQFT_Total"], "5649 sqft");
        assert_eq!(v["Bed"], 3);
    }

    #[test]
    fn test_trailing_separators_removed() {
        let repaired = repair("[{\"a\": 1, \"b\": [1, 2,],\n},\n]");
        let v = parses(&repaired.text);
        assert_eq!(v[0]["b"], serde_json::json!([1, 2]));
        let trailing = repaired
            .fixes
            .iter()
            .filter(|f| matches!(f, Fix::RemovedTrailingSeparator { .. }))
            .count();
        assert_eq!(trailing, 3);
    }

    #[test]
    fn test_bare_token_in_object_removed() {
        let repaired = repair(r#"{"a": 1, 99, "b": 2}"#);
        let v = parses(&repaired.text);
        assert_eq!(v, serde_json::json!({"a": 1, "b": 2}));
        assert!(repaired
            .fixes
            .contains(&Fix::RemovedBareToken { token: "99".into() }));
    }

    #[test]
    fn test_bare_token_before_close_removed() {
        let repaired = repair(r#"{"a": 1, 99}"#);
        assert_eq!(parses(&repaired.text), serde_json::json!({"a": 1}));
    }

    #[test]
    fn test_numbers_in_arrays_are_kept() {
        let repaired = repair(r#"{"scores": [1, 2, 3]}"#);
        assert!(repaired.is_clean());
        assert_eq!(parses(&repaired.text)["scores"], serde_json::json!([1, 2, 3]));
    }

    #[test]
    fn test_unquoted_key_quoted() {
        let repaired = repair(r#"{City: "Austin", "Zip": "78701"}"#);
        let v = parses(&repaired.text);
        assert_eq!(v["City"], "Austin");
        assert!(repaired.fixes.contains(&Fix::QuotedKey { key: "City".into() }));
    }

    #[test]
    fn test_strings_are_never_rewritten() {
        let input = r#"{"note": "Bed: Four, trailing,}", "x": 1}"#;
        let repaired = repair(input);
        assert!(repaired.is_clean());
        assert_eq!(parses(&repaired.text)["note"], "Bed: Four, trailing,}");
    }

    #[test]
    fn test_escaped_quotes_in_strings() {
        let input = r#"{"q": "say \"Four\", ok", "n": Four}"#;
        let repaired = repair(input);
        let v = parses(&repaired.text);
        assert_eq!(v["q"], "say \"Four\", ok");
        assert_eq!(v["n"], 4);
    }

    #[test]
    fn test_capitalized_literals_lowered() {
        let repaired = repair(r#"{"a": True, "b": NULL}"#);
        let v = parses(&repaired.text);
        assert_eq!(v["a"], true);
        assert!(v["b"].is_null());
    }

    #[test]
    fn test_doubled_separator_removed() {
        let repaired = repair("[1,, 2]");
        assert_eq!(parses(&repaired.text), serde_json::json!([1, 2]));
        assert!(repaired.fixes.contains(&Fix::RemovedStraySeparator));
    }

    #[test]
    fn test_unrepairable_input_still_invalid() {
        let repaired = repair(r#"{"a" 1}"#);
        assert!(serde_json::from_str::<Value>(&repaired.text).is_err());
    }

    #[test]
    fn test_number_word_value() {
        assert_eq!(number_word_value("Four"), Some(4));
        assert_eq!(number_word_value("twenty-one"), Some(21));
        assert_eq!(number_word_value("Two Hundred and Five"), Some(205));
        assert_eq!(number_word_value("three thousand"), Some(3000));
        assert_eq!(number_word_value("Hundred"), Some(100));
        assert_eq!(number_word_value("-Four"), None);
        assert_eq!(number_word_value("Four-"), None);
        assert_eq!(number_word_value("Ranch"), None);
        assert_eq!(number_word_value("four bedrooms"), None);
        assert_eq!(number_word_value(""), None);
    }
}

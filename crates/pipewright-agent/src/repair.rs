//! Text repair for agent answers.
//!
//! Agent output sometimes arrives as UTF-16 or with a byte order mark, and
//! punctuation that went through the wrong code page shows up as mojibake
//! (`â€”` for an em dash). The helpers here normalise both and pull the
//! first JSON object out of free text.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";
const UTF16_LE_BOM: &[u8] = b"\xff\xfe";
const UTF16_BE_BOM: &[u8] = b"\xfe\xff";

/// Dash mojibake, longest sequence first.
static DASH_RE: OnceLock<Regex> = OnceLock::new();
static ELLIPSIS_RE: OnceLock<Regex> = OnceLock::new();
static FENCED_RE: OnceLock<Regex> = OnceLock::new();

fn dash_re() -> &'static Regex {
    DASH_RE.get_or_init(|| {
        Regex::new(r#"ÔÇô|ÔÇö|â€“|â€”|ا"اخaُ|ا"اخa|ا"اخ"#).expect("dash pattern compiles")
    })
}

fn ellipsis_re() -> &'static Regex {
    ELLIPSIS_RE.get_or_init(|| Regex::new(r"ÔÇª|â€¦").expect("ellipsis pattern compiles"))
}

fn fenced_re() -> &'static Regex {
    FENCED_RE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json|JSON)?[ \t]*\r?\n?(\{.*?\})\s*```").expect("fence pattern compiles")
    })
}

/// Decode raw bytes, honouring a UTF-16 or UTF-8 byte order mark.
///
/// Input without a BOM is read as UTF-8. Invalid sequences become
/// U+FFFD rather than failing.
pub fn decode_bytes(raw: &[u8]) -> String {
    if let Some(rest) = raw.strip_prefix(UTF16_LE_BOM) {
        return decode_utf16(rest, u16::from_le_bytes);
    }
    if let Some(rest) = raw.strip_prefix(UTF16_BE_BOM) {
        return decode_utf16(rest, u16::from_be_bytes);
    }
    let raw = raw.strip_prefix(UTF8_BOM).unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

fn decode_utf16(raw: &[u8], unit: fn([u8; 2]) -> u16) -> String {
    let units = raw.chunks_exact(2).map(|pair| unit([pair[0], pair[1]]));
    char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Replace known dash and ellipsis mojibake with ASCII.
pub fn repair_text(text: &str) -> String {
    let text = dash_re().replace_all(text, "-");
    ellipsis_re().replace_all(&text, "...").into_owned()
}

/// Decode and repair in one step.
pub fn repair_bytes(raw: &[u8]) -> String {
    repair_text(&decode_bytes(raw))
}

/// The first JSON object in `text`.
///
/// A fenced code block is preferred; otherwise every `{` is tried as the
/// start of an object and the first one that parses wins.
pub fn extract_json_object(text: &str) -> Option<Value> {
    for captures in fenced_re().captures_iter(text) {
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(&captures[1]) {
            return Some(value);
        }
    }

    for (start, _) in text.match_indices('{') {
        let mut values = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        if let Some(Ok(value @ Value::Object(_))) = values.next() {
            return Some(value);
        }
    }
    None
}

//! Helpers for turning source JSON into bounded, readable descriptions.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

/// Maximum number of characters of free text embedded in a description.
pub const MAX_PREVIEW_CHARS: usize = 200;

/// Collapse whitespace and cut `text` to [`MAX_PREVIEW_CHARS`] characters.
pub fn preview(text: &str) -> String {
    truncate(&collapse_whitespace(text), MAX_PREVIEW_CHARS)
}

/// Cut `text` to at most `max_chars` characters, marking the cut with an ellipsis.
pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}…", text[..byte_idx].trim_end()),
        None => text.to_string(),
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip HTML tags and decode the handful of entities Stack Exchange emits.
pub fn html_to_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    decode_entities(&out)
}

pub fn decode_entities(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// String at a JSON pointer, if present and non-empty.
pub fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Timestamp at a JSON pointer.
///
/// Accepts RFC 3339 strings (GitHub) and Unix seconds (Stack Exchange).
/// Anything else is treated as absent.
pub fn timestamp_at(value: &Value, pointer: &str) -> Option<DateTime<Utc>> {
    match value.pointer(pointer)? {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "héllo wörld";
        assert_eq!(truncate(text, 5), "héllo…");
        assert_eq!(truncate(text, 50), text);
    }

    #[test]
    fn test_preview_is_bounded() {
        let long = "word ".repeat(500);
        let out = preview(&long);
        assert!(out.chars().count() <= MAX_PREVIEW_CHARS + 1);
        assert!(out.ends_with('…'));
    }

    #[test]
    fn test_preview_collapses_newlines() {
        assert_eq!(preview("line one\r\n\r\n  line two"), "line one line two");
    }

    #[test]
    fn test_html_to_text() {
        let html = "<p>Use <code>Vec&lt;u8&gt;</code> &amp; it&#39;s fine</p>";
        assert_eq!(preview(&html_to_text(html)), "Use Vec<u8> & it's fine");
    }

    #[test]
    fn test_timestamp_formats() {
        let v = json!({
            "iso": "2024-03-01T12:00:00Z",
            "unix": 1709294400,
            "bad": "yesterday",
            "null": null
        });
        assert_eq!(timestamp_at(&v, "/iso"), timestamp_at(&v, "/unix"));
        assert!(timestamp_at(&v, "/iso").is_some());
        assert!(timestamp_at(&v, "/bad").is_none());
        assert!(timestamp_at(&v, "/null").is_none());
        assert!(timestamp_at(&v, "/missing").is_none());
    }
}

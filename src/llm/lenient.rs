//! Lenient decoding of model output that is supposed to be JSON.
//!
//! Models wrap JSON in code fences, add prose around it, leave trailing
//! commas, emit stray backslashes and get cut off mid-object. Everything that
//! can be salvaged is; parse errors never leave this module.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// Outcome of decoding model output.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    /// Parsed as-is.
    Complete(T),
    /// Parsed after repairs, or with some fields dropped.
    Partial(T),
    /// Nothing usable.
    Failed(String),
}

impl<T> Decoded<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Complete(v) | Self::Partial(v) => Some(v),
            Self::Failed(_) => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Decoded<U> {
        match self {
            Self::Complete(v) => Decoded::Complete(f(v)),
            Self::Partial(v) => Decoded::Partial(f(v)),
            Self::Failed(e) => Decoded::Failed(e),
        }
    }
}

/// Remove a surrounding markdown code fence, if any.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag line.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// Locate the first JSON object or array. Returns the slice and whether it
/// had to be closed artificially because the output was cut off.
fn locate_json(text: &str) -> Option<(String, bool)> {
    let start = text.find(['{', '['])?;
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(c) {
                    return None;
                }
                if stack.is_empty() {
                    let end = start + offset + c.len_utf8();
                    return Some((text[start..end].to_string(), false));
                }
            }
            _ => {}
        }
    }

    // Truncated: close what is open.
    let mut closed = text[start..].trim_end().to_string();
    if in_string {
        if escaped {
            closed.pop();
        }
        closed.push('"');
    }
    let trimmed_len = closed.trim_end_matches([',', ' ', '\n', '\t', ':']).len();
    closed.truncate(trimmed_len);
    while let Some(closer) = stack.pop() {
        closed.push(closer);
    }
    Some((closed, true))
}

/// Double backslashes that do not start a valid JSON escape.
fn repair_backslashes(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    let mut chars = json.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if !in_string {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
            continue;
        }
        match c {
            '\\' => match chars.peek() {
                Some('"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' | 'u') => {
                    out.push(c);
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                }
                _ => out.push_str("\\\\"),
            },
            '"' => {
                in_string = false;
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

/// Drop commas directly before a closing bracket, outside strings.
fn remove_trailing_commas(json: &str) -> String {
    let chars: Vec<char> = json.chars().collect();
    let mut out = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            out.push(c);
            continue;
        }
        if c == '"' {
            in_string = true;
        }
        if c == ',' {
            let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Decode model output into a JSON value.
pub fn decode_value(raw: &str) -> Decoded<Value> {
    let text = strip_code_fences(raw);
    let Some((candidate, truncated)) = locate_json(text) else {
        return Decoded::Failed("no JSON object in response".to_string());
    };

    if !truncated {
        if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
            return Decoded::Complete(value);
        }
    }

    let repaired = remove_trailing_commas(&repair_backslashes(&candidate));
    match serde_json::from_str::<Value>(&repaired) {
        Ok(value) => Decoded::Partial(value),
        Err(e) => Decoded::Failed(format!("unparseable JSON: {}", e)),
    }
}

/// Decode model output into `T`.
///
/// When the object as a whole does not fit `T`, fields are taken one at a
/// time and the ones that do not fit are left at their defaults.
pub fn decode<T>(raw: &str) -> Decoded<T>
where
    T: DeserializeOwned + Serialize + Default,
{
    let (value, complete) = match decode_value(raw) {
        Decoded::Complete(v) => (v, true),
        Decoded::Partial(v) => (v, false),
        Decoded::Failed(e) => return Decoded::Failed(e),
    };

    if let Ok(typed) = serde_json::from_value::<T>(value.clone()) {
        return if complete {
            Decoded::Complete(typed)
        } else {
            Decoded::Partial(typed)
        };
    }

    let Value::Object(fields) = value else {
        return Decoded::Failed("response is not a JSON object".to_string());
    };
    let Ok(Value::Object(mut merged)) = serde_json::to_value(T::default()) else {
        return Decoded::Failed("target is not an object".to_string());
    };

    let mut kept = 0;
    for (key, field) in fields {
        if !merged.contains_key(&key) {
            continue;
        }
        let mut candidate: Map<String, Value> = merged.clone();
        candidate.insert(key.clone(), field);
        if serde_json::from_value::<T>(Value::Object(candidate.clone())).is_ok() {
            merged = candidate;
            kept += 1;
        }
    }

    if kept == 0 {
        return Decoded::Failed("no fields matched the expected shape".to_string());
    }
    match serde_json::from_value::<T>(Value::Object(merged)) {
        Ok(typed) => Decoded::Partial(typed),
        Err(e) => Decoded::Failed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Menu, RestaurantSummary};

    #[test]
    fn test_clean_json_is_complete() {
        let decoded: Decoded<RestaurantSummary> =
            decode(r#"{"description": "Small bistro", "confidence": 0.8}"#);
        assert!(decoded.is_complete());
        let summary = decoded.ok().unwrap();
        assert_eq!(summary.description.as_deref(), Some("Small bistro"));
        assert_eq!(summary.confidence, Some(0.8));
    }

    #[test]
    fn test_fenced_json_with_prose() {
        let raw = "Here you go:\n```json\n{\"cuisine\": \"Basque\"}\n```\nEnjoy!";
        let summary: RestaurantSummary = decode(raw).ok().unwrap();
        assert_eq!(summary.cuisine.as_deref(), Some("Basque"));
    }

    #[test]
    fn test_prose_before_and_after_object() {
        let raw = "Sure! {\"cuisine\": \"Thai\"} Let me know if you need more.";
        let decoded: Decoded<RestaurantSummary> = decode(raw);
        assert!(decoded.is_complete());
    }

    #[test]
    fn test_trailing_commas_and_backslashes_are_partial() {
        let raw = r#"{"description": "Wood-fired \ grill", "highlights": ["tasting menu",],}"#;
        let decoded: Decoded<RestaurantSummary> = decode(raw);
        assert!(matches!(decoded, Decoded::Partial(_)));
        let summary = decoded.ok().unwrap();
        assert_eq!(summary.description.as_deref(), Some("Wood-fired \\ grill"));
        assert_eq!(summary.highlights, vec!["tasting menu"]);
    }

    #[test]
    fn test_truncated_output_is_closed() {
        let raw = r#"{"sections": [{"section": "Starters", "items": [{"name": "Oysters", "price": "€18"}"#;
        let menu: Menu = decode(raw).ok().unwrap();
        assert_eq!(menu.item_count(), 1);
        assert_eq!(menu.sections[0].items[0].price.as_deref(), Some("€18"));
    }

    #[test]
    fn test_wrong_typed_field_is_dropped() {
        let raw = r#"{"description": "Noodle bar", "confidence": "very high"}"#;
        let decoded: Decoded<RestaurantSummary> = decode(raw);
        assert!(matches!(decoded, Decoded::Partial(_)));
        let summary = decoded.ok().unwrap();
        assert_eq!(summary.description.as_deref(), Some("Noodle bar"));
        assert_eq!(summary.confidence, None);
    }

    #[test]
    fn test_garbage_fails() {
        assert!(decode::<RestaurantSummary>("Needs translation.").is_failed());
        assert!(decode::<RestaurantSummary>("").is_failed());
        assert!(decode_value("{]").is_failed());
    }

    #[test]
    fn test_top_level_array() {
        let value = decode_value(r#"[{"section": "Mains", "items": []}]"#).ok().unwrap();
        assert!(value.is_array());
    }
}

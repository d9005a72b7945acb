//! Tolerant JSON extraction from vision-model replies.
//!
//! Models wrap JSON in markdown fences, prepend prose, emit several
//! blocks, or get cut off mid-array. These helpers find the first valid
//! JSON value in a reply and, when the reply was truncated, salvage every
//! syntactically complete element seen so far.

use serde_json::Value;

/// Extract the first JSON object or array from free text.
///
/// Tries, in order: the whole trimmed reply, each fenced code block, then
/// every brace/bracket-delimited candidate found by scanning. Returns
/// `None` only when nothing parses, even after truncation recovery.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        if v.is_object() || v.is_array() {
            return Some(v);
        }
    }

    for block in fenced_blocks(text) {
        if let Ok(v) = serde_json::from_str::<Value>(block.trim()) {
            if v.is_object() || v.is_array() {
                return Some(v);
            }
        }
        if let Some(v) = recover_truncated(block.trim()) {
            return Some(v);
        }
    }

    for candidate in delimited_candidates(text) {
        if let Ok(v) = serde_json::from_str::<Value>(candidate) {
            if v.is_object() || v.is_array() {
                return Some(v);
            }
        }
    }

    recover_truncated(trimmed)
}

/// Extract a JSON array, unwrapping a single-key object (`{"fixtures":
/// [...]}`-style replies) when needed.
pub fn extract_json_array(text: &str) -> Option<Vec<Value>> {
    let value = extract_json(text)?;
    match value {
        Value::Array(items) => Some(items),
        Value::Object(map) => map
            .into_iter()
            .find_map(|(_, v)| v.as_array().cloned()),
        _ => None,
    }
}

/// String view of a scalar value: models reply with `"number": "3"` and
/// `"number": 3` interchangeably.
pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Unsigned view of a scalar value, accepting both `3` and `"3"`.
pub fn value_to_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Contents of every ```-fenced block, language tag stripped.
fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("```") {
        let after = &rest[start + 3..];
        // Skip the language tag line if present.
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after[body_start..];
        match body.find("```") {
            Some(end) => {
                blocks.push(&body[..end]);
                rest = &body[end + 3..];
            }
            None => {
                // Unterminated fence: the reply was cut off inside it.
                blocks.push(body);
                break;
            }
        }
    }
    blocks
}

/// Every balanced `{...}` / `[...]` region in the text, respecting string
/// literals and escapes.
fn delimited_candidates(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let open = bytes[i];
        if open == b'{' || open == b'[' {
            if let Some(end) = matching_close(text, i) {
                out.push(&text[i..=end]);
                i = end + 1;
                continue;
            }
        }
        i += 1;
    }
    out
}

fn matching_close(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Salvage a truncated array or object by dropping the unfinished tail
/// and closing every open delimiter.
///
/// `[{"a":1},{"b":2},{"c":` recovers to `[{"a":1},{"b":2}]`. Returns
/// `None` when nothing complete survives.
pub fn recover_truncated(text: &str) -> Option<Value> {
    let start = text.find(['[', '{'])?;
    let body = &text[start..];

    // Walk the body tracking delimiter state and remembering the byte
    // offset after each syntactically complete top-level element.
    let bytes = body.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut last_complete = None;
    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                if depth <= 1 {
                    last_complete = Some(i);
                }
                if depth == 0 {
                    // The value actually closed; plain parsing should
                    // have handled it, but be permissive.
                    return serde_json::from_str(&body[..=i]).ok();
                }
            }
            _ => {}
        }
    }

    let cut = last_complete?;
    let closer = match bytes[0] {
        b'[' => "]",
        _ => "}",
    };
    let candidate = format!("{}{}", &body[..=cut], closer);
    serde_json::from_str(&candidate).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_object() {
        let v = extract_json(r#"{"code": "A1"}"#).unwrap();
        assert_eq!(v["code"], "A1");
    }

    #[test]
    fn test_fenced_block() {
        let text = "Here are the fixtures:\n```json\n[{\"code\": \"A1\"}]\n```\nDone.";
        let arr = extract_json_array(text).unwrap();
        assert_eq!(arr.len(), 1);
        assert_eq!(arr[0]["code"], "A1");
    }

    #[test]
    fn test_prose_then_json() {
        let text = "The schedule contains: [{\"code\": \"B2\", \"voltage\": \"277\"}] as requested";
        let arr = extract_json_array(text).unwrap();
        assert_eq!(arr[0]["voltage"], "277");
    }

    #[test]
    fn test_first_valid_block_wins() {
        let text = "```json\n{\"stage\": 1}\n```\n```json\n{\"stage\": 2}\n```";
        let v = extract_json(text).unwrap();
        assert_eq!(v["stage"], 1);
    }

    #[test]
    fn test_truncated_array_recovers_complete_items() {
        let text = r#"[{"number": "1", "text": "PROVIDE FIXTURE"}, {"number": "2", "text": "ROUTE CONDUIT"}, {"number": "3", "te"#;
        let v = recover_truncated(text).unwrap();
        let arr = v.as_array().unwrap();
        assert_eq!(arr.len(), 2);
        assert_eq!(arr[1]["number"], "2");
    }

    #[test]
    fn test_truncated_inside_fence() {
        let text = "```json\n[{\"code\": \"A1\"}, {\"code\": \"B2\"}, {\"co";
        let arr = extract_json_array(text).unwrap();
        assert_eq!(arr.len(), 2);
    }

    #[test]
    fn test_object_wrapping_array_unwrapped() {
        let text = r#"{"fixtures": [{"code": "A1"}]}"#;
        let arr = extract_json_array(text).unwrap();
        assert_eq!(arr.len(), 1);
    }

    #[test]
    fn test_braces_inside_strings_ignored() {
        let text = r#"note: [{"text": "use {spare} breaker"}]"#;
        let arr = extract_json_array(text).unwrap();
        assert_eq!(arr[0]["text"], "use {spare} breaker");
    }

    #[test]
    fn test_no_json_returns_none() {
        assert!(extract_json("I could not read the drawing.").is_none());
    }
}

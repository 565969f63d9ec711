//! Helpers for pulling structured data out of free-form model replies.

/// Strip a surrounding Markdown code fence (with an optional `json` tag).
pub fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(start) = text.find("```") else {
        return text;
    };
    let after = &text[start + 3..];
    let body = match after.find("```") {
        Some(end) => &after[..end],
        None => after,
    };
    let body = body.trim();
    body.strip_prefix("json").map(str::trim_start).unwrap_or(body)
}

/// The outermost `{ ... }` span of a reply, after removing code fences.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let body = strip_code_fence(text);
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (end > start).then(|| &body[start..=end])
}

/// Parse the outermost JSON object in a reply.
pub fn parse_json_object(text: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
    let raw = extract_json_object(text)?;
    match serde_json::from_str(raw).ok()? {
        serde_json::Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Truncate to at most `max` characters, appending an ellipsis when cut.
pub fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

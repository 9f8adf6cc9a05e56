//! Helpers for digesting raw model output.
//!
//! Local models wrap JSON in markdown fences, prepend prose, or trail
//! explanations. Every structured-output consumer in this crate goes
//! through [`extract_json_object`] so the tolerance rules stay in one
//! place.

/// Locate the JSON object inside a model response.
///
/// Strips ```` ```json ```` / ```` ``` ```` envelopes, then takes the
/// substring from the first `{` to the last `}`. Returns `None` when no
/// braces are present; the caller decides whether that is fatal.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```json") {
        text = rest.strip_suffix("```").unwrap_or(rest).trim();
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest.strip_suffix("```").unwrap_or(rest).trim();
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Shorten `s` to at most `max_len` bytes, marking the cut.
///
/// Used for memory snippets in prompts and the executor's answer echo.
/// Cuts on a char boundary at or below the limit.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

//! Shared handling of model output that should be JSON.

/// Pull the JSON payload out of a model response.
///
/// Prefers a fenced code block when one is present, otherwise falls
/// back to the outermost braced region. Returns `None` when the text
/// contains nothing that could be JSON, so callers can report a
/// missing payload instead of a confusing deserialization error.
pub(crate) fn json_payload(text: &str) -> Option<&str> {
    fenced_block(text).or_else(|| braced_region(text))
}

fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let rest = &text[open + 3..];
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let close = rest.find("```")?;
    Some(rest[..close].trim())
}

fn braced_region(text: &str) -> Option<&str> {
    let start = text.find(|c| c == '{' || c == '[')?;
    let end = text.rfind(|c| c == '}' || c == ']')?;
    (end >= start).then(|| &text[start..=end])
}

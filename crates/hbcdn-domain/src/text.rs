/// Strip control characters (keeping tab/newline/CR) and trim whitespace.
///
/// Applied to human-readable PARAM.SFO strings before they are stored, so the
/// catalog and every export carry the same stable rendition.
#[must_use]
pub fn normalize_text(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control() || matches!(ch, '\t' | '\n' | '\r'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Numeric ordering key for dotted version strings.
///
/// Extracts every digit run, then strips trailing zeros (keeping at least one
/// component) so `"01.10"` sorts above `"01.09"` and `"1.0"` equals `"1"`.
#[must_use]
pub fn version_key(value: &str) -> Vec<u64> {
    let mut parts = Vec::new();
    let mut run = String::new();
    for ch in value.chars() {
        if ch.is_ascii_digit() {
            run.push(ch);
        } else if !run.is_empty() {
            parts.push(run.parse::<u64>().unwrap_or(u64::MAX));
            run.clear();
        }
    }
    if !run.is_empty() {
        parts.push(run.parse::<u64>().unwrap_or(u64::MAX));
    }
    while parts.len() > 1 && parts.last() == Some(&0) {
        parts.pop();
    }
    parts
}

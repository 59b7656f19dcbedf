//! Text normalization for metadata matching.

/// Words that mark a re-release rather than a different recording.
const QUALIFIERS: &[&str] = &[
    "remaster",
    "remastered",
    "edit",
    "version",
    "mono",
    "stereo",
    "live",
];

/// Lowercase, drop bracketed parts and qualifier words, keep only
/// alphanumerics, and collapse whitespace.
///
/// `"Song (2011 Remaster) [Live]"` and `"song"` normalize the same.
pub fn normalize_text(s: &str) -> String {
    let mut kept = String::with_capacity(s.len());
    let mut depth = 0usize;
    for c in s.chars() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ if depth > 0 => {}
            c if c.is_alphanumeric() => kept.extend(c.to_lowercase()),
            _ => kept.push(' '),
        }
    }

    kept.split_whitespace()
        .filter(|word| !QUALIFIERS.contains(word))
        .collect::<Vec<_>>()
        .join(" ")
}

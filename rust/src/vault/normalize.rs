//! Whitespace handling used for input trimming and duplicate detection.

/// Whitespace as scripts are written by their clients: Unicode `White_Space`
/// plus the byte order mark, minus NEL (U+0085).
fn is_script_space(c: char) -> bool {
    c == '\u{feff}' || (c.is_whitespace() && c != '\u{85}')
}

/// Strips leading and trailing script whitespace.
pub fn trim_script(text: &str) -> &str {
    text.trim_matches(is_script_space)
}

/// Trims the text and collapses every run of whitespace into a single space.
///
/// Only used to compare scripts; stored content keeps its inner whitespace.
pub fn normalize(text: &str) -> String {
    text.split(is_script_space)
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

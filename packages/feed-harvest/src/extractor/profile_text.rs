//! Cleanup of a profile page's raw body text.

use lazy_static::lazy_static;
use regex::Regex;

/// Navigation chrome ends at this line.
const START_MARKER: &str = "Skip to search";

/// The last section worth keeping.
const END_MARKER: &str = "InterestsInterests";

lazy_static! {
    // Inline JSON/state blobs that leak into text content
    static ref BRACE_BLOB: Regex = Regex::new(r"(?s)\{.*?\}\s*").unwrap();
}

/// Strip page chrome and embedded blobs from a profile's body text.
///
/// Keeps the lines after the "Skip to search" marker up to and including
/// the interests section. Text without the marker is kept whole.
pub fn clean_profile_text(raw: &str) -> String {
    if raw.trim().is_empty() {
        return String::new();
    }

    let lines: Vec<&str> = raw.lines().collect();
    let start = lines
        .iter()
        .position(|line| line.contains(START_MARKER))
        .map(|i| i + 1)
        .unwrap_or(0);

    let mut cleaned = Vec::new();
    for line in &lines[start..] {
        let stripped = BRACE_BLOB.replace_all(line, "");
        let trimmed = stripped.trim();
        if !trimmed.is_empty() {
            cleaned.push(trimmed.to_string());
        }
        if stripped.contains(END_MARKER) {
            break;
        }
    }

    cleaned.join("\n")
}

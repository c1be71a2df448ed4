//! Name sanitization applied before every create or rename call.

use chrono::Utc;

/// Character substituted for anything the remote cannot store in a name.
pub const PLACEHOLDER: char = '_';

const DISALLOWED: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Make `name` safe to send as a single path segment.
///
/// Surrounding whitespace is trimmed first, so whitespace-only input counts
/// as empty. Path separators, wildcard characters and control characters left
/// in the trimmed name then become `_`. An empty name is replaced by a
/// timestamped `untitled_…` name. Applying it twice changes nothing.
pub fn sanitize_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return placeholder_name();
    }

    trimmed
        .chars()
        .map(|c| {
            if DISALLOWED.contains(&c) || c.is_control() {
                PLACEHOLDER
            } else {
                c
            }
        })
        .collect()
}

fn placeholder_name() -> String {
    format!("untitled_{}", Utc::now().format("%Y%m%d_%H%M%S"))
}

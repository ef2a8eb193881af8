//! Append-only merge policy for rule narrative text.

/// Merge new narrative text onto an existing value.
///
/// The new text goes after the existing text on a new line. An empty existing
/// value is replaced outright. No trimming or de-duplication is performed, so
/// applying the same text twice records it twice.
pub fn merge_details(existing: &str, addition: &str) -> String {
    if existing.is_empty() {
        addition.to_string()
    } else {
        format!("{existing}\n{addition}")
    }
}

/// In-place form of [`merge_details`].
pub fn append_details(target: &mut String, addition: &str) {
    if !target.is_empty() {
        target.push('\n');
    }
    target.push_str(addition);
}

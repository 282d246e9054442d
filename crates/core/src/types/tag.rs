//! Store tags.

/// Tags offered as checkboxes on the store form.
pub const SUGGESTED_TAGS: &[&str] = &[
    "Wifi",
    "Open Late",
    "Family Friendly",
    "Vegetarian",
    "Licensed",
];

/// Maximum length of a single tag.
pub const MAX_TAG_LENGTH: usize = 40;

/// Clean a list of user-supplied tags.
///
/// Tags are trimmed, blank ones dropped, over-long ones truncated, and
/// duplicates removed keeping the first spelling. Order is otherwise kept.
#[must_use]
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag: String = tag.as_ref().trim().chars().take(MAX_TAG_LENGTH).collect();
        if tag.is_empty() || out.iter().any(|t| t.eq_ignore_ascii_case(&tag)) {
            continue;
        }
        out.push(tag);
    }
    out
}

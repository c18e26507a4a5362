//! Text normalization shared by alignment, verification, and hashing.
//!
//! Three levels of normalization are used:
//!
//! | Function | Case | Whitespace | Punctuation |
//! |----------|------|------------|-------------|
//! | [`collapse_whitespace`] | kept | collapsed | kept |
//! | [`normalize_title`] | lowered | collapsed | kept |
//! | [`normalize_loose`] | lowered | collapsed | folded to spaces |

/// Trim and collapse every whitespace run to a single space.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase and collapse whitespace. Used for titles and literal
/// substring anchors.
pub fn normalize_title(s: &str) -> String {
    collapse_whitespace(&s.to_lowercase())
}

/// Lowercase, fold every non-alphanumeric character to a space, and
/// collapse whitespace. Tolerates punctuation differences such as
/// `"four-headed"` vs `"four headed"`.
pub fn normalize_loose(s: &str) -> String {
    let folded: String = s
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    collapse_whitespace(&folded)
}

/// Split text into lowercase alphanumeric terms.
pub fn tokenize(s: &str) -> Vec<String> {
    normalize_loose(s)
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Word-boundary-aware near-match: does `needle` occur in `haystack`
/// after loose normalization of both?
///
/// An empty needle never matches.
pub fn contains_near(haystack: &str, needle: &str) -> bool {
    let needle = normalize_loose(needle);
    if needle.is_empty() {
        return false;
    }
    let haystack = normalize_loose(haystack);
    format!(" {} ", haystack).contains(&format!(" {} ", needle))
}

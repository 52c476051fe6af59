//! Decides whether a parsed announcement is worth fulfilling.

use nzbrelay_shared::{KeywordSet, ParsedAnnouncement};

/// Marker for clip releases: always actionable, but never deduplicated,
/// uploaded or recorded.
pub const CLIP_MARKER: &str = "clip";

/// Marker for the special release type: always actionable, announced and
/// imaged only.
pub const SPECIAL_MARKER: &str = "p0rnl0v3r";

/// Why a release was found actionable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Name carries the special-type marker.
    Special,
    /// Name carries the clip marker.
    Clip,
    /// Name contains this keyword.
    Keyword(String),
}

/// Whether `release_name` carries the clip marker.
pub fn is_clip(release_name: &str) -> bool {
    release_name.to_lowercase().contains(CLIP_MARKER)
}

/// Whether `release_name` carries the special-type marker.
pub fn is_special(release_name: &str) -> bool {
    release_name.to_lowercase().contains(SPECIAL_MARKER)
}

/// Explain why `parsed` is actionable, or `None` if it is not.
pub fn verdict(parsed: &ParsedAnnouncement, keywords: &KeywordSet) -> Option<Verdict> {
    let name = &parsed.release_name;
    if is_special(name) {
        return Some(Verdict::Special);
    }
    if is_clip(name) {
        return Some(Verdict::Clip);
    }
    keywords
        .first_match(name)
        .map(|kw| Verdict::Keyword(kw.to_string()))
}

/// A release is actionable if it carries a special marker or any keyword.
///
/// Pure: `keywords` is only read.
pub fn classify(parsed: &ParsedAnnouncement, keywords: &KeywordSet) -> bool {
    verdict(parsed, keywords).is_some()
}

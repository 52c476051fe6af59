//! Message normalizer: strips chat formatting codes from raw text.

use std::sync::LazyLock;

use regex::Regex;

/// Colour sequences (with their optional foreground/background digits)
/// and the single-character toggles.
static CONTROL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\x03[0-9]{0,2}(?:,[0-9]{1,2})?|\x04(?:[0-9A-Fa-f]{6}(?:,[0-9A-Fa-f]{6})?)?|[\x02\x0f\x11\x16\x1d\x1e\x1f]",
    )
    .expect("valid regex")
});

/// Remove every formatting sequence from `raw`.
///
/// The output never contains a control character, so applying the function
/// twice yields the same text as applying it once.
pub fn normalize(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    CONTROL_RE.replace_all(raw, "").into_owned()
}

/// [`normalize`] for transports that may deliver no text at all.
pub fn normalize_opt(raw: Option<&str>) -> String {
    raw.map(normalize).unwrap_or_default()
}

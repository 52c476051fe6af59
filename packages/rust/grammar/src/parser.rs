//! Announcement grammar.
//!
//! Announcements are a run of bracket groups, matched left to right:
//!
//! ```text
//! [category] [descriptor] [release name] ([ignored]) [identifier]
//! ```
//!
//! - `category`: free text, trimmed. Must contain `XXX: ` followed by
//!   `HD-CLIPS`, `UHD-CLIPS` or `TRANS`.
//! - `descriptor`: `.`-delimited segments with an embedded temporal token:
//!   a 2-digit year, a 4-digit year or an episode marker (`E` + digits).
//! - `release name`: free text, trimmed, non-empty.
//! - an optional bracket group directly after the release name is skipped.
//! - `identifier`: trailing token, captured but not validated.
//!
//! After the structural match, the temporal token or the release name must
//! contain a year from the configured recent-year window.
//!
//! Any mismatch yields `None`; that is the normal result for unrelated chat.

use std::sync::LazyLock;

use nzbrelay_shared::{GrammarConfig, ParsedAnnouncement};
use regex::Regex;

// ---------------------------------------------------------------------------
// Regex patterns (compiled once)
// ---------------------------------------------------------------------------

/// Structural grammar. Captures: 1 category, 2 descriptor, 3 temporal token,
/// 4 release name, 5 identifier.
static ANNOUNCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?:\[|^)\s*(.*?)\s*\]",
        r"\s*\[\s*(.*?\.([0-9]{2}|[0-9]{4}|E[0-9]+)\..*?)\s*\]",
        r"\s*\[\s*(.*?)\s*\]",
        r"(?:\s*\[.*?\])?",
        r"\s*\[\s*(.*?)\s*\]",
    ))
    .expect("announcement regex")
});

/// Accepted category labels.
static CATEGORY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"XXX: (?:UHD-CLIPS|HD-CLIPS|TRANS)").expect("category regex")
});

/// A size figure such as `1.4 GB` or `700MiB`.
static SIZE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[0-9]+(?:[.,][0-9]+)?\s*[KMGT]i?B").expect("size regex")
});

// ---------------------------------------------------------------------------
// Recent-year window
// ---------------------------------------------------------------------------

/// Bounded set of recent years, as 4-digit and 2-digit tokens.
///
/// Tokens are matched as plain substrings, so `2024` and `.24.` both count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentYears {
    tokens: Vec<String>,
}

impl RecentYears {
    /// Window covering `first..=last` (both inclusive).
    pub fn new(first: u16, last: u16) -> Self {
        let mut tokens: Vec<String> = (first..=last).map(|y| y.to_string()).collect();
        for year in first..=last {
            let short = format!("{:02}", year % 100);
            if !tokens.contains(&short) {
                tokens.push(short);
            }
        }
        Self { tokens }
    }

    /// Whether `text` contains any year from the window.
    pub fn matches(&self, text: &str) -> bool {
        self.tokens.iter().any(|t| text.contains(t.as_str()))
    }
}

impl Default for RecentYears {
    fn default() -> Self {
        Self::from(&GrammarConfig::default())
    }
}

impl From<&GrammarConfig> for RecentYears {
    fn from(config: &GrammarConfig) -> Self {
        Self::new(config.first_year, config.last_year)
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parses normalized chat text into [`ParsedAnnouncement`]s.
#[derive(Debug, Clone, Default)]
pub struct AnnouncementParser {
    years: RecentYears,
}

impl AnnouncementParser {
    /// Create a parser accepting the given year window.
    pub fn new(years: RecentYears) -> Self {
        Self { years }
    }

    /// Parse one normalized line. Returns `None` on structural mismatch or
    /// when category / year validation rejects the line.
    pub fn parse(&self, clean_text: &str) -> Option<ParsedAnnouncement> {
        let caps = ANNOUNCE_RE.captures(clean_text)?;

        let category = caps.get(1)?.as_str().trim();
        let descriptor = caps.get(2)?.as_str().trim();
        let temporal_token = caps.get(3)?.as_str();
        let release_name = caps.get(4)?.as_str().trim();
        let id_token = caps.get(5)?.as_str().trim();

        if release_name.is_empty() {
            tracing::trace!(clean_text, "rejected: empty release name");
            return None;
        }

        if !CATEGORY_RE.is_match(category) {
            tracing::trace!(category, "rejected: category not accepted");
            return None;
        }

        if !self.years.matches(temporal_token) && !self.years.matches(release_name) {
            tracing::trace!(temporal_token, release_name, "rejected: no recent year");
            return None;
        }

        Some(ParsedAnnouncement {
            category: category.to_string(),
            descriptor: descriptor.to_string(),
            temporal_token: temporal_token.to_string(),
            release_name: release_name.to_string(),
            size_token: SIZE_RE.find(id_token).map(|m| m.as_str().to_string()),
            id_token: id_token.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> AnnouncementParser {
        AnnouncementParser::default()
    }

    #[test]
    fn accepts_well_formed_line_with_skipped_group() {
        let parsed = parser()
            .parse("[XXX: HD-CLIPS][Foo.2024.HD][MyRelease.Name][Skip][12345]")
            .expect("should match");
        assert_eq!(parsed.category, "XXX: HD-CLIPS");
        assert_eq!(parsed.release_name, "MyRelease.Name");
        assert_eq!(parsed.descriptor, "Foo.2024.HD");
        assert_eq!(parsed.temporal_token, "2024");
        assert_eq!(parsed.id_token, "12345");
        assert_eq!(parsed.size_token, None);
    }

    #[test]
    fn accepts_line_without_optional_group() {
        let parsed = parser()
            .parse("[ XXX: UHD-CLIPS ] [ Site.24.05.12.Scene.2160p ] [ Site.Scene.2160p ] [ 4.2 GB ]")
            .expect("should match");
        assert_eq!(parsed.category, "XXX: UHD-CLIPS");
        assert_eq!(parsed.release_name, "Site.Scene.2160p");
        assert_eq!(parsed.temporal_token, "24");
        assert_eq!(parsed.id_token, "4.2 GB");
        assert_eq!(parsed.size_token.as_deref(), Some("4.2 GB"));
    }

    #[test]
    fn accepts_episode_marker_when_name_has_year() {
        let parsed = parser()
            .parse("[XXX: TRANS][Show.E12.720p][Show.2025.E12][abc]")
            .expect("should match");
        assert_eq!(parsed.temporal_token, "E12");
        assert_eq!(parsed.release_name, "Show.2025.E12");
    }

    #[test]
    fn rejects_unknown_category() {
        assert!(parser()
            .parse("[XXX: BOGUS][Foo.2024.HD][ReleaseName][123]")
            .is_none());
        assert!(parser()
            .parse("[HD-CLIPS][Foo.2024.HD][ReleaseName][123]")
            .is_none());
    }

    #[test]
    fn rejects_stale_years() {
        // Neither the token (E12) nor the name carries a recent year.
        assert!(parser()
            .parse("[XXX: HD-CLIPS][Show.E12.HD][Old.Show.1999][1]")
            .is_none());

        let narrow = AnnouncementParser::new(RecentYears::new(2025, 2026));
        assert!(narrow
            .parse("[XXX: HD-CLIPS][Foo.2024.HD][Name][1]")
            .is_none());
        assert!(narrow
            .parse("[XXX: HD-CLIPS][Foo.2024.HD][Name.2025][1]")
            .is_some());
    }

    #[test]
    fn rejects_structural_mismatch() {
        assert!(parser().parse("hello everyone").is_none());
        assert!(parser().parse("[XXX: HD-CLIPS][NoTemporal][Name][1]").is_none());
        assert!(parser().parse("").is_none());
    }

    #[test]
    fn rejects_blank_release_name() {
        assert!(parser()
            .parse("[XXX: HD-CLIPS][Foo.2024.HD][   ][1]")
            .is_none());
    }

    #[test]
    fn recent_years_tokens() {
        let years = RecentYears::new(2024, 2025);
        assert!(years.matches("Name.2024"));
        assert!(years.matches("Name.25.01.01"));
        assert!(!years.matches("Name.2019"));
    }
}

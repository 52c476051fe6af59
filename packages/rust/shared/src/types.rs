//! Core domain types shared by the grammar, pipeline and transport layers.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// InboundMessage
// ---------------------------------------------------------------------------

/// A single chat line delivered by the transport, tagged with its sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Nickname of the sender.
    pub sender: String,
    /// Raw text, possibly containing chat control codes.
    pub text: String,
    /// When the transport received the line.
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Build a message stamped with the current time.
    pub fn new(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            text: text.into(),
            received_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// Routable announcement categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// `UHD-CLIPS`
    UhdClips,
    /// `TRANS`
    Trans,
    /// `HD-CLIPS`
    HdClips,
}

impl Category {
    /// Categories in routing priority order. The first substring hit wins,
    /// so `UHD-CLIPS` must be tested before `HD-CLIPS`.
    pub const PRIORITY: [Category; 3] = [Category::UhdClips, Category::Trans, Category::HdClips];

    /// The label as it appears inside an announcement.
    pub fn label(&self) -> &'static str {
        match self {
            Category::UhdClips => "UHD-CLIPS",
            Category::Trans => "TRANS",
            Category::HdClips => "HD-CLIPS",
        }
    }

    /// Resolve a free-text category label by case-insensitive substring,
    /// honouring [`Category::PRIORITY`].
    pub fn from_label(label: &str) -> Option<Category> {
        let upper = label.to_uppercase();
        Self::PRIORITY
            .into_iter()
            .find(|cat| upper.contains(cat.label()))
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// ParsedAnnouncement
// ---------------------------------------------------------------------------

/// Structured fields extracted from a release announcement line.
///
/// Produced by the grammar and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedAnnouncement {
    /// Category label, e.g. `XXX: HD-CLIPS`.
    pub category: String,
    /// Full release descriptor (second bracket group).
    pub descriptor: String,
    /// Year or episode token embedded in the descriptor (`24`, `2024`, `E12`).
    pub temporal_token: String,
    /// Release name (third bracket group), trimmed and non-empty.
    pub release_name: String,
    /// Size portion of the trailing group, when it looks like a size.
    pub size_token: Option<String>,
    /// Trailing identifier group, unvalidated.
    pub id_token: String,
}

impl ParsedAnnouncement {
    /// The routable category, if the label names one.
    pub fn routable_category(&self) -> Option<Category> {
        Category::from_label(&self.category)
    }
}

// ---------------------------------------------------------------------------
// KeywordSet
// ---------------------------------------------------------------------------

/// Ordered, case-insensitive keyword substrings used by the classifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeywordSet(Vec<String>);

impl KeywordSet {
    /// Build a set, dropping blank entries (they would match every release).
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            keywords
                .into_iter()
                .map(Into::into)
                .filter(|k| !k.trim().is_empty())
                .collect(),
        )
    }

    /// Whether the set has no usable keywords.
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|k| k.trim().is_empty())
    }

    /// Iterate over the keywords in order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str).filter(|k| !k.trim().is_empty())
    }

    /// First keyword contained in `haystack`, compared case-insensitively.
    pub fn first_match(&self, haystack: &str) -> Option<&str> {
        let lower = haystack.to_lowercase();
        self.iter().find(|kw| lower.contains(&kw.to_lowercase()))
    }
}

// ---------------------------------------------------------------------------
// ReleaseJob
// ---------------------------------------------------------------------------

/// The unit of work carried through the fulfillment pipeline.
///
/// Fields are filled in progressively as the job advances.
#[derive(Debug, Clone)]
pub struct ReleaseJob {
    /// Time-sortable job identifier carried on every event.
    pub id: Uuid,
    /// Release name as announced.
    pub release_name: String,
    /// Category label as announced.
    pub category: String,
    /// Image URL extracted from the metadata response.
    pub image_url: Option<String>,
    /// Artifact (NZB) URL extracted from the metadata response.
    pub artifact_url: Option<String>,
    /// Directory for transient downloads.
    pub work_dir: PathBuf,
    /// Downloaded image, once present.
    pub image_path: Option<PathBuf>,
    /// Temporary artifact download, once present.
    pub temp_artifact_path: Option<PathBuf>,
    /// Durable artifact copy, once present.
    pub final_artifact_path: Option<PathBuf>,
    /// Canonical dedup name, once computed.
    pub final_name: Option<String>,
    /// Set when a dedup record already exists.
    pub skip_upload: bool,
}

impl ReleaseJob {
    /// Start a new job for `release_name`.
    pub fn new(
        release_name: impl Into<String>,
        category: impl Into<String>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            release_name: release_name.into(),
            category: category.into(),
            image_url: None,
            artifact_url: None,
            work_dir: work_dir.into(),
            image_path: None,
            temp_artifact_path: None,
            final_artifact_path: None,
            final_name: None,
            skip_upload: false,
        }
    }

    /// Release name made safe for use as a file stem.
    pub fn file_stem(&self) -> String {
        self.release_name
            .trim()
            .chars()
            .map(|c| match c {
                '/' | '\\' | '\0' => '_',
                other => other,
            })
            .collect()
    }
}

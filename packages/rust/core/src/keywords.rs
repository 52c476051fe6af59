//! Where the classifier's keyword list comes from.
//!
//! The list is edited outside the process, so every decision takes a fresh
//! snapshot instead of caching.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use nzbrelay_shared::KeywordSet;
use tracing::{debug, warn};

/// Supplies a point-in-time keyword snapshot.
#[async_trait]
pub trait KeywordSource: Send + Sync {
    async fn snapshot(&self) -> KeywordSet;
}

/// Keywords read from a JSON array of strings on every call.
///
/// A missing or malformed file yields an empty set.
#[derive(Debug, Clone)]
pub struct FileKeywords {
    path: PathBuf,
}

impl FileKeywords {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl KeywordSource for FileKeywords {
    async fn snapshot(&self) -> KeywordSet {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "keywords file unreadable");
                return KeywordSet::default();
            }
        };
        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(list) => KeywordSet::new(list),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "keywords file is not a JSON string array");
                KeywordSet::default()
            }
        }
    }
}

/// A fixed keyword set.
#[derive(Debug, Clone, Default)]
pub struct StaticKeywords(pub KeywordSet);

#[async_trait]
impl KeywordSource for StaticKeywords {
    async fn snapshot(&self) -> KeywordSet {
        self.0.clone()
    }
}

//! In-process dedup store.

use std::collections::BTreeSet;
use std::sync::Mutex;

use async_trait::async_trait;
use nzbrelay_shared::{RelayError, Result};

use crate::DedupStore;

/// Dedup store backed by a set in memory. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    names: Mutex<BTreeSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `names`.
    pub fn with_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: Mutex::new(names.into_iter().map(Into::into).collect()),
        }
    }

    /// Snapshot of every recorded name, sorted.
    pub fn names(&self) -> Vec<String> {
        self.names
            .lock()
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}

fn poisoned<T>(_: T) -> RelayError {
    RelayError::Storage("memory store lock poisoned".into())
}

#[async_trait]
impl DedupStore for MemoryStore {
    async fn count_matching(&self, needle: &str) -> Result<u64> {
        let names = self.names.lock().map_err(poisoned)?;
        Ok(names.iter().filter(|n| n.contains(needle)).count() as u64)
    }

    async fn insert(&self, name: &str) -> Result<()> {
        self.names.lock().map_err(poisoned)?.insert(name.to_string());
        Ok(())
    }
}

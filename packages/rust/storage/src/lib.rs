//! Dedup store: the record of releases that have already been fulfilled.
//!
//! The pipeline only needs two capabilities, expressed by [`DedupStore`]:
//! a substring count and an idempotent insert. Two implementations ship:
//! - [`Storage`]: libSQL database file (production)
//! - [`MemoryStore`]: in-process set (tests, one-shot runs)

mod memory;
mod migrations;

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database, params};
use nzbrelay_shared::{RelayError, Result};

pub use memory::MemoryStore;

/// Source label written with every record.
pub const RECORD_SOURCE: &str = "nzbrelay";

/// Query/insert contract the pipeline relies on.
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Number of records whose name contains `needle` as a literal substring.
    async fn count_matching(&self, needle: &str) -> Result<u64>;

    /// Record `name`. Inserting an existing name is a no-op.
    async fn insert(&self, name: &str) -> Result<()>;
}

/// Dedup store backed by a local libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path`, applying pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| RelayError::io(parent, e))?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| RelayError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| RelayError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        RelayError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 before the first migration.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            // Table doesn't exist yet
            Err(_) => 0,
        }
    }

    /// Most recently recorded names, newest first.
    pub async fn recent(&self, limit: u32) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT name FROM releases ORDER BY id DESC LIMIT ?1",
                params![limit],
            )
            .await
            .map_err(|e| RelayError::Storage(e.to_string()))?;

        let mut names = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            names.push(
                row.get::<String>(0)
                    .map_err(|e| RelayError::Storage(e.to_string()))?,
            );
        }
        Ok(names)
    }
}

#[async_trait]
impl DedupStore for Storage {
    async fn count_matching(&self, needle: &str) -> Result<u64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM releases WHERE instr(name, ?1) > 0",
                params![needle],
            )
            .await
            .map_err(|e| RelayError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| RelayError::Storage(e.to_string()))?;
                Ok(count.max(0) as u64)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(RelayError::Storage(e.to_string())),
        }
    }

    async fn insert(&self, name: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO releases (name, source, created_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(name) DO NOTHING",
                params![name, RECORD_SOURCE, now.as_str()],
            )
            .await
            .map_err(|e| RelayError::Storage(e.to_string()))?;
        Ok(())
    }
}

//! SurrealDB-backed [`StateStore`] implementation.
//!
//! Two tables: `state` holds one record per release key with the serialized
//! pipeline payload, `locks` holds advisory lock records keyed by the same
//! string. Lock acquisition creates a record at a fixed record id, so the
//! database enforces single-holder semantics.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::store::{StateStore, StorageResult};

#[derive(Debug, Serialize, Deserialize)]
struct StateRow {
    key: String,
    /// JSON payload, stored as a string so the schema stays opaque.
    payload: String,
    updated_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct LockRow {
    key: String,
    acquired_at: String,
}

/// SurrealDB-backed implementation of [`StateStore`].
pub struct SurrealStateStore {
    db: Surreal<Any>,
}

impl SurrealStateStore {
    /// Create an in-memory instance for testing.
    ///
    /// Connects to `mem://` and selects `convoy/main`.
    pub async fn in_memory() -> StorageResult<Self> {
        Self::connect("mem://").await
    }

    /// Create from the `SURREALDB_URL` environment variable, falling back
    /// to local persistence under `.convoy/db`.
    pub async fn from_env() -> StorageResult<Self> {
        if let Ok(url) = std::env::var("SURREALDB_URL") {
            return Self::connect(&url).await;
        }

        let path = ".convoy/db";
        std::fs::create_dir_all(path).map_err(|e| {
            StorageError::Connection(format!("failed to create database directory {path}: {e}"))
        })?;
        let url = format!("surrealkv://{path}");
        info!("no SURREALDB_URL set, using local persistence: {}", url);
        Self::connect(&url).await
    }

    async fn connect(url: &str) -> StorageResult<Self> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        db.use_ns("convoy")
            .use_db("main")
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        info!("SurrealStateStore connected ({})", url);
        Ok(Self { db })
    }
}

#[async_trait]
impl StateStore for SurrealStateStore {
    async fn get(&self, key: &str) -> StorageResult<Option<serde_json::Value>> {
        let row: Option<StateRow> = self.db.select(("state", key)).await?;
        match row {
            Some(row) => Ok(Some(serde_json::from_str(&row.payload)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: serde_json::Value) -> StorageResult<()> {
        let row = StateRow {
            key: key.to_string(),
            payload: serde_json::to_string(&value)?,
            updated_at: Utc::now().to_rfc3339(),
        };
        debug!(key, "persisting state record");
        let _stored: Option<StateRow> = self.db.upsert(("state", key)).content(row).await?;
        Ok(())
    }

    async fn acquire_lock(&self, key: &str) -> StorageResult<bool> {
        let row = LockRow {
            key: key.to_string(),
            acquired_at: Utc::now().to_rfc3339(),
        };
        // The fixed record id makes this create-if-absent: a second creator
        // gets a "record already exists" error from the database.
        let created: Result<Option<LockRow>, surrealdb::Error> =
            self.db.create(("locks", key)).content(row).await;
        match created {
            Ok(_) => {
                debug!(key, "advisory lock acquired");
                Ok(true)
            }
            Err(e) if e.to_string().contains("already exists") => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn release_lock(&self, key: &str) -> StorageResult<bool> {
        let deleted: Option<LockRow> = self.db.delete(("locks", key)).await?;
        if deleted.is_some() {
            debug!(key, "advisory lock released");
        }
        Ok(deleted.is_some())
    }
}

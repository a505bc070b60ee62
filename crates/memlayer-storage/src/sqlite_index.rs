// SPDX-FileCopyrightText: 2026 memlayer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed `VectorIndex`.
//!
//! Records live in the `memories` table with embeddings as BLOBs. Candidate
//! rows are narrowed by `user_id` in SQL; filtering and cosine ranking happen
//! in Rust through [`crate::scoring`].

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};
use tracing::{debug, info};

use memlayer_config::model::StorageConfig;
use memlayer_core::{
    AdapterType, HealthStatus, IndexPatch, MemlayerError, MemoryItem, MemoryType, Metadata,
    PluginAdapter, VectorIndex, VectorQuery,
};

use crate::database::{Database, map_call_err, map_tr_err};
use crate::scoring::{blob_to_vec, rank, recent, vec_to_blob};
use crate::validate_item;

const SELECT_COLUMNS: &str =
    "SELECT id, user_id, content, memory_type, metadata, embedding, created_at, updated_at FROM memories";

/// Fixed-width timestamp format; lexical order equals chronological order.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Pause between attempts to take a lease another process holds.
const LEASE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Persistent vector index on a single tokio-rusqlite connection.
pub struct SqliteIndex {
    db: Database,
    dimensions: usize,
}

impl SqliteIndex {
    /// Open the index at `path`, creating the file and schema when missing.
    pub async fn open(
        path: impl AsRef<Path>,
        wal_mode: bool,
        dimensions: usize,
    ) -> Result<Self, MemlayerError> {
        let db = Database::open(path, wal_mode).await?;
        Ok(Self { db, dimensions })
    }

    /// Open the index described by the `[storage]` config section.
    pub async fn from_config(
        config: &StorageConfig,
        dimensions: usize,
    ) -> Result<Self, MemlayerError> {
        Self::open(&config.database_path, config.wal_mode, dimensions).await
    }

    /// A throwaway index on a private in-memory database.
    pub async fn in_memory(dimensions: usize) -> Result<Self, MemlayerError> {
        let db = Database::open_in_memory().await?;
        Ok(Self { db, dimensions })
    }

    /// Checkpoint and close the underlying database.
    pub async fn close(self) -> Result<(), MemlayerError> {
        self.db.close().await
    }

    /// One attempt at the lease: inserts it, or takes over an expired one.
    async fn try_take_lease(
        &self,
        user_id: &str,
        token: &str,
        ttl: chrono::Duration,
    ) -> Result<bool, MemlayerError> {
        let user_id = user_id.to_string();
        let token = token.to_string();
        let now = Utc::now();
        let taken = self
            .db
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                conn.execute(
                    "INSERT INTO user_leases (user_id, token, expires_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(user_id) DO UPDATE
                     SET token = excluded.token, expires_at = excluded.expires_at
                     WHERE user_leases.expires_at <= ?4",
                    params![
                        user_id,
                        token,
                        format_timestamp(&(now + ttl)),
                        format_timestamp(&now),
                    ],
                )
            })
            .await
            .map_err(map_tr_err)?;
        Ok(taken == 1)
    }

    async fn rows_for_user(&self, user_id: &str) -> Result<Vec<MemoryItem>, MemlayerError> {
        let user_id = user_id.to_string();
        self.db
            .connection()
            .call(move |conn| -> Result<Vec<MemoryItem>, rusqlite::Error> {
                let mut stmt = conn.prepare(&format!(
                    "{SELECT_COLUMNS} WHERE user_id = ?1 ORDER BY created_at DESC, id ASC"
                ))?;
                let rows = stmt
                    .query_map(params![user_id], row_to_item)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(map_tr_err)
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn conversion_err(
    idx: usize,
    ty: rusqlite::types::Type,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(err))
}

fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, rusqlite::types::Type::Text, e))
}

fn row_to_item(row: &Row<'_>) -> rusqlite::Result<MemoryItem> {
    use rusqlite::types::Type;

    let memory_type: String = row.get(3)?;
    let metadata: String = row.get(4)?;
    let embedding: Vec<u8> = row.get(5)?;
    Ok(MemoryItem {
        id: row.get(0)?,
        user_id: row.get(1)?,
        content: row.get(2)?,
        memory_type: memory_type
            .parse::<MemoryType>()
            .map_err(|e| conversion_err(3, Type::Text, e))?,
        metadata: serde_json::from_str::<Metadata>(&metadata)
            .map_err(|e| conversion_err(4, Type::Text, e))?,
        embedding: blob_to_vec(&embedding),
        created_at: parse_timestamp(row, 6)?,
        updated_at: parse_timestamp(row, 7)?,
        score: None,
    })
}

fn metadata_json(metadata: &Metadata) -> Result<String, MemlayerError> {
    serde_json::to_string(metadata).map_err(MemlayerError::storage)
}

#[async_trait]
impl PluginAdapter for SqliteIndex {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::VectorIndex
    }

    async fn health_check(&self) -> Result<HealthStatus, MemlayerError> {
        self.db
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> { conn.execute_batch("SELECT 1;") })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn insert(&self, item: MemoryItem) -> Result<(), MemlayerError> {
        validate_item(&item, self.dimensions)?;
        let metadata = metadata_json(&item.metadata)?;
        let id = item.id.clone();

        let inserted = self
            .db
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO memories
                     (id, user_id, content, memory_type, metadata, embedding, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        item.id,
                        item.user_id,
                        item.content,
                        item.memory_type.to_string(),
                        metadata,
                        vec_to_blob(&item.embedding),
                        format_timestamp(&item.created_at),
                        format_timestamp(&item.updated_at),
                    ],
                )
            })
            .await
            .map_err(map_tr_err)?;

        if inserted == 0 {
            return Err(MemlayerError::Conflict(format!("memory id {id} already exists")));
        }
        debug!(memory_id = %id, "memory row inserted");
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryItem>, MemlayerError> {
        let id = id.to_string();
        self.db
            .connection()
            .call(move |conn| -> Result<Option<MemoryItem>, rusqlite::Error> {
                conn.query_row(
                    &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                    params![id],
                    row_to_item,
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)
    }

    async fn update(&self, id: &str, patch: IndexPatch) -> Result<MemoryItem, MemlayerError> {
        crate::validate_patch(&patch, self.dimensions)?;
        let id = id.to_string();

        // Read-merge-write runs in one transaction on the writer thread.
        self.db
            .connection()
            .call(move |conn| -> Result<MemoryItem, MemlayerError> {
                let tx = conn.transaction().map_err(MemlayerError::storage)?;
                let existing = tx
                    .query_row(
                        &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                        params![id],
                        row_to_item,
                    )
                    .optional()
                    .map_err(MemlayerError::storage)?
                    .ok_or_else(|| MemlayerError::NotFound { id: id.clone() })?;

                let updated = crate::apply_patch(existing, patch);
                tx.execute(
                    "UPDATE memories
                     SET content = ?2, memory_type = ?3, metadata = ?4, embedding = ?5, updated_at = ?6
                     WHERE id = ?1",
                    params![
                        updated.id,
                        updated.content,
                        updated.memory_type.to_string(),
                        metadata_json(&updated.metadata)?,
                        vec_to_blob(&updated.embedding),
                        format_timestamp(&updated.updated_at),
                    ],
                )
                .map_err(MemlayerError::storage)?;
                tx.commit().map_err(MemlayerError::storage)?;
                Ok(updated)
            })
            .await
            .map_err(map_call_err)
    }

    async fn delete(&self, id: &str) -> Result<(), MemlayerError> {
        let owned = id.to_string();
        let removed = self
            .db
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                conn.execute("DELETE FROM memories WHERE id = ?1", params![owned])
            })
            .await
            .map_err(map_tr_err)?;
        if removed == 0 {
            return Err(MemlayerError::NotFound { id: id.to_string() });
        }
        Ok(())
    }

    async fn delete_all(&self, user_id: &str) -> Result<usize, MemlayerError> {
        let owned = user_id.to_string();
        let removed = self
            .db
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                conn.execute("DELETE FROM memories WHERE user_id = ?1", params![owned])
            })
            .await
            .map_err(map_tr_err)?;
        info!(user_id, removed, "deleted all memories for user");
        Ok(removed)
    }

    async fn query(&self, query: VectorQuery) -> Result<Vec<MemoryItem>, MemlayerError> {
        let rows = self.rows_for_user(&query.user_id).await?;
        Ok(match &query.vector {
            Some(vector) => rank(rows, vector, &query.filters, query.threshold, query.limit),
            None => recent(rows, &query.filters, query.limit),
        })
    }

    async fn reset(&self) -> Result<(), MemlayerError> {
        let removed = self
            .db
            .connection()
            .call(|conn| -> Result<usize, rusqlite::Error> {
                conn.execute("DELETE FROM memories", [])
            })
            .await
            .map_err(map_tr_err)?;
        info!(removed, "memory index reset");
        Ok(())
    }

    async fn acquire_user_lease(
        &self,
        user_id: &str,
        ttl: Duration,
    ) -> Result<Option<String>, MemlayerError> {
        let token = uuid::Uuid::new_v4().to_string();
        let lease_ttl = chrono::Duration::from_std(ttl).map_err(MemlayerError::storage)?;
        // Any lease live when we started has expired by then.
        let deadline = tokio::time::Instant::now() + ttl;

        loop {
            if self.try_take_lease(user_id, &token, lease_ttl).await? {
                debug!(user_id, "user lease taken");
                return Ok(Some(token));
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(MemlayerError::Conflict(format!(
                    "user {user_id} is being written by another process"
                )));
            }
            tokio::time::sleep(LEASE_POLL_INTERVAL).await;
        }
    }

    async fn release_user_lease(&self, user_id: &str, token: &str) -> Result<(), MemlayerError> {
        let user_id = user_id.to_string();
        let token = token.to_string();
        self.db
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                conn.execute(
                    "DELETE FROM user_leases WHERE user_id = ?1 AND token = ?2",
                    params![user_id, token],
                )
            })
            .await
            .map_err(map_tr_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_format_is_fixed_width_rfc3339() {
        let ts = DateTime::parse_from_rfc3339("2026-01-02T03:04:05.5Z")
            .unwrap()
            .with_timezone(&Utc);
        let text = format_timestamp(&ts);
        assert_eq!(text, "2026-01-02T03:04:05.500000Z");
        let parsed = DateTime::parse_from_rfc3339(&text).unwrap();
        assert_eq!(parsed.with_timezone(&Utc), ts);
    }

    #[tokio::test]
    async fn stored_rows_round_trip_all_columns() {
        let index = SqliteIndex::in_memory(2).await.unwrap();
        let mut metadata = Metadata::new();
        metadata.insert("topic".into(), serde_json::json!("food"));
        let item = MemoryItem::new("alice", "likes ramen", MemoryType::Semantic, metadata, vec![0.6, 0.8]);
        index.insert(item.clone()).await.unwrap();

        let fetched = index.get(&item.id).await.unwrap().unwrap();
        assert_eq!(fetched, item);
    }

    #[tokio::test]
    async fn file_backed_index_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memlayer.db");

        let index = SqliteIndex::open(&path, true, 2).await.unwrap();
        let item = MemoryItem::new("bob", "plays chess", MemoryType::Factual, Metadata::new(), vec![1.0, 0.0]);
        index.insert(item.clone()).await.unwrap();
        index.close().await.unwrap();

        let reopened = SqliteIndex::open(&path, true, 2).await.unwrap();
        let fetched = reopened.get(&item.id).await.unwrap();
        assert_eq!(fetched.map(|i| i.content), Some("plays chess".to_string()));
        assert_eq!(reopened.health_check().await.unwrap(), HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn lease_excludes_a_second_connection_until_released() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memlayer.db");
        let first = SqliteIndex::open(&path, true, 2).await.unwrap();
        let second = SqliteIndex::open(&path, true, 2).await.unwrap();
        let ttl = Duration::from_secs(60);

        let token = first.acquire_user_lease("alice", ttl).await.unwrap().unwrap();

        // Another process cannot take a live lease.
        let blocked = tokio::time::timeout(
            Duration::from_millis(300),
            second.acquire_user_lease("alice", ttl),
        )
        .await;
        assert!(blocked.is_err());

        // Other users are unaffected.
        assert!(second.acquire_user_lease("bob", ttl).await.unwrap().is_some());

        first.release_user_lease("alice", &token).await.unwrap();
        let taken = tokio::time::timeout(
            Duration::from_secs(5),
            second.acquire_user_lease("alice", ttl),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(taken.is_some());
    }

    #[tokio::test]
    async fn expired_lease_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memlayer.db");
        let crashed = SqliteIndex::open(&path, true, 2).await.unwrap();
        let survivor = SqliteIndex::open(&path, true, 2).await.unwrap();

        let stale = crashed
            .acquire_user_lease("alice", Duration::from_millis(100))
            .await
            .unwrap()
            .unwrap();
        let fresh = survivor
            .acquire_user_lease("alice", Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();
        assert_ne!(stale, fresh);

        // A late release from the old holder leaves the new lease in place.
        crashed.release_user_lease("alice", &stale).await.unwrap();
        let blocked = tokio::time::timeout(
            Duration::from_millis(300),
            crashed.acquire_user_lease("alice", Duration::from_secs(5)),
        )
        .await;
        assert!(blocked.is_err());
    }

    #[tokio::test]
    async fn contended_lease_gives_up_after_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memlayer.db");
        let holder = SqliteIndex::open(&path, true, 2).await.unwrap();
        let waiter = SqliteIndex::open(&path, true, 2).await.unwrap();

        holder
            .acquire_user_lease("alice", Duration::from_secs(60))
            .await
            .unwrap();
        let err = waiter
            .acquire_user_lease("alice", Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, MemlayerError::Conflict(_)));
    }
}

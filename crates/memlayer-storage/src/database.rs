// SPDX-FileCopyrightText: 2026 memlayer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use std::path::Path;

use memlayer_core::MemlayerError;
use tokio_rusqlite::Connection;
use tracing::{debug, info};

use crate::migrations;

/// Handle to the memlayer SQLite database.
///
/// Wraps the single `tokio_rusqlite::Connection` every query goes through.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database file at `path`, apply PRAGMAs and run
    /// pending migrations.
    ///
    /// Missing parent directories are created.
    pub async fn open(path: impl AsRef<Path>, wal_mode: bool) -> Result<Self, MemlayerError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(MemlayerError::storage)?;
        }

        let conn = Connection::open(path)
            .await
            .map_err(MemlayerError::storage)?;
        let db = Self { conn };
        db.prepare(wal_mode).await?;
        info!(path = %path.display(), wal_mode, "opened memory database");
        Ok(db)
    }

    /// Open a private in-memory database. Contents vanish when dropped.
    pub async fn open_in_memory() -> Result<Self, MemlayerError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(MemlayerError::storage)?;
        let db = Self { conn };
        db.prepare(false).await?;
        Ok(db)
    }

    async fn prepare(&self, wal_mode: bool) -> Result<(), MemlayerError> {
        let applied = self
            .conn
            .call(move |conn| -> Result<usize, MemlayerError> {
                if wal_mode {
                    conn.pragma_update(None, "journal_mode", "WAL")
                        .map_err(MemlayerError::storage)?;
                }
                conn.pragma_update(None, "synchronous", "NORMAL")
                    .map_err(MemlayerError::storage)?;
                conn.pragma_update(None, "busy_timeout", 5000)
                    .map_err(MemlayerError::storage)?;
                migrations::run_migrations(conn).map_err(MemlayerError::storage)
            })
            .await
            .map_err(map_call_err)?;
        debug!(applied, "database migrations complete");
        Ok(())
    }

    /// The single connection all queries are issued on.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Checkpoint the WAL and close the connection.
    pub async fn close(self) -> Result<(), MemlayerError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
            })
            .await
            .map_err(map_tr_err)?;
        self.conn
            .close()
            .await
            .map_err(map_tr_err)
    }
}

/// Map a tokio-rusqlite error carrying a rusqlite error into a storage error.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> MemlayerError {
    MemlayerError::Storage {
        source: Box::new(e),
    }
}

/// Map a tokio-rusqlite error whose closure already produced a `MemlayerError`.
pub fn map_call_err(e: tokio_rusqlite::Error<MemlayerError>) -> MemlayerError {
    match e {
        tokio_rusqlite::Error::Error(inner) => inner,
        tokio_rusqlite::Error::ConnectionClosed => {
            MemlayerError::storage("database connection is closed")
        }
        tokio_rusqlite::Error::Close((_, err)) => MemlayerError::storage(err),
        other => MemlayerError::storage(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_creates_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("memlayer.db");
        let db = Database::open(&path, true).await.unwrap();

        let tables: Vec<String> = db
            .connection()
            .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'memories'",
                )?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .unwrap();
        assert_eq!(tables, vec!["memories".to_string()]);
        assert!(path.exists());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reopening_does_not_rerun_migrations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memlayer.db");
        Database::open(&path, true).await.unwrap().close().await.unwrap();
        let db = Database::open(&path, true).await.unwrap();
        let mode: String = db
            .connection()
            .call(|conn| -> Result<String, rusqlite::Error> {
                conn.pragma_query_value(None, "journal_mode", |row| row.get(0))
            })
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn in_memory_database_is_usable() {
        let db = Database::open_in_memory().await.unwrap();
        let count: i64 = db
            .connection()
            .call(|conn| -> Result<i64, rusqlite::Error> {
                conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))
            })
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}

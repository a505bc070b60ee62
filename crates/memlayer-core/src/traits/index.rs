// SPDX-FileCopyrightText: 2026 memlayer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector index trait: the persistent home of memory records.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::MemlayerError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{IndexPatch, MemoryItem, VectorQuery};

/// Storage and similarity search over [`MemoryItem`] records.
///
/// Every query is scoped to exactly one user. Implementations must be safe
/// for concurrent use; the engine serializes mutations per user but reads
/// may happen at any time.
#[async_trait]
pub trait VectorIndex: PluginAdapter {
    /// Stores a new record. Fails with `Conflict` if the id already exists.
    async fn insert(&self, item: MemoryItem) -> Result<(), MemlayerError>;

    /// Fetches a record by id, `None` when absent.
    async fn get(&self, id: &str) -> Result<Option<MemoryItem>, MemlayerError>;

    /// Applies a partial update and returns the updated record.
    ///
    /// `updated_at` is advanced strictly past its previous value; `id`,
    /// `user_id` and `created_at` never change. Fails with `NotFound` if the
    /// id does not exist.
    async fn update(&self, id: &str, patch: IndexPatch) -> Result<MemoryItem, MemlayerError>;

    /// Removes a record. Fails with `NotFound` if the id does not exist.
    async fn delete(&self, id: &str) -> Result<(), MemlayerError>;

    /// Removes every record owned by `user_id`, returning how many went.
    async fn delete_all(&self, user_id: &str) -> Result<usize, MemlayerError>;

    /// Runs a scoped query.
    ///
    /// With a vector: cosine similarity ranking, descending, ties broken by
    /// `updated_at` descending then id. Records scoring below the threshold
    /// are dropped. Without a vector: `created_at` descending, unscored.
    async fn query(&self, query: VectorQuery) -> Result<Vec<MemoryItem>, MemlayerError>;

    /// Removes every record for every user.
    async fn reset(&self) -> Result<(), MemlayerError>;

    /// Takes the write lease on `user_id` for indexes shared between
    /// processes, waiting while another holder's lease is live. A lease
    /// older than `ttl` may be taken over.
    ///
    /// Returns the lease token, or `None` when the index is private to this
    /// process and in-process locking is enough.
    async fn acquire_user_lease(
        &self,
        _user_id: &str,
        _ttl: Duration,
    ) -> Result<Option<String>, MemlayerError> {
        Ok(None)
    }

    /// Gives back a lease from [`acquire_user_lease`](Self::acquire_user_lease).
    /// Does nothing if the lease has since been taken over.
    async fn release_user_lease(&self, _user_id: &str, _token: &str) -> Result<(), MemlayerError> {
        Ok(())
    }
}

// SPDX-FileCopyrightText: 2026 memlayer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-local `VectorIndex` for tests and ephemeral deployments.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use memlayer_core::{
    AdapterType, IndexPatch, MemlayerError, MemoryItem, PluginAdapter, VectorIndex, VectorQuery,
};

use crate::scoring::{rank, recent};
use crate::{apply_patch, validate_item, validate_patch};

/// A `VectorIndex` holding every record in a map behind a tokio `RwLock`.
///
/// Queries scan the caller's records linearly, which is fine for the record
/// counts a single user accumulates.
pub struct InMemoryIndex {
    items: RwLock<HashMap<String, MemoryItem>>,
    dimensions: usize,
}

impl InMemoryIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            dimensions,
        }
    }

    /// Number of records across all users.
    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

#[async_trait]
impl PluginAdapter for InMemoryIndex {
    fn name(&self) -> &str {
        "memory"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::VectorIndex
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn insert(&self, item: MemoryItem) -> Result<(), MemlayerError> {
        validate_item(&item, self.dimensions)?;
        match self.items.write().await.entry(item.id.clone()) {
            Entry::Occupied(_) => Err(MemlayerError::Conflict(format!(
                "memory id {} already exists",
                item.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(MemoryItem { score: None, ..item });
                Ok(())
            }
        }
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryItem>, MemlayerError> {
        Ok(self.items.read().await.get(id).cloned())
    }

    async fn update(&self, id: &str, patch: IndexPatch) -> Result<MemoryItem, MemlayerError> {
        validate_patch(&patch, self.dimensions)?;
        let mut items = self.items.write().await;
        let existing = items
            .remove(id)
            .ok_or_else(|| MemlayerError::NotFound { id: id.to_string() })?;
        let updated = apply_patch(existing, patch);
        items.insert(updated.id.clone(), updated.clone());
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> Result<(), MemlayerError> {
        match self.items.write().await.remove(id) {
            Some(_) => Ok(()),
            None => Err(MemlayerError::NotFound { id: id.to_string() }),
        }
    }

    async fn delete_all(&self, user_id: &str) -> Result<usize, MemlayerError> {
        let mut items = self.items.write().await;
        let before = items.len();
        items.retain(|_, item| item.user_id != user_id);
        let removed = before - items.len();
        info!(user_id, removed, "deleted all memories for user");
        Ok(removed)
    }

    async fn query(&self, query: VectorQuery) -> Result<Vec<MemoryItem>, MemlayerError> {
        let owned: Vec<MemoryItem> = self
            .items
            .read()
            .await
            .values()
            .filter(|item| item.user_id == query.user_id)
            .cloned()
            .collect();
        Ok(match &query.vector {
            Some(vector) => rank(owned, vector, &query.filters, query.threshold, query.limit),
            None => recent(owned, &query.filters, query.limit),
        })
    }

    async fn reset(&self) -> Result<(), MemlayerError> {
        let mut items = self.items.write().await;
        let removed = items.len();
        items.clear();
        info!(removed, "memory index reset");
        Ok(())
    }
}

// SPDX-FileCopyrightText: 2026 memlayer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector index backends for the memlayer memory engine.
//!
//! [`SqliteIndex`] persists records through a single-writer `tokio-rusqlite`
//! connection with embedded migrations; [`InMemoryIndex`] keeps them in a
//! process-local map. Both share the scoring and ordering rules in
//! [`scoring`], so they answer queries identically.

pub mod database;
pub mod memory_index;
pub mod migrations;
pub mod scoring;
pub mod sqlite_index;

pub use database::Database;
pub use memory_index::InMemoryIndex;
pub use sqlite_index::SqliteIndex;

use memlayer_core::types::next_timestamp;
use memlayer_core::{IndexPatch, MemlayerError, MemoryItem};

fn check_dimensions(embedding: &[f32], dimensions: usize) -> Result<(), MemlayerError> {
    if embedding.len() != dimensions {
        return Err(MemlayerError::Validation(format!(
            "embedding has {} dimensions, index expects {dimensions}",
            embedding.len()
        )));
    }
    Ok(())
}

/// Insert-time checks shared by every backend.
pub(crate) fn validate_item(item: &MemoryItem, dimensions: usize) -> Result<(), MemlayerError> {
    if item.user_id.trim().is_empty() {
        return Err(MemlayerError::Validation("user id must not be empty".into()));
    }
    if item.id.trim().is_empty() {
        return Err(MemlayerError::Validation("memory id must not be empty".into()));
    }
    check_dimensions(&item.embedding, dimensions)
}

/// Update-time checks: content changes must bring their embedding along.
pub(crate) fn validate_patch(patch: &IndexPatch, dimensions: usize) -> Result<(), MemlayerError> {
    if patch.content.is_some() && patch.embedding.is_none() {
        return Err(MemlayerError::Validation(
            "a content change must carry the recomputed embedding".into(),
        ));
    }
    match &patch.embedding {
        Some(embedding) => check_dimensions(embedding, dimensions),
        None => Ok(()),
    }
}

/// Merge a validated patch into a stored record and advance `updated_at`.
pub(crate) fn apply_patch(mut item: MemoryItem, patch: IndexPatch) -> MemoryItem {
    if let Some(content) = patch.content {
        item.content = content;
    }
    if let Some(embedding) = patch.embedding {
        item.embedding = embedding;
    }
    if let Some(metadata) = patch.metadata {
        item.metadata.extend(metadata);
    }
    if let Some(memory_type) = patch.memory_type {
        item.memory_type = memory_type;
    }
    item.updated_at = next_timestamp(item.updated_at);
    item.score = None;
    item
}

#[cfg(test)]
mod tests {
    use memlayer_core::{MemoryType, Metadata};
    use serde_json::json;

    use super::*;

    #[test]
    fn patch_without_embedding_for_new_content_is_rejected() {
        let patch = IndexPatch {
            content: Some("new".into()),
            ..IndexPatch::default()
        };
        assert!(matches!(
            validate_patch(&patch, 3),
            Err(MemlayerError::Validation(_))
        ));
    }

    #[test]
    fn wrong_dimensions_are_rejected() {
        let item = MemoryItem::new("u", "x", MemoryType::Factual, Metadata::new(), vec![1.0]);
        assert!(validate_item(&item, 3).is_err());
        assert!(validate_item(&item, 1).is_ok());

        let blank = MemoryItem::new(" ", "x", MemoryType::Factual, Metadata::new(), vec![1.0]);
        assert!(validate_item(&blank, 1).is_err());
    }

    #[test]
    fn apply_patch_merges_metadata_and_bumps_updated_at() {
        let mut metadata = Metadata::new();
        metadata.insert("a".into(), json!(1));
        metadata.insert("b".into(), json!(2));
        let item = MemoryItem::new("u", "old", MemoryType::Factual, metadata, vec![1.0]);
        let before = item.clone();

        let mut patch_meta = Metadata::new();
        patch_meta.insert("b".into(), json!(20));
        patch_meta.insert("c".into(), json!(30));
        let updated = apply_patch(
            item,
            IndexPatch {
                metadata: Some(patch_meta),
                memory_type: Some(MemoryType::Episodic),
                ..IndexPatch::default()
            },
        );

        assert_eq!(updated.content, "old");
        assert_eq!(updated.metadata["a"], json!(1));
        assert_eq!(updated.metadata["b"], json!(20));
        assert_eq!(updated.metadata["c"], json!(30));
        assert_eq!(updated.memory_type, MemoryType::Episodic);
        assert_eq!(updated.id, before.id);
        assert_eq!(updated.created_at, before.created_at);
        assert!(updated.updated_at > before.updated_at);
    }
}

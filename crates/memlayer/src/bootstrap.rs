// SPDX-FileCopyrightText: 2026 memlayer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engine assembly from configuration.

use std::sync::Arc;

use memlayer_config::{MemlayerConfig, StorageBackend};
use memlayer_core::{MemlayerError, VectorIndex};
use memlayer_memory::MemoryEngine;
use memlayer_openai::{OpenAiCompletion, OpenAiEmbedder};
use memlayer_storage::{InMemoryIndex, SqliteIndex};
use tracing::info;

/// Open the configured index and providers and build the engine.
pub async fn build_engine(config: &MemlayerConfig) -> Result<MemoryEngine, MemlayerError> {
    let dimensions = config.embedding.dimensions;
    let index = open_index(config, dimensions).await?;

    let embedder = Arc::new(OpenAiEmbedder::new(&config.embedding)?);
    let completion = Arc::new(OpenAiCompletion::new(&config.llm)?);

    MemoryEngine::builder()
        .config(config.memory.clone())
        .index(index)
        .embedder(embedder)
        .completion(completion, &config.llm.model, config.llm.max_tokens)
        .build()
}

async fn open_index(
    config: &MemlayerConfig,
    dimensions: usize,
) -> Result<Arc<dyn VectorIndex>, MemlayerError> {
    match config.storage.backend {
        StorageBackend::Sqlite => {
            let index = SqliteIndex::from_config(&config.storage, dimensions).await?;
            info!(path = config.storage.database_path.as_str(), "sqlite index opened");
            Ok(Arc::new(index))
        }
        StorageBackend::Memory => {
            info!("in-memory index selected, memories are lost on exit");
            Ok(Arc::new(InMemoryIndex::new(dimensions)))
        }
    }
}

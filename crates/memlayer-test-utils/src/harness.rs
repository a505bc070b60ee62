// SPDX-FileCopyrightText: 2026 memlayer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end engine tests.
//!
//! `TestHarness` assembles a complete `MemoryEngine` from deterministic
//! doubles: a [`HashEmbedder`], a [`ScriptedExtractor`] and, unless another
//! decider is supplied, a [`ScriptedDecider`]. The index is in-memory by
//! default or SQLite in a temp directory.

use std::sync::Arc;

use memlayer_config::model::MemoryConfig;
use memlayer_core::{
    DecisionAdapter, EmbeddingAdapter, MemlayerError, MemoryItem, Message, VectorIndex,
};
use memlayer_memory::{AddRequest, AddSummary, ListRequest, MemoryEngine, SearchRequest};
use memlayer_storage::{InMemoryIndex, SqliteIndex};

use crate::embedder::HashEmbedder;
use crate::scripted::{ScriptedDecider, ScriptedExtractor};

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    config: MemoryConfig,
    sqlite: bool,
    embedder: Option<Arc<dyn EmbeddingAdapter>>,
    decider: Option<Arc<dyn DecisionAdapter>>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            config: MemoryConfig::default(),
            sqlite: false,
            embedder: None,
            decider: None,
        }
    }

    /// Replace the engine's memory configuration.
    pub fn with_config(mut self, config: MemoryConfig) -> Self {
        self.config = config;
        self
    }

    /// Store memories in a SQLite database in a temp directory.
    pub fn with_sqlite(mut self) -> Self {
        self.sqlite = true;
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingAdapter>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Use `decider` instead of the harness's scripted decider.
    pub fn with_decider(mut self, decider: Arc<dyn DecisionAdapter>) -> Self {
        self.decider = Some(decider);
        self
    }

    /// Build the harness and its engine.
    pub async fn build(self) -> Result<TestHarness, MemlayerError> {
        let embedder = self
            .embedder
            .unwrap_or_else(|| Arc::new(HashEmbedder::default()));
        let dimensions = embedder.dimensions();

        let (index, temp_dir) = if self.sqlite {
            let temp_dir = tempfile::TempDir::new().map_err(MemlayerError::storage)?;
            let index: Arc<dyn VectorIndex> = Arc::new(
                SqliteIndex::open(temp_dir.path().join("memlayer.db"), true, dimensions).await?,
            );
            (index, Some(temp_dir))
        } else {
            let index: Arc<dyn VectorIndex> = Arc::new(InMemoryIndex::new(dimensions));
            (index, None)
        };

        let extractor = Arc::new(ScriptedExtractor::new());
        let decider = Arc::new(ScriptedDecider::new());
        let engine = MemoryEngine::builder()
            .config(self.config)
            .index(index.clone())
            .embedder(embedder)
            .extractor(extractor.clone())
            .decider(self.decider.unwrap_or_else(|| decider.clone()))
            .build()?;

        Ok(TestHarness {
            engine,
            index,
            extractor,
            decider,
            _temp_dir: temp_dir,
        })
    }
}

/// A memory engine wired to deterministic doubles.
pub struct TestHarness {
    pub engine: MemoryEngine,
    /// The raw index beneath the engine, for direct assertions.
    pub index: Arc<dyn VectorIndex>,
    pub extractor: Arc<ScriptedExtractor>,
    /// Scripted decider, used unless the builder was given another.
    pub decider: Arc<ScriptedDecider>,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: Option<tempfile::TempDir>,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Harness with default configuration and an in-memory index.
    pub async fn new() -> Result<Self, MemlayerError> {
        Self::builder().build().await
    }

    /// Store `content` verbatim for `user_id`.
    pub async fn remember(&self, user_id: &str, content: &str) -> Result<AddSummary, MemlayerError> {
        self.engine.add(AddRequest::literal(user_id, content)).await
    }

    /// Run extraction over a single user message.
    pub async fn say(&self, user_id: &str, text: &str) -> Result<AddSummary, MemlayerError> {
        self.engine
            .add(AddRequest::new(user_id, vec![Message::user(text)]))
            .await
    }

    pub async fn search(&self, user_id: &str, query: &str) -> Result<Vec<MemoryItem>, MemlayerError> {
        self.engine.search(SearchRequest::new(user_id, query)).await
    }

    pub async fn all(&self, user_id: &str) -> Result<Vec<MemoryItem>, MemlayerError> {
        self.engine.get_all(ListRequest::new(user_id)).await
    }

    /// Contents of a user's memories, sorted.
    pub async fn contents(&self, user_id: &str) -> Result<Vec<String>, MemlayerError> {
        let mut contents: Vec<String> = self
            .all(user_id)
            .await?
            .into_iter()
            .map(|item| item.content)
            .collect();
        contents.sort();
        Ok(contents)
    }
}

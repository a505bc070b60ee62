// SPDX-FileCopyrightText: 2026 memlayer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic embedders.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use memlayer_core::{
    AdapterType, EmbeddingAdapter, EmbeddingInput, EmbeddingOutput, MemlayerError, PluginAdapter,
};

pub const DEFAULT_DIMENSIONS: usize = 256;

/// Bag-of-words embedder: each lowercase alphanumeric token is hashed
/// (FNV-1a) into a bucket, and the counts are L2-normalized.
///
/// Identical texts embed identically; texts sharing words score higher than
/// texts that do not.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let bucket = fnv1a(&token.to_lowercase()) as usize % self.dimensions;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

fn fnv1a(text: &str) -> u64 {
    text.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

#[async_trait]
impl PluginAdapter for HashEmbedder {
    fn name(&self) -> &str {
        "hash-embedder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }
}

#[async_trait]
impl EmbeddingAdapter for HashEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, MemlayerError> {
        Ok(EmbeddingOutput {
            embeddings: input.texts.iter().map(|t| self.embed_text(t)).collect(),
            dimensions: self.dimensions,
        })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// [`HashEmbedder`] whose first `slow_calls` calls hang for `delay`.
#[derive(Debug)]
pub struct SlowEmbedder {
    inner: HashEmbedder,
    slow_calls: usize,
    delay: Duration,
    calls: AtomicUsize,
}

impl SlowEmbedder {
    pub fn new(slow_calls: usize, delay: Duration) -> Self {
        Self {
            inner: HashEmbedder::default(),
            slow_calls,
            delay,
            calls: AtomicUsize::new(0),
        }
    }

    /// Calls received so far, including slow ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PluginAdapter for SlowEmbedder {
    fn name(&self) -> &str {
        "slow-embedder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }
}

#[async_trait]
impl EmbeddingAdapter for SlowEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, MemlayerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.slow_calls {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.embed(input).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions
    }
}

/// Embedder whose every call fails with a provider error.
#[derive(Debug, Default)]
pub struct FailingEmbedder {
    calls: AtomicUsize,
}

impl FailingEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PluginAdapter for FailingEmbedder {
    fn name(&self) -> &str {
        "failing-embedder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }
}

#[async_trait]
impl EmbeddingAdapter for FailingEmbedder {
    async fn embed(&self, _input: EmbeddingInput) -> Result<EmbeddingOutput, MemlayerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(MemlayerError::provider("embedding service unavailable"))
    }

    fn dimensions(&self) -> usize {
        DEFAULT_DIMENSIONS
    }
}

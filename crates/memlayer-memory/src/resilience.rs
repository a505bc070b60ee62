// SPDX-FileCopyrightText: 2026 memlayer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Time limits for provider and index calls, and bounded retry for embeddings.
//!
//! Only embedding calls are retried, and only when they time out. Everything
//! else surfaces its first error.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use memlayer_core::{
    AdapterType, EmbeddingAdapter, EmbeddingInput, HealthStatus, IndexPatch, MemlayerError,
    MemoryItem, PluginAdapter, VectorIndex, VectorQuery,
};

use crate::recording;

/// Run `fut`, converting an elapsed deadline into [`MemlayerError::Timeout`].
pub async fn with_timeout<T, F>(
    operation: &str,
    duration: Duration,
    fut: F,
) -> Result<T, MemlayerError>
where
    F: Future<Output = Result<T, MemlayerError>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_elapsed) => {
            warn!(
                operation,
                timeout_ms = duration.as_millis() as u64,
                "operation timed out"
            );
            Err(MemlayerError::Timeout {
                operation: operation.to_string(),
                duration,
            })
        }
    }
}

/// Exponential backoff for timed-out embedding calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (zero-based).
    pub fn delay(&self, retry: u32) -> Duration {
        self.backoff.saturating_mul(2u32.saturating_pow(retry))
    }
}

/// Embedding adapter wrapper adding a deadline, timeout retries and output checks.
pub struct ResilientEmbedder {
    inner: Arc<dyn EmbeddingAdapter>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl ResilientEmbedder {
    pub fn new(inner: Arc<dyn EmbeddingAdapter>, timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            inner,
            timeout,
            retry,
        }
    }

    /// Dimensionality every returned vector is checked against.
    pub fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    /// Embed several texts in one provider call, preserving order.
    pub async fn embed_many(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, MemlayerError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let expected = texts.len();
        let mut retry = 0;
        loop {
            let input = EmbeddingInput {
                texts: texts.clone(),
            };
            match with_timeout("embedding", self.timeout, self.inner.embed(input)).await {
                Err(e) if e.is_timeout() && retry < self.retry.max_retries => {
                    let delay = self.retry.delay(retry);
                    retry += 1;
                    recording::record_embedding_retry();
                    warn!(
                        retry,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "embedding timed out, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
                Ok(output) => return self.check(output.embeddings, expected),
            }
        }
    }

    /// Embed a single text.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, MemlayerError> {
        self.embed_many(vec![text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| MemlayerError::provider("embedding provider returned no vectors"))
    }

    fn check(
        &self,
        embeddings: Vec<Vec<f32>>,
        expected: usize,
    ) -> Result<Vec<Vec<f32>>, MemlayerError> {
        if embeddings.len() != expected {
            return Err(MemlayerError::provider(format!(
                "embedding provider returned {} vectors for {expected} texts",
                embeddings.len()
            )));
        }
        let dimensions = self.dimensions();
        if let Some(bad) = embeddings.iter().find(|v| v.len() != dimensions) {
            return Err(MemlayerError::provider(format!(
                "embedding provider returned a {}-dimensional vector, expected {dimensions}",
                bad.len()
            )));
        }
        Ok(embeddings)
    }
}

/// `VectorIndex` decorator bounding every call by one deadline.
///
/// A mutation that times out may still complete in the backend; callers
/// only learn that it did not finish in time.
pub struct TimeoutIndex {
    inner: Arc<dyn VectorIndex>,
    timeout: Duration,
}

impl TimeoutIndex {
    pub fn new(inner: Arc<dyn VectorIndex>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl PluginAdapter for TimeoutIndex {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn version(&self) -> semver::Version {
        self.inner.version()
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::VectorIndex
    }

    async fn health_check(&self) -> Result<HealthStatus, MemlayerError> {
        with_timeout("index.health_check", self.timeout, self.inner.health_check()).await
    }
}

#[async_trait]
impl VectorIndex for TimeoutIndex {
    async fn insert(&self, item: MemoryItem) -> Result<(), MemlayerError> {
        with_timeout("index.insert", self.timeout, self.inner.insert(item)).await
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryItem>, MemlayerError> {
        with_timeout("index.get", self.timeout, self.inner.get(id)).await
    }

    async fn update(&self, id: &str, patch: IndexPatch) -> Result<MemoryItem, MemlayerError> {
        with_timeout("index.update", self.timeout, self.inner.update(id, patch)).await
    }

    async fn delete(&self, id: &str) -> Result<(), MemlayerError> {
        with_timeout("index.delete", self.timeout, self.inner.delete(id)).await
    }

    async fn delete_all(&self, user_id: &str) -> Result<usize, MemlayerError> {
        with_timeout("index.delete_all", self.timeout, self.inner.delete_all(user_id)).await
    }

    async fn query(&self, query: VectorQuery) -> Result<Vec<MemoryItem>, MemlayerError> {
        with_timeout("index.query", self.timeout, self.inner.query(query)).await
    }

    async fn reset(&self) -> Result<(), MemlayerError> {
        with_timeout("index.reset", self.timeout, self.inner.reset()).await
    }

    // Waiting for a lease is bounded by its ttl, not the call timeout.
    async fn acquire_user_lease(
        &self,
        user_id: &str,
        ttl: Duration,
    ) -> Result<Option<String>, MemlayerError> {
        self.inner.acquire_user_lease(user_id, ttl).await
    }

    async fn release_user_lease(&self, user_id: &str, token: &str) -> Result<(), MemlayerError> {
        with_timeout(
            "index.release_user_lease",
            self.timeout,
            self.inner.release_user_lease(user_id, token),
        )
        .await
    }
}

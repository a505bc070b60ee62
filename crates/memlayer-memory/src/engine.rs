// SPDX-FileCopyrightText: 2026 memlayer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The memory engine facade.
//!
//! [`MemoryEngine`] validates requests, runs extraction, serializes
//! mutations per user and delegates storage to a [`VectorIndex`]. Reads take
//! no lock.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use memlayer_config::DecisionStrategy;
use memlayer_config::model::MemoryConfig;
use memlayer_core::{
    CompletionAdapter, DecisionAdapter, EmbeddingAdapter, ExtractionAdapter, HealthStatus,
    MemlayerError, MemoryItem, Message, Metadata, VectorIndex, VectorQuery,
};

use crate::decider::{LlmDecider, SimilarityDecider};
use crate::extractor::LlmExtractor;
use crate::locks::UserLocks;
use crate::reconciler::{PendingFact, ReconcileSettings, Reconciler};
use crate::resilience::{ResilientEmbedder, RetryPolicy, TimeoutIndex, with_timeout};
use crate::types::{AddRequest, AddSummary, ListRequest, MemoryUpdate, SearchRequest};

/// Long-term memory for many users over one vector index.
pub struct MemoryEngine {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<ResilientEmbedder>,
    extractor: Arc<dyn ExtractionAdapter>,
    reconciler: Reconciler,
    locks: UserLocks,
    config: MemoryConfig,
}

impl MemoryEngine {
    pub fn builder() -> MemoryEngineBuilder {
        MemoryEngineBuilder::default()
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Remember what a conversation says about a user.
    ///
    /// With `infer` the messages go through the extractor; without it their
    /// non-empty contents, newline-joined, form one literal fact. Each fact is
    /// reconciled against the user's existing memories while the user's lock
    /// is held.
    pub async fn add(&self, request: AddRequest) -> Result<AddSummary, MemlayerError> {
        require_non_blank("userId", &request.user_id)?;
        if request.messages.is_empty() {
            return Err(MemlayerError::Validation(
                "messages must not be empty".to_string(),
            ));
        }

        let facts = if request.infer {
            let extracted = with_timeout(
                "extraction",
                Duration::from_millis(self.config.extraction_timeout_ms),
                self.extractor.extract(&request.messages),
            )
            .await?;
            extracted
                .into_iter()
                .map(|fact| PendingFact {
                    content: fact.content,
                    metadata: merge_metadata(fact.metadata, &request.metadata),
                })
                .collect()
        } else {
            let content = literal_content(&request.messages);
            if content.is_empty() {
                return Err(MemlayerError::Validation(
                    "message content must not be blank".to_string(),
                ));
            }
            vec![PendingFact {
                content,
                metadata: request.metadata.clone(),
            }]
        };

        let facts = normalize_facts(facts);
        if facts.is_empty() {
            debug!(user_id = %request.user_id, "nothing to remember");
            return Ok(AddSummary::default());
        }

        self.exclusive(
            &request.user_id,
            self.reconciler.reconcile(&request.user_id, facts, request.memory_type),
        )
        .await
    }

    /// Memories of a user ranked by similarity to `query`.
    pub async fn search(&self, request: SearchRequest) -> Result<Vec<MemoryItem>, MemlayerError> {
        require_non_blank("userId", &request.user_id)?;
        require_non_blank("query", &request.query)?;
        let limit = require_limit(request.limit.unwrap_or(self.config.default_search_limit))?;
        if let Some(threshold) = request.threshold
            && !threshold.is_finite()
        {
            return Err(MemlayerError::Validation(format!(
                "threshold must be a finite number, got {threshold}"
            )));
        }

        let vector = self.embedder.embed_one(&request.query).await?;
        let query = VectorQuery::similar(request.user_id, vector, limit)
            .with_filters(request.filters)
            .with_threshold(request.threshold);
        self.index.query(query).await
    }

    /// A user's memories, newest first.
    pub async fn get_all(&self, request: ListRequest) -> Result<Vec<MemoryItem>, MemlayerError> {
        require_non_blank("userId", &request.user_id)?;
        let limit = require_limit(request.limit.unwrap_or(self.config.default_list_limit))?;
        let query = VectorQuery::recent(request.user_id, limit).with_filters(request.filters);
        self.index.query(query).await
    }

    pub async fn get(&self, id: &str) -> Result<MemoryItem, MemlayerError> {
        require_non_blank("id", id)?;
        self.index
            .get(id)
            .await?
            .ok_or_else(|| MemlayerError::NotFound { id: id.to_string() })
    }

    /// Change the mutable fields of one memory. New content is re-embedded.
    pub async fn update(&self, id: &str, update: MemoryUpdate) -> Result<MemoryItem, MemlayerError> {
        require_non_blank("id", id)?;
        if update.is_empty() {
            return Err(MemlayerError::Validation(
                "update must change content, metadata or memoryType".to_string(),
            ));
        }
        if let Some(content) = &update.content {
            require_non_blank("content", content)?;
        }

        let existing = self.get(id).await?;
        let updated = self
            .exclusive(&existing.user_id, async {
                let embedding = match &update.content {
                    Some(content) => Some(self.embedder.embed_one(content).await?),
                    None => None,
                };
                self.index.update(id, update.into_patch(embedding)).await
            })
            .await?;
        info!(user_id = %updated.user_id, memory_id = %id, "memory updated");
        Ok(updated)
    }

    pub async fn delete(&self, id: &str) -> Result<(), MemlayerError> {
        require_non_blank("id", id)?;
        let existing = self.get(id).await?;
        self.exclusive(&existing.user_id, self.index.delete(id)).await?;
        info!(user_id = %existing.user_id, memory_id = %id, "memory deleted");
        Ok(())
    }

    /// Remove every memory of one user, returning how many were removed.
    pub async fn delete_all(&self, user_id: &str) -> Result<usize, MemlayerError> {
        require_non_blank("userId", user_id)?;
        let removed = self
            .exclusive(user_id, self.index.delete_all(user_id))
            .await?;
        info!(user_id, removed, "all memories of user deleted");
        Ok(removed)
    }

    /// Remove every memory of every user.
    pub async fn reset(&self) -> Result<(), MemlayerError> {
        self.index.reset().await?;
        info!("memory index reset");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<HealthStatus, MemlayerError> {
        self.index.health_check().await
    }

    /// Run a mutation of `user_id`'s memories under the in-process lock and,
    /// for indexes shared with other processes, the user's write lease.
    async fn exclusive<T, F>(&self, user_id: &str, mutation: F) -> Result<T, MemlayerError>
    where
        F: Future<Output = Result<T, MemlayerError>>,
    {
        let _guard = self.locks.lock(user_id).await;
        let ttl = Duration::from_millis(self.config.user_lease_ttl_ms);
        let lease = self.index.acquire_user_lease(user_id, ttl).await?;

        let result = mutation.await;

        if let Some(token) = lease
            && let Err(e) = self.index.release_user_lease(user_id, &token).await
        {
            warn!(user_id, error = %e, "failed to release user lease, it will expire");
        }
        result
    }
}

fn require_non_blank(field: &str, value: &str) -> Result<(), MemlayerError> {
    if value.trim().is_empty() {
        return Err(MemlayerError::Validation(format!(
            "{field} must not be blank"
        )));
    }
    Ok(())
}

fn require_limit(limit: usize) -> Result<usize, MemlayerError> {
    if limit == 0 {
        return Err(MemlayerError::Validation(
            "limit must be greater than 0".to_string(),
        ));
    }
    Ok(limit)
}

/// Request metadata over extractor metadata; request keys win.
fn merge_metadata(mut extracted: Metadata, request: &Metadata) -> Metadata {
    extracted.extend(request.iter().map(|(k, v)| (k.clone(), v.clone())));
    extracted
}

fn literal_content(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| m.content.trim())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Trim facts, drop blank ones and collapse duplicates that differ only in
/// case or whitespace. The first occurrence wins.
fn normalize_facts(facts: Vec<PendingFact>) -> Vec<PendingFact> {
    let mut seen = HashSet::new();
    facts
        .into_iter()
        .filter_map(|mut fact| {
            fact.content = fact.content.trim().to_string();
            if fact.content.is_empty() {
                return None;
            }
            let key = fact
                .content
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase();
            seen.insert(key).then_some(fact)
        })
        .collect()
}

/// Assembles a [`MemoryEngine`] from its adapters.
///
/// An index and an embedder are required. The extractor and decider may be
/// given directly or derived from a completion adapter; with
/// `decision = "similarity"` no completion adapter is needed for decisions.
#[derive(Default)]
pub struct MemoryEngineBuilder {
    config: MemoryConfig,
    index: Option<Arc<dyn VectorIndex>>,
    embedder: Option<Arc<dyn EmbeddingAdapter>>,
    extractor: Option<Arc<dyn ExtractionAdapter>>,
    decider: Option<Arc<dyn DecisionAdapter>>,
    completion: Option<CompletionSettings>,
}

struct CompletionSettings {
    adapter: Arc<dyn CompletionAdapter>,
    model: String,
    max_tokens: u32,
}

impl MemoryEngineBuilder {
    pub fn config(mut self, config: MemoryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingAdapter>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn ExtractionAdapter>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn decider(mut self, decider: Arc<dyn DecisionAdapter>) -> Self {
        self.decider = Some(decider);
        self
    }

    /// Chat model backing the LLM extractor and decider when those are not
    /// set explicitly.
    pub fn completion(
        mut self,
        adapter: Arc<dyn CompletionAdapter>,
        model: impl Into<String>,
        max_tokens: u32,
    ) -> Self {
        self.completion = Some(CompletionSettings {
            adapter,
            model: model.into(),
            max_tokens,
        });
        self
    }

    pub fn build(self) -> Result<MemoryEngine, MemlayerError> {
        let config = self.config;
        let index = self
            .index
            .ok_or_else(|| MemlayerError::Config("memory engine needs a vector index".to_string()))?;
        let embedder = self
            .embedder
            .ok_or_else(|| MemlayerError::Config("memory engine needs an embedder".to_string()))?;
        if embedder.dimensions() == 0 {
            return Err(MemlayerError::Config(format!(
                "embedder {} declares zero dimensions",
                embedder.name()
            )));
        }

        let extractor: Arc<dyn ExtractionAdapter> = match (self.extractor, &self.completion) {
            (Some(extractor), _) => extractor,
            (None, Some(c)) => Arc::new(LlmExtractor::new(c.adapter.clone(), c.model.clone(), c.max_tokens)),
            (None, None) => {
                return Err(MemlayerError::Config(
                    "memory engine needs an extractor or a completion adapter".to_string(),
                ));
            }
        };

        let decider: Arc<dyn DecisionAdapter> = match (self.decider, config.decision, &self.completion) {
            (Some(decider), _, _) => decider,
            (None, DecisionStrategy::Similarity, _) => Arc::new(SimilarityDecider::new(
                config.dedup_threshold,
                config.update_threshold,
            )),
            (None, DecisionStrategy::Llm, Some(c)) => {
                Arc::new(LlmDecider::new(c.adapter.clone(), c.model.clone(), c.max_tokens))
            }
            (None, DecisionStrategy::Llm, None) => {
                return Err(MemlayerError::Config(
                    "decision = \"llm\" needs a completion adapter".to_string(),
                ));
            }
        };

        let index: Arc<dyn VectorIndex> = Arc::new(TimeoutIndex::new(
            index,
            Duration::from_millis(config.index_timeout_ms),
        ));
        let embedder = Arc::new(ResilientEmbedder::new(
            embedder,
            Duration::from_millis(config.embedding_timeout_ms),
            RetryPolicy {
                max_retries: config.embedding_max_retries,
                backoff: Duration::from_millis(config.retry_backoff_ms),
            },
        ));
        let reconciler = Reconciler::new(
            index.clone(),
            embedder.clone(),
            decider.clone(),
            ReconcileSettings {
                top_k: config.top_k,
                mode: config.reconcile_mode,
                append_only_types: config.append_only_types.clone(),
                decision_timeout: Duration::from_millis(config.decision_timeout_ms),
            },
        );

        info!(
            index = index.name(),
            extractor = extractor.name(),
            decider = decider.name(),
            mode = %config.reconcile_mode,
            "memory engine ready"
        );
        Ok(MemoryEngine {
            index,
            embedder,
            extractor,
            reconciler,
            locks: UserLocks::new(),
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn fact(content: &str) -> PendingFact {
        PendingFact {
            content: content.to_string(),
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn normalize_drops_blank_and_duplicate_facts() {
        let facts = normalize_facts(vec![
            fact("  User likes tea "),
            fact("   "),
            fact("user   LIKES tea"),
            fact("User lives in Berlin"),
        ]);
        let contents: Vec<&str> = facts.iter().map(|f| f.content.as_str()).collect();
        assert_eq!(contents, vec!["User likes tea", "User lives in Berlin"]);
    }

    #[test]
    fn literal_content_joins_non_empty_messages() {
        let messages = vec![
            Message::user("I live in Berlin"),
            Message::assistant("  "),
            Message::assistant(" Noted. "),
        ];
        assert_eq!(literal_content(&messages), "I live in Berlin\nNoted.");
        assert_eq!(literal_content(&[Message::user(" ")]), "");
    }

    #[test]
    fn request_metadata_wins() {
        let mut extracted = Metadata::new();
        extracted.insert("category".into(), json!("personal"));
        extracted.insert("source".into(), json!("extractor"));
        let mut request = Metadata::new();
        request.insert("source".into(), json!("chat"));

        let merged = merge_metadata(extracted, &request);
        assert_eq!(merged["category"], "personal");
        assert_eq!(merged["source"], "chat");
    }

    #[test]
    fn limits_and_blank_fields_are_validated() {
        assert!(require_limit(0).is_err());
        assert_eq!(require_limit(3).unwrap(), 3);
        assert!(matches!(
            require_non_blank("userId", " \t"),
            Err(MemlayerError::Validation(msg)) if msg.contains("userId")
        ));
    }

    #[test]
    fn builder_requires_index_and_embedder() {
        let err = MemoryEngine::builder().build().err().unwrap();
        assert!(matches!(err, MemlayerError::Config(_)));
    }
}

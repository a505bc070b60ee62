// SPDX-FileCopyrightText: 2026 memlayer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across adapter traits and the memory engine.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Free-form metadata attached to a memory. Key order is irrelevant.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Metadata equality filters applied by index queries.
pub type Filters = BTreeMap<String, serde_json::Value>;

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter plugged into the engine.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Embedding,
    Extraction,
    Decision,
    Completion,
    VectorIndex,
}

// --- Conversation input ---

/// Speaker of a conversation message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Role {
    User,
    Assistant,
    System,
}

/// A single conversation message handed to `add`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

// --- Memory records ---

/// Kind of memory. Affects retention and extraction heuristics only.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum MemoryType {
    /// Stable facts about the user ("lives in Berlin").
    #[default]
    #[serde(alias = "factual")]
    Factual,
    /// Things that happened at a point in time.
    #[serde(alias = "episodic")]
    Episodic,
    /// General knowledge and concepts.
    #[serde(alias = "semantic")]
    Semantic,
    /// How-to knowledge and user workflows.
    #[serde(alias = "procedural")]
    Procedural,
    /// Short-lived scratch context.
    #[serde(alias = "working")]
    Working,
}

/// A stored memory record.
///
/// Values handed out by the engine are owned snapshots; mutating them never
/// touches the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryItem {
    /// Opaque unique identifier, immutable once assigned.
    pub id: String,
    /// The fact text.
    pub content: String,
    /// Owner of this memory. Never empty.
    pub user_id: String,
    pub memory_type: MemoryType,
    #[serde(default)]
    pub metadata: Metadata,
    /// Embedding of `content`; dimensionality fixed per index.
    #[serde(default, skip_serializing)]
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Similarity to the query. Only set on search results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl MemoryItem {
    /// Build a fresh record with a new v4 id and matching timestamps.
    pub fn new(
        user_id: impl Into<String>,
        content: impl Into<String>,
        memory_type: MemoryType,
        metadata: Metadata,
        embedding: Vec<f32>,
    ) -> Self {
        let now = now_micros();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            user_id: user_id.into(),
            memory_type,
            metadata,
            embedding,
            created_at: now,
            updated_at: now,
            score: None,
        }
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }
}

/// Partial update applied by `VectorIndex::update`.
///
/// A patch that changes `content` must carry the recomputed `embedding`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexPatch {
    pub content: Option<String>,
    pub embedding: Option<Vec<f32>>,
    /// Merged key-by-key over the stored metadata.
    pub metadata: Option<Metadata>,
    pub memory_type: Option<MemoryType>,
}

impl IndexPatch {
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.embedding.is_none()
            && self.metadata.is_none()
            && self.memory_type.is_none()
    }
}

/// A scoped index query.
///
/// With a vector the results are ranked by cosine similarity; without one they
/// are ordered by `created_at` descending and carry no score.
#[derive(Debug, Clone, Default)]
pub struct VectorQuery {
    pub user_id: String,
    pub vector: Option<Vec<f32>>,
    pub filters: Filters,
    pub limit: usize,
    pub threshold: Option<f32>,
}

impl VectorQuery {
    pub fn similar(user_id: impl Into<String>, vector: Vec<f32>, limit: usize) -> Self {
        Self {
            user_id: user_id.into(),
            vector: Some(vector),
            filters: Filters::new(),
            limit,
            threshold: None,
        }
    }

    pub fn recent(user_id: impl Into<String>, limit: usize) -> Self {
        Self {
            user_id: user_id.into(),
            vector: None,
            filters: Filters::new(),
            limit,
            threshold: None,
        }
    }

    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_threshold(mut self, threshold: Option<f32>) -> Self {
        self.threshold = threshold;
        self
    }
}

// --- Extraction and reconciliation ---

/// A fact extracted from conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFact {
    /// The fact as a standalone statement.
    pub content: String,
    /// Structured metadata supplied by the extractor.
    #[serde(default)]
    pub metadata: Metadata,
}

impl ExtractedFact {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: Metadata::new(),
        }
    }
}

/// An existing memory offered to the decision step.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub content: String,
    /// Cosine similarity between the candidate and the new fact.
    pub score: f32,
}

/// Outcome of the decision step for one fact.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// The fact is novel.
    Add,
    /// The fact refines an existing memory. `content` is the merged text;
    /// `None` means the fact text replaces the old content.
    Update {
        target_id: String,
        content: Option<String>,
    },
    /// The fact invalidates an existing memory. The fact itself is not stored.
    Delete { target_id: String },
    /// The fact duplicates an existing memory.
    Noop,
}

impl Decision {
    pub fn action(&self) -> MemoryAction {
        match self {
            Decision::Add => MemoryAction::Add,
            Decision::Update { .. } => MemoryAction::Update,
            Decision::Delete { .. } => MemoryAction::Delete,
            Decision::Noop => MemoryAction::Noop,
        }
    }

    pub fn target_id(&self) -> Option<&str> {
        match self {
            Decision::Update { target_id, .. } | Decision::Delete { target_id } => {
                Some(target_id)
            }
            Decision::Add | Decision::Noop => None,
        }
    }
}

/// Store mutation taken for a fact.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum MemoryAction {
    Add,
    Update,
    Delete,
    Noop,
}

impl MemoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryAction::Add => "ADD",
            MemoryAction::Update => "UPDATE",
            MemoryAction::Delete => "DELETE",
            MemoryAction::Noop => "NOOP",
        }
    }
}

// --- Embedding ---

/// Input for an embedding adapter.
#[derive(Debug, Clone)]
pub struct EmbeddingInput {
    pub texts: Vec<String>,
}

/// Output from an embedding adapter, one vector per input text.
#[derive(Debug, Clone)]
pub struct EmbeddingOutput {
    pub embeddings: Vec<Vec<f32>>,
    pub dimensions: usize,
}

// --- Completion ---

/// A single-shot request to a chat completion model.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system_prompt: Option<String>,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

/// Token usage reported by a completion call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A full response from a chat completion model.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    pub usage: Option<TokenUsage>,
}

// --- Timestamps ---

/// Current time truncated to microseconds, the precision the index persists.
pub fn now_micros() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Next `updated_at` for a record last touched at `previous`.
///
/// Strictly later than `previous` even when the wall clock has not advanced.
pub fn next_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = now_micros();
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn memory_type_parses_any_case() {
        assert_eq!(MemoryType::from_str("episodic").unwrap(), MemoryType::Episodic);
        assert_eq!(MemoryType::from_str("PROCEDURAL").unwrap(), MemoryType::Procedural);
        assert_eq!(MemoryType::from_str("Working").unwrap(), MemoryType::Working);
        assert!(MemoryType::from_str("dream").is_err());
        assert_eq!(MemoryType::default(), MemoryType::Factual);
        assert_eq!(MemoryType::Semantic.to_string(), "SEMANTIC");
    }

    #[test]
    fn memory_type_serde_accepts_lowercase_alias() {
        let parsed: MemoryType = serde_json::from_str("\"factual\"").unwrap();
        assert_eq!(parsed, MemoryType::Factual);
        let json = serde_json::to_string(&MemoryType::Episodic).unwrap();
        assert_eq!(json, "\"EPISODIC\"");
    }

    #[test]
    fn role_round_trips() {
        let msg: Message = serde_json::from_str(r#"{"role":"assistant","content":"hi"}"#).unwrap();
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(Role::from_str("USER").unwrap(), Role::User);
    }

    #[test]
    fn memory_item_serializes_camel_case_without_embedding() {
        let item = MemoryItem::new("alice", "Likes tea", MemoryType::Factual, Metadata::new(), vec![0.5; 4]);
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["userId"], "alice");
        assert_eq!(json["memoryType"], "FACTUAL");
        assert!(json.get("embedding").is_none());
        assert!(json.get("score").is_none(), "score only appears on search results");

        let scored = item.with_score(0.75);
        let json = serde_json::to_value(&scored).unwrap();
        assert!((json["score"].as_f64().unwrap() - 0.75).abs() < 1e-6);
    }

    #[test]
    fn new_items_get_unique_ids_and_equal_timestamps() {
        let a = MemoryItem::new("u", "a", MemoryType::Factual, Metadata::new(), vec![]);
        let b = MemoryItem::new("u", "b", MemoryType::Factual, Metadata::new(), vec![]);
        assert_ne!(a.id, b.id);
        assert_eq!(a.created_at, a.updated_at);
    }

    #[test]
    fn next_timestamp_is_strictly_later() {
        let future = Utc::now() + Duration::seconds(60);
        let next = next_timestamp(future);
        assert!(next > future);

        let past = Utc::now() - Duration::seconds(60);
        assert!(next_timestamp(past) > past);
    }

    #[test]
    fn decision_exposes_action_and_target() {
        let update = Decision::Update {
            target_id: "m1".into(),
            content: None,
        };
        assert_eq!(update.action(), MemoryAction::Update);
        assert_eq!(update.target_id(), Some("m1"));
        assert_eq!(Decision::Noop.target_id(), None);
        assert_eq!(MemoryAction::Noop.as_str(), "NOOP");
        assert_eq!(MemoryAction::from_str("delete").unwrap(), MemoryAction::Delete);
    }

    #[test]
    fn empty_patch_detection() {
        assert!(IndexPatch::default().is_empty());
        let patch = IndexPatch {
            memory_type: Some(MemoryType::Working),
            ..IndexPatch::default()
        };
        assert!(!patch.is_empty());
    }
}

// SPDX-FileCopyrightText: 2026 memlayer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request and result types of the memory engine operations.

use serde::{Deserialize, Serialize};

use memlayer_core::{Filters, IndexPatch, MemlayerError, MemoryAction, MemoryType, Message, Metadata};

/// Input to [`crate::MemoryEngine::add`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddRequest {
    pub messages: Vec<Message>,
    pub user_id: String,
    /// Merged over extracted metadata on every stored record; request keys win.
    #[serde(default)]
    pub metadata: Metadata,
    /// `false` stores the message text literally instead of extracting facts.
    #[serde(default = "default_infer")]
    pub infer: bool,
    #[serde(default)]
    pub memory_type: MemoryType,
}

fn default_infer() -> bool {
    true
}

impl AddRequest {
    pub fn new(user_id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            messages,
            user_id: user_id.into(),
            metadata: Metadata::new(),
            infer: true,
            memory_type: MemoryType::default(),
        }
    }

    /// A request that stores `content` verbatim as one fact.
    pub fn literal(user_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(user_id, vec![Message::user(content)]).with_infer(false)
    }

    pub fn with_infer(mut self, infer: bool) -> Self {
        self.infer = infer;
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_memory_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_type = memory_type;
        self
    }
}

/// Input to [`crate::MemoryEngine::search`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,
    pub user_id: String,
    #[serde(default)]
    pub filters: Filters,
    /// Defaults to `memory.default_search_limit` when absent.
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub threshold: Option<f32>,
}

impl SearchRequest {
    pub fn new(user_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            user_id: user_id.into(),
            filters: Filters::new(),
            limit: None,
            threshold: None,
        }
    }

    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }
}

/// Input to [`crate::MemoryEngine::get_all`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRequest {
    pub user_id: String,
    #[serde(default)]
    pub filters: Filters,
    /// Defaults to `memory.default_list_limit` when absent.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl ListRequest {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            filters: Filters::new(),
            limit: None,
        }
    }

    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// The mutable fields of a memory record.
///
/// Any other key (`id`, `userId`, `createdAt`, `embedding`, ...) is rejected
/// when parsing from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MemoryUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_type: Option<MemoryType>,
}

impl MemoryUpdate {
    /// Parse an update body, mapping unknown or malformed fields to a
    /// validation error.
    pub fn from_json(value: serde_json::Value) -> Result<Self, MemlayerError> {
        serde_json::from_value(value)
            .map_err(|e| MemlayerError::Validation(format!("invalid memory update: {e}")))
    }

    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.metadata.is_none() && self.memory_type.is_none()
    }

    /// Convert into an index patch. `embedding` must be the embedding of the
    /// new content when content changes.
    pub(crate) fn into_patch(self, embedding: Option<Vec<f32>>) -> IndexPatch {
        IndexPatch {
            content: self.content,
            embedding,
            metadata: self.metadata,
            memory_type: self.memory_type,
        }
    }
}

/// One mutation (or deliberate non-mutation) taken during `add`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecord {
    pub action: MemoryAction,
    /// Record touched: new id for ADD, target for UPDATE/DELETE. Absent for
    /// NOOP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The fact that triggered this action.
    pub fact: String,
    /// Content of the target before UPDATE or DELETE.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_content: Option<String>,
}

/// A fact whose reconciliation was skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactFailure {
    pub fact: String,
    pub reason: String,
}

/// Result of an `add` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddSummary {
    pub actions: Vec<ActionRecord>,
    #[serde(default)]
    pub failures: Vec<FactFailure>,
}

impl AddSummary {
    pub fn count(&self, action: MemoryAction) -> usize {
        self.actions.iter().filter(|a| a.action == action).count()
    }

    pub fn added(&self) -> usize {
        self.count(MemoryAction::Add)
    }

    pub fn updated(&self) -> usize {
        self.count(MemoryAction::Update)
    }

    pub fn deleted(&self) -> usize {
        self.count(MemoryAction::Delete)
    }

    pub fn unchanged(&self) -> usize {
        self.count(MemoryAction::Noop)
    }

    /// Ids of records created by this call, in fact order.
    pub fn added_ids(&self) -> Vec<&str> {
        self.actions
            .iter()
            .filter(|a| a.action == MemoryAction::Add)
            .filter_map(|a| a.id.as_deref())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn add_request_defaults_from_json() {
        let request: AddRequest = serde_json::from_value(json!({
            "messages": [{"role": "user", "content": "I live in Berlin"}],
            "userId": "alice"
        }))
        .unwrap();
        assert!(request.infer);
        assert_eq!(request.memory_type, MemoryType::Factual);
        assert!(request.metadata.is_empty());
    }

    #[test]
    fn memory_update_rejects_immutable_fields() {
        for field in ["id", "userId", "createdAt", "updatedAt", "embedding"] {
            let mut body = serde_json::Map::new();
            body.insert(field.to_string(), json!("x"));
            let err = MemoryUpdate::from_json(serde_json::Value::Object(body)).unwrap_err();
            assert!(matches!(err, MemlayerError::Validation(_)), "{field}");
        }
    }

    #[test]
    fn memory_update_accepts_mutable_fields() {
        let update = MemoryUpdate::from_json(json!({
            "content": "likes coffee",
            "metadata": {"source": "cli"},
            "memoryType": "episodic"
        }))
        .unwrap();
        assert_eq!(update.content.as_deref(), Some("likes coffee"));
        assert_eq!(update.memory_type, Some(MemoryType::Episodic));
        assert!(!update.is_empty());
        assert!(MemoryUpdate::from_json(json!({})).unwrap().is_empty());
    }

    #[test]
    fn summary_counts_actions() {
        let summary = AddSummary {
            actions: vec![
                ActionRecord {
                    action: MemoryAction::Add,
                    id: Some("m1".into()),
                    fact: "a".into(),
                    previous_content: None,
                },
                ActionRecord {
                    action: MemoryAction::Noop,
                    id: None,
                    fact: "b".into(),
                    previous_content: None,
                },
            ],
            failures: vec![],
        };
        assert_eq!(summary.added(), 1);
        assert_eq!(summary.unchanged(), 1);
        assert_eq!(summary.deleted(), 0);
        assert_eq!(summary.added_ids(), vec!["m1"]);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["actions"][0]["action"], "ADD");
        assert!(json["actions"][1].get("id").is_none());
    }
}

// SPDX-FileCopyrightText: 2026 memlayer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the memlayer memory engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use memlayer_core::MemoryType;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Top-level memlayer configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MemlayerConfig {
    /// Service identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Vector index backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Embedding provider settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Chat completion provider used for extraction and decisions.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Reconciliation and retrieval behaviour.
    #[serde(default)]
    pub memory: MemoryConfig,
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Name reported in logs.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "memlayer".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Which `VectorIndex` implementation backs the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StorageBackend {
    /// Persistent SQLite database.
    #[default]
    Sqlite,
    /// Process-local map; contents vanish on exit.
    Memory,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("memlayer").join("memlayer.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("memlayer.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// OpenAI-compatible embedding endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingConfig {
    /// Base URL of the API, without the `/embeddings` suffix.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer key. `None` falls back to the `OPENAI_API_KEY` environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Output dimensionality; every stored vector has exactly this length.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: default_embedding_model(),
            dimensions: default_dimensions(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_dimensions() -> usize {
    1536
}

/// OpenAI-compatible chat completion endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer key. `None` falls back to the `OPENAI_API_KEY` environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Maximum tokens per extraction or decision response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: default_llm_model(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

/// How sibling facts of one `add` call see each other's mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReconcileMode {
    /// All facts are decided against the state before the call.
    #[default]
    Snapshot,
    /// Each fact is applied before the next one is looked up.
    Sequential,
}

/// Which decision step drives reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DecisionStrategy {
    /// Ask the configured chat model.
    #[default]
    Llm,
    /// Deterministic thresholds over candidate similarity.
    Similarity,
}

/// Memory engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// Nearest existing memories offered to the decision step per fact.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_search_limit")]
    pub default_search_limit: usize,

    #[serde(default = "default_list_limit")]
    pub default_list_limit: usize,

    #[serde(default)]
    pub reconcile_mode: ReconcileMode,

    #[serde(default)]
    pub decision: DecisionStrategy,

    /// Similarity at or above which a fact is a duplicate (similarity decider).
    #[serde(default = "default_dedup_threshold")]
    pub dedup_threshold: f32,

    /// Similarity at or above which a fact updates its nearest memory (similarity decider).
    #[serde(default = "default_update_threshold")]
    pub update_threshold: f32,

    /// Memory types that bypass the decision step and are always added.
    #[serde(default)]
    pub append_only_types: Vec<MemoryType>,

    #[serde(default = "default_embedding_timeout_ms")]
    pub embedding_timeout_ms: u64,

    #[serde(default = "default_llm_timeout_ms")]
    pub extraction_timeout_ms: u64,

    #[serde(default = "default_llm_timeout_ms")]
    pub decision_timeout_ms: u64,

    #[serde(default = "default_index_timeout_ms")]
    pub index_timeout_ms: u64,

    /// Extra attempts after an embedding timeout.
    #[serde(default = "default_embedding_max_retries")]
    pub embedding_max_retries: u32,

    /// Delay before the first retry; doubles on each further attempt.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// How long a user's write lease on a shared index stays valid. A process
    /// that dies holding one blocks that user's writers for at most this long.
    #[serde(default = "default_user_lease_ttl_ms")]
    pub user_lease_ttl_ms: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            default_search_limit: default_search_limit(),
            default_list_limit: default_list_limit(),
            reconcile_mode: ReconcileMode::default(),
            decision: DecisionStrategy::default(),
            dedup_threshold: default_dedup_threshold(),
            update_threshold: default_update_threshold(),
            append_only_types: Vec::new(),
            embedding_timeout_ms: default_embedding_timeout_ms(),
            extraction_timeout_ms: default_llm_timeout_ms(),
            decision_timeout_ms: default_llm_timeout_ms(),
            index_timeout_ms: default_index_timeout_ms(),
            embedding_max_retries: default_embedding_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            user_lease_ttl_ms: default_user_lease_ttl_ms(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

fn default_search_limit() -> usize {
    10
}

fn default_list_limit() -> usize {
    100
}

fn default_dedup_threshold() -> f32 {
    0.9
}

fn default_update_threshold() -> f32 {
    0.7
}

fn default_embedding_timeout_ms() -> u64 {
    10_000
}

fn default_llm_timeout_ms() -> u64 {
    30_000
}

fn default_index_timeout_ms() -> u64 {
    5_000
}

fn default_embedding_max_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    200
}

fn default_user_lease_ttl_ms() -> u64 {
    120_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = MemlayerConfig::default();
        assert_eq!(config.service.name, "memlayer");
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert!(config.storage.database_path.ends_with("memlayer.db"));
        assert_eq!(config.memory.top_k, 5);
        assert_eq!(config.memory.default_search_limit, 10);
        assert_eq!(config.memory.default_list_limit, 100);
        assert_eq!(config.memory.reconcile_mode, ReconcileMode::Snapshot);
        assert_eq!(config.memory.decision, DecisionStrategy::Llm);
        assert!(config.memory.append_only_types.is_empty());
    }

    #[test]
    fn enums_parse_lowercase() {
        assert_eq!("sequential".parse::<ReconcileMode>().unwrap(), ReconcileMode::Sequential);
        assert_eq!("similarity".parse::<DecisionStrategy>().unwrap(), DecisionStrategy::Similarity);
        assert_eq!(StorageBackend::Memory.to_string(), "memory");
    }
}

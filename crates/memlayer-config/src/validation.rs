// SPDX-FileCopyrightText: 2026 memlayer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as non-empty paths, positive timeouts and ordered thresholds.

use crate::diagnostic::ConfigError;
use crate::model::{MemlayerConfig, StorageBackend};

/// Upper bound on `memory.top_k`.
pub const MAX_TOP_K: usize = 100;

/// Upper bound on `memory.embedding_max_retries`.
pub const MAX_EMBEDDING_RETRIES: u32 = 10;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &MemlayerConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.service.log_level.to_ascii_lowercase().as_str()) {
        fail(format!(
            "service.log_level `{}` must be one of {}",
            config.service.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    if config.storage.backend == StorageBackend::Sqlite
        && config.storage.database_path.trim().is_empty()
    {
        fail("storage.database_path must not be empty".to_string());
    }

    for (section, url, model) in [
        ("embedding", &config.embedding.base_url, &config.embedding.model),
        ("llm", &config.llm.base_url, &config.llm.model),
    ] {
        if url.trim().is_empty() {
            fail(format!("{section}.base_url must not be empty"));
        }
        if model.trim().is_empty() {
            fail(format!("{section}.model must not be empty"));
        }
    }

    if config.embedding.dimensions == 0 {
        fail("embedding.dimensions must be positive".to_string());
    }
    if config.llm.max_tokens == 0 {
        fail("llm.max_tokens must be positive".to_string());
    }

    let memory = &config.memory;
    if memory.top_k == 0 || memory.top_k > MAX_TOP_K {
        fail(format!(
            "memory.top_k must be between 1 and {MAX_TOP_K}, got {}",
            memory.top_k
        ));
    }
    if memory.default_search_limit == 0 {
        fail("memory.default_search_limit must be positive".to_string());
    }
    if memory.default_list_limit == 0 {
        fail("memory.default_list_limit must be positive".to_string());
    }

    for (name, value) in [
        ("dedup_threshold", memory.dedup_threshold),
        ("update_threshold", memory.update_threshold),
    ] {
        if !(0.0..=1.0).contains(&value) {
            fail(format!("memory.{name} must be within [0, 1], got {value}"));
        }
    }
    if memory.dedup_threshold <= memory.update_threshold {
        fail(format!(
            "memory.dedup_threshold ({}) must be greater than memory.update_threshold ({})",
            memory.dedup_threshold, memory.update_threshold
        ));
    }

    for (name, value) in [
        ("embedding_timeout_ms", memory.embedding_timeout_ms),
        ("extraction_timeout_ms", memory.extraction_timeout_ms),
        ("decision_timeout_ms", memory.decision_timeout_ms),
        ("index_timeout_ms", memory.index_timeout_ms),
        ("user_lease_ttl_ms", memory.user_lease_ttl_ms),
    ] {
        if value == 0 {
            fail(format!("memory.{name} must be positive"));
        }
    }

    if memory.embedding_max_retries > MAX_EMBEDDING_RETRIES {
        fail(format!(
            "memory.embedding_max_retries must be at most {MAX_EMBEDDING_RETRIES}, got {}",
            memory.embedding_max_retries
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

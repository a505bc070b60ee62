// SPDX-FileCopyrightText: 2026 memlayer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the memlayer memory engine.

use std::time::Duration;

use strum::{Display, EnumString};
use thiserror::Error;

/// The primary error type used across all memlayer adapter traits and engine operations.
#[derive(Debug, Error)]
pub enum MemlayerError {
    /// Malformed input (missing user id, empty messages, unknown update field).
    #[error("validation error: {0}")]
    Validation(String),

    /// The requested memory record does not exist.
    #[error("memory not found: {id}")]
    NotFound { id: String },

    /// Embedding, extraction, decision or completion provider failure.
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A bounded provider or index call did not finish in time.
    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    /// Duplicate id on insert or a detected concurrent mutation.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse error classification handed to transport adapters.
///
/// Adapters map these onto their own status codes; the engine never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Provider,
    Conflict,
    Store,
    Internal,
}

impl MemlayerError {
    /// Shorthand for a provider error without an underlying source.
    pub fn provider(message: impl Into<String>) -> Self {
        MemlayerError::Provider {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a storage error from any boxed error source.
    pub fn storage(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        MemlayerError::Storage {
            source: source.into(),
        }
    }

    /// Classify this error. Timeouts count as provider failures.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MemlayerError::Validation(_) | MemlayerError::Config(_) => ErrorKind::Validation,
            MemlayerError::NotFound { .. } => ErrorKind::NotFound,
            MemlayerError::Provider { .. } | MemlayerError::Timeout { .. } => ErrorKind::Provider,
            MemlayerError::Conflict(_) => ErrorKind::Conflict,
            MemlayerError::Storage { .. } => ErrorKind::Store,
            MemlayerError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether this error is a timeout (the only condition eligible for retry).
    pub fn is_timeout(&self) -> bool {
        matches!(self, MemlayerError::Timeout { .. })
    }
}

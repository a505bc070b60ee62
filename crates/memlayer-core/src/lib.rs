// SPDX-FileCopyrightText: 2026 memlayer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the memlayer memory engine.
//!
//! This crate provides the capability traits, error types, and domain types
//! shared by the engine, its index backends and provider adapters.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{ErrorKind, MemlayerError};
pub use types::{
    AdapterType, Candidate, CompletionRequest, CompletionResponse, Decision, EmbeddingInput,
    EmbeddingOutput, ExtractedFact, Filters, HealthStatus, IndexPatch, MemoryAction, MemoryItem,
    MemoryType, Message, Metadata, Role, TokenUsage, VectorQuery,
};

// Re-export all adapter traits at crate root.
pub use traits::{
    CompletionAdapter, DecisionAdapter, EmbeddingAdapter, ExtractionAdapter, PluginAdapter,
    VectorIndex,
};

// SPDX-FileCopyrightText: 2026 memlayer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Long-term memory engine for AI agents.
//!
//! Turns conversations into durable per-user facts and keeps them consistent
//! as new information arrives.
//!
//! ## Architecture
//!
//! - **MemoryEngine**: facade with add, search, get, get_all, update, delete,
//!   delete_all and reset
//! - **Reconciler**: embeds facts, gathers nearest memories and applies one
//!   ADD/UPDATE/DELETE/NOOP decision per fact
//! - **LlmExtractor** / **LlmDecider**: completion-backed extraction and decisions
//! - **SimilarityDecider**: model-free decisions from similarity thresholds
//! - **UserLocks**: per-user exclusion for mutations
//! - **ResilientEmbedder** / **TimeoutIndex**: deadlines and embedding retries

pub mod decider;
pub mod engine;
pub mod extractor;
pub mod locks;
mod reconciler;
pub mod recording;
pub mod resilience;
pub mod types;

pub use decider::{LlmDecider, SimilarityDecider};
pub use engine::{MemoryEngine, MemoryEngineBuilder};
pub use extractor::LlmExtractor;
pub use locks::UserLocks;
pub use recording::register_metrics;
pub use resilience::{ResilientEmbedder, RetryPolicy, TimeoutIndex};
pub use types::*;

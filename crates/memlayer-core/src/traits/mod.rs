// SPDX-FileCopyrightText: 2026 memlayer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability traits the memory engine consumes.
//!
//! Providers extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod completion;
pub mod decision;
pub mod embedding;
pub mod extraction;
pub mod index;

// Re-export all traits at the traits module level for convenience.
pub use adapter::PluginAdapter;
pub use completion::CompletionAdapter;
pub use decision::DecisionAdapter;
pub use embedding::EmbeddingAdapter;
pub use extraction::ExtractionAdapter;
pub use index::VectorIndex;

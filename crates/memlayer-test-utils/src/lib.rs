// SPDX-FileCopyrightText: 2026 memlayer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for memlayer integration tests.
//!
//! Provides deterministic adapters and a harness for fast, CI-runnable
//! tests without external services.
//!
//! # Components
//!
//! - [`HashEmbedder`] - bag-of-words embedder, plus slow and failing variants
//! - [`ScriptedExtractor`] / [`ScriptedDecider`] / [`FnDecider`] - scripted
//!   extraction and decision steps
//! - [`MockCompletion`] - mock chat model with queued responses
//! - [`TestHarness`] - a full engine over an in-memory or SQLite index

pub mod embedder;
pub mod harness;
pub mod mock_completion;
pub mod scripted;

pub use embedder::{FailingEmbedder, HashEmbedder, SlowEmbedder};
pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_completion::MockCompletion;
pub use scripted::{DecisionCall, FnDecider, ScriptedDecider, ScriptedExtractor};

// SPDX-FileCopyrightText: 2026 memlayer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Completion adapter trait for chat-style language model calls.

use async_trait::async_trait;

use crate::error::MemlayerError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{CompletionRequest, CompletionResponse};

/// Adapter for single-shot LLM completions.
///
/// The LLM-backed extractor and decider are built on top of this trait, so
/// any chat model can drive them.
#[async_trait]
pub trait CompletionAdapter: PluginAdapter {
    /// Sends a completion request and returns the full response.
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, MemlayerError>;
}

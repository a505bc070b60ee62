// SPDX-FileCopyrightText: 2026 memlayer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Extraction adapter trait for turning conversation into candidate facts.

use async_trait::async_trait;

use crate::error::MemlayerError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ExtractedFact, Message};

/// Adapter that distils conversation messages into atomic facts.
///
/// Typically backed by a language model, so output is non-deterministic.
#[async_trait]
pub trait ExtractionAdapter: PluginAdapter {
    /// Extracts candidate facts from the given messages.
    ///
    /// An empty result is valid and means nothing worth remembering was said.
    async fn extract(&self, messages: &[Message]) -> Result<Vec<ExtractedFact>, MemlayerError>;
}

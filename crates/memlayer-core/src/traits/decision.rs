// SPDX-FileCopyrightText: 2026 memlayer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Decision adapter trait used by reconciliation.

use async_trait::async_trait;

use crate::error::MemlayerError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{Candidate, Decision};

/// Adapter that classifies a new fact against the user's nearest memories.
///
/// Implementations return exactly one [`Decision`]. Target ids in
/// `Update`/`Delete` must come from `candidates`; the reconciler rejects
/// anything else.
#[async_trait]
pub trait DecisionAdapter: PluginAdapter {
    async fn decide(&self, fact: &str, candidates: &[Candidate])
    -> Result<Decision, MemlayerError>;
}

// SPDX-FileCopyrightText: 2026 memlayer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Base adapter trait that all providers must implement.

use async_trait::async_trait;

use crate::error::MemlayerError;
use crate::types::{AdapterType, HealthStatus};

/// The base trait for all memlayer provider adapters.
///
/// Every adapter (embedding, extraction, completion, etc.) implements this
/// trait, which provides identity and health check capabilities.
#[async_trait]
pub trait PluginAdapter: Send + Sync + 'static {
    /// Returns the human-readable name of this adapter instance.
    fn name(&self) -> &str;

    /// Returns the semantic version of this adapter.
    fn version(&self) -> semver::Version;

    /// Returns the kind of adapter.
    fn adapter_type(&self) -> AdapterType;

    /// Performs a health check and returns the adapter's current status.
    async fn health_check(&self) -> Result<HealthStatus, MemlayerError> {
        Ok(HealthStatus::Healthy)
    }
}

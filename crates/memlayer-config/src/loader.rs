// SPDX-FileCopyrightText: 2026 memlayer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./memlayer.toml` > `~/.config/memlayer/memlayer.toml` >
//! `/etc/memlayer/memlayer.toml` with environment variable overrides via `MEMLAYER_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::MemlayerConfig;

/// File name looked up in every configuration directory.
pub const CONFIG_FILE_NAME: &str = "memlayer.toml";

/// Config sections addressable from the environment.
const ENV_SECTIONS: &[&str] = &["service", "storage", "embedding", "llm", "memory"];

/// System-wide configuration path.
pub fn system_config_path() -> PathBuf {
    Path::new("/etc/memlayer").join(CONFIG_FILE_NAME)
}

/// Per-user XDG configuration path, if the platform has a config directory.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("memlayer").join(CONFIG_FILE_NAME))
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/memlayer/memlayer.toml` (system-wide)
/// 3. `~/.config/memlayer/memlayer.toml` (user XDG config)
/// 4. `./memlayer.toml` (local directory)
/// 5. `MEMLAYER_*` environment variables
pub fn load_config() -> Result<MemlayerConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<MemlayerConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(MemlayerConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<MemlayerConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(MemlayerConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
///
/// Returns the Figment before extraction so callers can inspect metadata.
pub fn build_figment() -> Figment {
    let mut figment = Figment::new()
        .merge(Serialized::defaults(MemlayerConfig::default()))
        .merge(Toml::file(system_config_path()));
    if let Some(user) = user_config_path() {
        figment = figment.merge(Toml::file(user));
    }
    figment
        .merge(Toml::file(CONFIG_FILE_NAME))
        .merge(env_provider())
}

/// Create the environment variable provider using explicit section mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` because key names contain
/// underscores: `MEMLAYER_EMBEDDING_API_KEY` must map to `embedding.api_key`,
/// not `embedding.api.key`.
fn env_provider() -> Env {
    Env::prefixed("MEMLAYER_").map(|key| map_env_key(key.as_str()).into())
}

/// Map a lowercased, prefix-stripped env var name onto a dotted config path.
///
/// Only the leading section name is split off; names that match no section
/// pass through untouched and are rejected by `deny_unknown_fields`.
pub fn map_env_key(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
            && !rest.is_empty()
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

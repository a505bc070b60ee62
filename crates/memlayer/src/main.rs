// SPDX-FileCopyrightText: 2026 memlayer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! memlayer - long-term memory for AI agents.
//!
//! Command-line front end over the memory engine. Every command prints JSON
//! to stdout; errors go to stderr with an exit code per error kind.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod bootstrap;
mod commands;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use memlayer_config::{ConfigError, MemlayerConfig};
use memlayer_core::{ErrorKind, MemlayerError};
use serde_json::Value;

use crate::commands::EngineCommand;

/// memlayer - long-term memory for AI agents.
#[derive(Parser, Debug)]
#[command(name = "memlayer", version, about, long_about = None)]
struct Cli {
    /// Configuration file; defaults to the XDG lookup.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    #[command(flatten)]
    Engine(EngineCommand),
    /// Validate configuration and print the effective settings.
    CheckConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            memlayer_config::render_errors(&errors);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config.service.log_level);

    let result = match cli.command {
        Commands::CheckConfig => Ok(redacted(&config)),
        Commands::Engine(command) => execute(command, &config).await,
    };

    match result {
        Ok(output) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&output).unwrap_or_else(|_| "{}".to_string())
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("memlayer: {e}");
            ExitCode::from(exit_code(e.kind()))
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<MemlayerConfig, Vec<ConfigError>> {
    match path {
        Some(path) => memlayer_config::load_and_validate_path(path),
        None => memlayer_config::load_and_validate(),
    }
}

async fn execute(command: EngineCommand, config: &MemlayerConfig) -> Result<Value, MemlayerError> {
    // Refuse before touching providers or storage.
    if let EngineCommand::Reset { yes } = &command {
        commands::confirm_reset(*yes)?;
    }
    let engine = bootstrap::build_engine(config).await?;
    commands::run(command, &engine).await
}

/// The effective configuration with API keys masked.
fn redacted(config: &MemlayerConfig) -> Value {
    let mut config = config.clone();
    for key in [&mut config.embedding.api_key, &mut config.llm.api_key] {
        if key.is_some() {
            *key = Some("***".to_string());
        }
    }
    serde_json::to_value(&config).unwrap_or(Value::Null)
}

fn exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Validation => 2,
        ErrorKind::NotFound => 3,
        ErrorKind::Provider => 4,
        ErrorKind::Conflict => 5,
        ErrorKind::Store => 6,
    }
}

/// Initializes the tracing subscriber with the given log level.
///
/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("memlayer={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        // Only jemalloc supports advancing the stats epoch.
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    #[serial]
    fn binary_loads_config_defaults() {
        let config = memlayer_config::load_and_validate().expect("default config should be valid");
        assert_eq!(config.service.name, "memlayer");
    }

    #[test]
    #[serial]
    fn env_overrides_memory_settings() {
        // SAFETY: test-only env mutation, serialized with the other env tests.
        unsafe { std::env::set_var("MEMLAYER_MEMORY_TOP_K", "7") };
        let result = memlayer_config::load_and_validate();
        unsafe { std::env::remove_var("MEMLAYER_MEMORY_TOP_K") };

        assert_eq!(result.expect("config should load").memory.top_k, 7);
    }

    #[test]
    #[serial]
    fn explicit_config_path_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memlayer.toml");
        std::fs::write(&path, "[memory]\nreconcile_mode = \"sequential\"\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(
            config.memory.reconcile_mode,
            memlayer_config::ReconcileMode::Sequential
        );
    }

    #[test]
    fn cli_parses_engine_and_config_commands() {
        let cli = Cli::try_parse_from(["memlayer", "delete-all", "--user", "alice"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Engine(EngineCommand::DeleteAll { ref user }) if user == "alice"
        ));

        let cli =
            Cli::try_parse_from(["memlayer", "check-config", "--config", "/tmp/x.toml"]).unwrap();
        assert!(matches!(cli.command, Commands::CheckConfig));
        assert_eq!(cli.config.as_deref(), Some(Path::new("/tmp/x.toml")));
    }

    #[test]
    fn check_config_masks_api_keys() {
        let config = memlayer_config::load_and_validate_str(
            "[embedding]\napi_key = \"sk-secret\"\n",
        )
        .unwrap();
        let value = redacted(&config);
        assert_eq!(value["embedding"]["api_key"], "***");
        assert!(value["llm"]["api_key"].is_null());
        assert!(!value.to_string().contains("sk-secret"));
    }

    #[tokio::test]
    async fn reset_is_refused_before_engine_is_built() {
        // No API keys configured: building the engine would fail with a
        // config error, so a validation error proves the early refusal.
        let config = memlayer_config::load_and_validate_str("[storage]\nbackend = \"memory\"\n")
            .unwrap();
        let err = execute(EngineCommand::Reset { yes: false }, &config)
            .await
            .unwrap_err();
        assert!(matches!(err, MemlayerError::Validation(_)));
    }

    #[test]
    fn exit_codes_are_distinct_per_kind() {
        assert_eq!(exit_code(ErrorKind::Validation), 2);
        assert_eq!(exit_code(ErrorKind::NotFound), 3);
        assert_ne!(exit_code(ErrorKind::Provider), exit_code(ErrorKind::Store));
    }
}

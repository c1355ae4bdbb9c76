// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Strata CLI
//!
//! The `strata` binary evaluates tenant policy against a local YAML snapshot
//! of per-level records.
//!
//! ## Commands
//!
//! - `strata settings resolve` - Effective feature flags and quotas
//! - `strata guardrails check|test` - Screen text, dry-run rule sets
//! - `strata mcp list|check-limit` - Visible MCP servers and quota headroom
//! - `strata snapshot validate` - Check a policy snapshot file
//! - `strata config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use strata_cli::commands::{self, ConfigCommand, GuardrailsCommand, McpCommand, SettingsCommand, SnapshotCommand};
use strata_cli::embedded::resolve_observability;

/// Strata - Hierarchical tenant policy engine
#[derive(Parser)]
#[command(name = "strata")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(short, long, global = true, env = "STRATA_CONFIG_PATH", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Policy snapshot to evaluate against
    #[arg(short, long, global = true, env = "STRATA_SNAPSHOT_PATH", value_name = "FILE")]
    snapshot: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the configuration's
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Log format (compact, json); defaults to the configuration's
    #[arg(long, global = true, env = "STRATA_LOG_FORMAT", value_name = "FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Effective settings
    #[command(name = "settings")]
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },

    /// Content guardrails
    #[command(name = "guardrails")]
    Guardrails {
        #[command(subcommand)]
        command: GuardrailsCommand,
    },

    /// MCP server resolution
    #[command(name = "mcp")]
    Mcp {
        #[command(subcommand)]
        command: McpCommand,
    },

    /// Policy snapshot files
    #[command(name = "snapshot")]
    Snapshot {
        #[command(subcommand)]
        command: SnapshotCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let observability = resolve_observability(cli.config.clone(), cli.log_level.clone(), cli.log_format.clone());
    init_logging(&observability.log_level, &observability.log_format)?;

    let snapshot = cli.snapshot.as_deref();
    match cli.command {
        Some(Commands::Settings { command }) => commands::settings::handle_command(command, cli.config, snapshot).await,
        Some(Commands::Guardrails { command }) => {
            commands::guardrails::handle_command(command, cli.config, snapshot).await
        }
        Some(Commands::Mcp { command }) => commands::mcp::handle_command(command, cli.config, snapshot).await,
        Some(Commands::Snapshot { command }) => commands::snapshot::handle_command(command).await,
        Some(Commands::Config { command }) => commands::config::handle_command(command, cli.config).await,
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        "json" => builder.json().init(),
        _ => builder.with_target(false).compact().init(),
    }

    Ok(())
}

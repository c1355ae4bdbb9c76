// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! MCP server commands
//!
//! Commands: list, check-limit

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use strata_core::application::PolicyError;

use super::{print_json, LevelArg, ScopeArgs};
use crate::embedded::EmbeddedPolicyEngine;

#[derive(Subcommand)]
pub enum McpCommand {
    /// List the MCP servers and tools visible to a scope chain
    List {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Also list servers and tools that were filtered out
        #[arg(long)]
        all: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check whether one more server may be registered at a level
    CheckLimit {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Scope level of the new server
        #[arg(long, value_enum)]
        level: LevelArg,
    },
}

pub async fn handle_command(
    command: McpCommand,
    config_path: Option<PathBuf>,
    snapshot_path: Option<&Path>,
) -> Result<()> {
    let engine = EmbeddedPolicyEngine::load(config_path, snapshot_path).await?;

    match command {
        McpCommand::List { scope, all, json } => {
            let chain = scope.to_chain()?;
            let effective = engine
                .service
                .get_effective_mcp_servers(&chain)
                .await
                .with_context(|| format!("Failed to resolve MCP servers for {}", chain))?;

            if json {
                return print_json(&effective);
            }

            if let Some(level) = effective.feature_disabled_by {
                println!("{}", format!("MCP is disabled for {} (by {})", chain, level).yellow());
                return Ok(());
            }

            if effective.servers.is_empty() {
                println!("{}", "No MCP servers visible".yellow());
            }
            for server in &effective.servers {
                println!(
                    "{} {} {}",
                    server.entry.name.bold(),
                    server.entry.id.to_string().dimmed(),
                    format!("({}-scoped)", server.entry.scope_level()).dimmed()
                );
                for tool in &server.tools {
                    println!("  - {}", tool);
                }
            }

            if all {
                for (id, level) in &effective.disabled_reasons {
                    println!("{} server {} (by {})", "disabled".red(), id, level);
                }
                for (tool, level) in &effective.disabled_tools {
                    println!("{} tool {} (by {})", "disabled".red(), tool, level);
                }
            }
            Ok(())
        }
        McpCommand::CheckLimit { scope, level } => {
            let chain = scope.to_chain()?;
            match engine.service.check_server_limits(&chain, level.into()).await {
                Ok(()) => {
                    println!("{}", "✓ Registration allowed".green());
                    Ok(())
                }
                Err(PolicyError::QuotaExceeded(e)) => {
                    println!("{}", format!("✗ {}", e).red());
                    std::process::exit(2);
                }
                Err(e) => Err(e).context("Server limit check failed"),
            }
        }
    }
}

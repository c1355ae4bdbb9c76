// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Policy snapshot commands
//!
//! Commands: validate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use strata_core::infrastructure::snapshot::PolicySnapshot;

#[derive(Subcommand)]
pub enum SnapshotCommand {
    /// Validate a policy snapshot file
    Validate {
        /// Path to snapshot YAML file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

pub async fn handle_command(command: SnapshotCommand) -> Result<()> {
    match command {
        SnapshotCommand::Validate { file } => {
            println!("Validating policy snapshot...");
            let snapshot = PolicySnapshot::from_yaml_file(&file)
                .with_context(|| format!("Snapshot {:?} is invalid", file))?;

            println!("{}", "✓ Snapshot is valid".green());
            println!("  Settings records: {}", snapshot.settings.len());
            println!("  Guardrail rule sets: {}", snapshot.guardrails.len());
            println!("  MCP servers: {}", snapshot.mcp_servers.len());
            println!("  Disable lists: {}", snapshot.disabled_overrides.len());
            Ok(())
        }
    }
}

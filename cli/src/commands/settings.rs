// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Settings commands
//!
//! Commands: resolve

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use strata_core::domain::merge::{EffectiveFlag, EffectiveQuota};
use strata_core::domain::settings::FeatureKey;

use super::{print_json, ScopeArgs};
use crate::embedded::EmbeddedPolicyEngine;

#[derive(Subcommand)]
pub enum SettingsCommand {
    /// Resolve effective settings for a scope chain
    Resolve {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Print the effective view as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn handle_command(
    command: SettingsCommand,
    config_path: Option<PathBuf>,
    snapshot_path: Option<&Path>,
) -> Result<()> {
    let engine = EmbeddedPolicyEngine::load(config_path, snapshot_path).await?;

    match command {
        SettingsCommand::Resolve { scope, json } => {
            let chain = scope.to_chain()?;
            let view = engine
                .service
                .resolve_settings(&chain)
                .await
                .with_context(|| format!("Failed to resolve settings for {}", chain))?;

            if json {
                return print_json(&view);
            }

            println!("{} {}", "Effective settings for".bold(), chain);
            println!();
            for key in FeatureKey::ALL {
                println!("  {:<28} {}", key.as_str(), describe_flag(view.flag(key)));
            }
            println!(
                "  {:<28} {}",
                "mcp_max_servers_per_team",
                describe_quota(view.mcp_max_servers_per_team)
            );
            println!(
                "  {:<28} {}",
                "mcp_max_servers_per_user",
                describe_quota(view.mcp_max_servers_per_user)
            );
            Ok(())
        }
    }
}

fn describe_flag(flag: EffectiveFlag) -> String {
    match flag.disabled_by {
        None => "enabled".green().to_string(),
        Some(level) => format!("{} {}", "disabled".red(), format!("(by {})", level).dimmed()),
    }
}

fn describe_quota(quota: EffectiveQuota) -> String {
    format!("{} {}", quota.value, format!("(bound by {})", quota.bound_by).dimmed())
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use strata_core::domain::config::PolicyConfigManifest;
use strata_core::domain::settings::FeatureKey;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./strata-config.yaml)
        #[arg(short, long, default_value = "./strata-config.yaml")]
        output: PathBuf,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate { output } => generate(output),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = PolicyConfigManifest::load_or_default(config_override.clone()).context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. STRATA_CONFIG_PATH: {}",
            std::env::var("STRATA_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./strata-config.yaml");
        println!("  4. ~/.strata/config.yaml");
        println!("  5. /etc/strata/config.yaml");
        println!();
    }

    println!("{} {}", "Current configuration:".bold(), config.metadata.name);
    println!();

    let defaults = &config.spec.defaults;
    println!("{}", "Defaults:".bold());
    for key in FeatureKey::ALL {
        let value = defaults.feature(key);
        let shown = if value { "on".green() } else { "off".red() };
        println!("  {}: {}", key, shown);
    }
    println!("  mcp_max_servers_per_team: {}", defaults.mcp_max_servers_per_team);
    println!("  mcp_max_servers_per_user: {}", defaults.mcp_max_servers_per_user);
    println!();

    println!("{}", "Guardrails:".bold());
    println!("  Max text size: {} bytes", config.spec.guardrails.max_text_bytes);
    for (pii_type, token) in &config.spec.guardrails.pii_replacements {
        println!("  {} → {}", pii_type, token);
    }
    println!();

    println!("{}", "Audit:".bold());
    println!("  Bus capacity: {}", config.spec.audit.bus_capacity);
    println!("  Tracing sink: {}", config.spec.audit.tracing_sink);
    println!();

    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = PolicyConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());
    Ok(())
}

fn generate(output: PathBuf) -> Result<()> {
    PolicyConfigManifest::default()
        .to_yaml_file(&output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!("{}", format!("✓ Configuration generated: {}", output.display()).green());
    Ok(())
}

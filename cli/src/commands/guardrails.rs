// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Guardrail commands
//!
//! Commands: check, test

use anyhow::{Context, Result};
use clap::{Subcommand, ValueEnum};
use colored::Colorize;
use std::io::Read;
use std::path::{Path, PathBuf};

use strata_core::domain::guardrail::{Direction, GuardrailAction, GuardrailResult, GuardrailRuleSet, GuardrailStatus};

use super::{print_json, LevelArg, ScopeArgs};
use crate::embedded::EmbeddedPolicyEngine;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionArg {
    Input,
    Output,
}

impl From<DirectionArg> for Direction {
    fn from(direction: DirectionArg) -> Self {
        match direction {
            DirectionArg::Input => Direction::Input,
            DirectionArg::Output => Direction::Output,
        }
    }
}

#[derive(Subcommand)]
pub enum GuardrailsCommand {
    /// Screen a message against every guardrail of a scope chain
    Check {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Message direction
        #[arg(long, value_enum, default_value = "input")]
        direction: DirectionArg,

        /// Text to screen (reads stdin when omitted)
        #[arg(long)]
        text: Option<String>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a rule set file and dry-run it against a sample text
    Test {
        /// Path to a guardrail rule set YAML file
        #[arg(value_name = "RULES")]
        rules: PathBuf,

        /// Level the rule set would be defined at
        #[arg(long, value_enum, default_value = "org")]
        level: LevelArg,

        /// Message direction
        #[arg(long, value_enum, default_value = "input")]
        direction: DirectionArg,

        /// Sample text (reads stdin when omitted)
        #[arg(long)]
        text: Option<String>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn handle_command(
    command: GuardrailsCommand,
    config_path: Option<PathBuf>,
    snapshot_path: Option<&Path>,
) -> Result<()> {
    let engine = EmbeddedPolicyEngine::load(config_path, snapshot_path).await?;

    match command {
        GuardrailsCommand::Check {
            scope,
            direction,
            text,
            json,
        } => {
            let chain = scope.to_chain()?;
            let text = read_text(text)?;
            let result = match direction {
                DirectionArg::Input => engine.service.check_input(&chain, &text).await,
                DirectionArg::Output => engine.service.check_output(&chain, &text).await,
            }
            .with_context(|| format!("Guardrail check failed for {}", chain))?;
            report(&result, json)
        }
        GuardrailsCommand::Test {
            rules,
            level,
            direction,
            text,
            json,
        } => {
            let content =
                std::fs::read_to_string(&rules).with_context(|| format!("Failed to read rule set {:?}", rules))?;
            let rule_set: GuardrailRuleSet =
                serde_yaml::from_str(&content).with_context(|| format!("Failed to parse rule set {:?}", rules))?;
            let text = read_text(text)?;
            let result = engine
                .service
                .test_guardrails(level.into(), &rule_set, &text, direction.into())
                .context("Rule set is invalid")?;
            report(&result, json)
        }
    }
}

fn read_text(text: Option<String>) -> Result<String> {
    match text {
        Some(text) => Ok(text),
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read text from stdin")?;
            Ok(buffer)
        }
    }
}

fn report(result: &GuardrailResult, json: bool) -> Result<()> {
    if json {
        return print_json(result);
    }

    let status = match result.status {
        GuardrailStatus::Clean => "clean".green(),
        GuardrailStatus::Redacted => "redacted".yellow(),
        GuardrailStatus::Blocked => "blocked".red(),
    };
    println!("{} {} ({})", "Status:".bold(), status, result.direction);

    if !result.matches.is_empty() {
        println!("{}", "Matches:".bold());
        for m in &result.matches {
            let action = match m.action {
                GuardrailAction::Block => "block".red(),
                GuardrailAction::Redact => "redact".yellow(),
                GuardrailAction::Warn => "warn".cyan(),
            };
            println!("  [{}] {} at {}..{} ({} level)", action, m.rule_id, m.start, m.end, m.level);
        }
    }

    if result.status == GuardrailStatus::Redacted {
        println!();
        println!("{}", result.redacted_text);
    }
    Ok(())
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Strata CLI

pub mod config;
pub mod settings;
pub mod guardrails;
pub mod mcp;
pub mod snapshot;

pub use self::config::ConfigCommand;
pub use self::guardrails::GuardrailsCommand;
pub use self::mcp::McpCommand;
pub use self::settings::SettingsCommand;
pub use self::snapshot::SnapshotCommand;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use serde::Serialize;

use strata_core::domain::scope::{OrgId, ScopeChain, SettingsLevel, TeamId, UserId};

/// Scope chain a command is evaluated for
#[derive(Args, Debug, Clone)]
pub struct ScopeArgs {
    /// Organization ID
    #[arg(long, value_name = "ORG_ID")]
    pub org: String,

    /// Team ID (required when --user is given)
    #[arg(long, value_name = "TEAM_ID")]
    pub team: Option<String>,

    /// User ID
    #[arg(long, value_name = "USER_ID")]
    pub user: Option<String>,
}

impl ScopeArgs {
    pub fn to_chain(&self) -> Result<ScopeChain> {
        let org = OrgId::from_string(&self.org).with_context(|| format!("Invalid org ID '{}'", self.org))?;
        let team = self
            .team
            .as_deref()
            .map(|id| TeamId::from_string(id).with_context(|| format!("Invalid team ID '{}'", id)))
            .transpose()?;
        let user = self
            .user
            .as_deref()
            .map(|id| UserId::from_string(id).with_context(|| format!("Invalid user ID '{}'", id)))
            .transpose()?;
        Ok(ScopeChain::try_new(Some(org), team, user)?)
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelArg {
    Org,
    Team,
    User,
}

impl From<LevelArg> for SettingsLevel {
    fn from(level: LevelArg) -> Self {
        match level {
            LevelArg::Org => SettingsLevel::Org,
            LevelArg::Team => SettingsLevel::Team,
            LevelArg::User => SettingsLevel::User,
        }
    }
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

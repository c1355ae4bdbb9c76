// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Read/write contracts for the per-level records the engine evaluates. The engine
//! never owns storage: these traits are implemented by whatever record store the
//! surrounding service uses.
//!
//! | Trait | Records | Implementations |
//! |-------|---------|----------------|
//! | `SettingsRepository` | `SettingsRecord` per level | `InMemorySettingsRepository` |
//! | `GuardrailRepository` | `GuardrailRuleSet` per level | `InMemoryGuardrailRepository` |
//! | `McpServerRepository` | `McpServerEntry`, `DisabledOverrideSet` per level | `InMemoryMcpServerRepository` |
//!
//! Every getter distinguishes "record absent" (`Ok(None)` / empty set, which the
//! engine treats as "no restriction") from a failed fetch (`Err`), which must never
//! be mistaken for absence.

use async_trait::async_trait;

use super::guardrail::GuardrailRuleSet;
use super::mcp::{DisabledOverrideSet, McpServerEntry};
use super::scope::{ScopeChain, ScopeKey};
use super::settings::SettingsRecord;

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// Fetch the settings record of one level
    async fn get_settings(&self, key: ScopeKey) -> Result<Option<SettingsRecord>, RepositoryError>;

    /// Save settings record (create or replace)
    async fn save_settings(&self, key: ScopeKey, record: &SettingsRecord) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait GuardrailRepository: Send + Sync {
    /// Fetch the guardrail rule set of one level
    async fn get_guardrails(&self, key: ScopeKey) -> Result<Option<GuardrailRuleSet>, RepositoryError>;

    /// Save guardrail rule set (create or replace)
    async fn save_guardrails(&self, key: ScopeKey, rule_set: &GuardrailRuleSet) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait McpServerRepository: Send + Sync {
    /// Registered servers visible to `chain` (owner scope ancestor-or-equal)
    async fn list_mcp_servers(&self, chain: &ScopeChain) -> Result<Vec<McpServerEntry>, RepositoryError>;

    /// Save server entry (create or update)
    async fn save_mcp_server(&self, entry: &McpServerEntry) -> Result<(), RepositoryError>;

    /// Save `entry` unless `limit` servers are already owned by exactly
    /// `entry.owner`. Counting and inserting must be one atomic step, so two
    /// concurrent registrations cannot both take the last slot.
    async fn save_mcp_server_within(
        &self,
        entry: &McpServerEntry,
        limit: Option<u32>,
    ) -> Result<QuotaInsert, RepositoryError>;

    /// Disabled servers and tools of one level; empty when nothing is disabled
    async fn get_disabled_overrides(&self, key: ScopeKey) -> Result<DisabledOverrideSet, RepositoryError>;

    /// Save disabled overrides (create or replace)
    async fn save_disabled_overrides(&self, key: ScopeKey, overrides: &DisabledOverrideSet) -> Result<(), RepositoryError>;
}

/// Result of a quota-guarded insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaInsert {
    Saved,
    /// Nothing was written; the owner already holds `current` servers
    LimitReached { current: usize },
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// A failed record fetch. Propagated to the caller, never read as "no restriction".
pub type RecordFetchError = RepositoryError;

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for RepositoryError {
    fn from(err: serde_yaml::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

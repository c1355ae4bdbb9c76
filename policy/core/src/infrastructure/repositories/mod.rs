// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! In-memory implementations of the record store contracts defined in the
//! domain layer.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Hold per-level policy records
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! - **InMemorySettingsRepository** - Settings records keyed by level
//! - **InMemoryGuardrailRepository** - Guardrail rule sets keyed by level
//! - **InMemoryMcpServerRepository** - Registered servers and per-level disable lists
//!
//! Each store is cheap to clone and shares its contents across clones.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::guardrail::GuardrailRuleSet;
use crate::domain::mcp::{DisabledOverrideSet, McpServerEntry, McpServerId};
use crate::domain::repository::{
    GuardrailRepository, McpServerRepository, QuotaInsert, RepositoryError, SettingsRepository,
};
use crate::domain::scope::{ScopeChain, ScopeKey};
use crate::domain::settings::SettingsRecord;

#[derive(Clone, Default)]
pub struct InMemorySettingsRepository {
    records: Arc<RwLock<HashMap<ScopeKey, SettingsRecord>>>,
}

impl InMemorySettingsRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsRepository for InMemorySettingsRepository {
    async fn get_settings(&self, key: ScopeKey) -> Result<Option<SettingsRecord>, RepositoryError> {
        Ok(self.records.read().get(&key).cloned())
    }

    async fn save_settings(&self, key: ScopeKey, record: &SettingsRecord) -> Result<(), RepositoryError> {
        self.records.write().insert(key, record.clone());
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryGuardrailRepository {
    rule_sets: Arc<RwLock<HashMap<ScopeKey, GuardrailRuleSet>>>,
}

impl InMemoryGuardrailRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GuardrailRepository for InMemoryGuardrailRepository {
    async fn get_guardrails(&self, key: ScopeKey) -> Result<Option<GuardrailRuleSet>, RepositoryError> {
        Ok(self.rule_sets.read().get(&key).cloned())
    }

    async fn save_guardrails(&self, key: ScopeKey, rule_set: &GuardrailRuleSet) -> Result<(), RepositoryError> {
        self.rule_sets.write().insert(key, rule_set.clone());
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryMcpServerRepository {
    servers: Arc<RwLock<HashMap<McpServerId, McpServerEntry>>>,
    overrides: Arc<RwLock<HashMap<ScopeKey, DisabledOverrideSet>>>,
}

impl InMemoryMcpServerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.servers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.read().is_empty()
    }
}

#[async_trait]
impl McpServerRepository for InMemoryMcpServerRepository {
    async fn list_mcp_servers(&self, chain: &ScopeChain) -> Result<Vec<McpServerEntry>, RepositoryError> {
        let servers = self.servers.read();
        Ok(servers
            .values()
            .filter(|entry| entry.owner.is_ancestor_or_equal(chain))
            .cloned()
            .collect())
    }

    async fn save_mcp_server(&self, entry: &McpServerEntry) -> Result<(), RepositoryError> {
        self.servers.write().insert(entry.id, entry.clone());
        Ok(())
    }

    async fn save_mcp_server_within(
        &self,
        entry: &McpServerEntry,
        limit: Option<u32>,
    ) -> Result<QuotaInsert, RepositoryError> {
        // Held across count and insert
        let mut servers = self.servers.write();
        if let Some(limit) = limit {
            let current = servers.values().filter(|s| s.owner == entry.owner).count();
            if current >= limit as usize {
                return Ok(QuotaInsert::LimitReached { current });
            }
        }
        servers.insert(entry.id, entry.clone());
        Ok(QuotaInsert::Saved)
    }

    async fn get_disabled_overrides(&self, key: ScopeKey) -> Result<DisabledOverrideSet, RepositoryError> {
        Ok(self.overrides.read().get(&key).cloned().unwrap_or_default())
    }

    async fn save_disabled_overrides(&self, key: ScopeKey, overrides: &DisabledOverrideSet) -> Result<(), RepositoryError> {
        self.overrides.write().insert(key, overrides.clone());
        Ok(())
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # MCP Resolver
//!
//! Registered MCP servers, per-level disable lists, and the resolution of the server
//! and tool set an agent may see for a given scope chain.
//!
//! ## Visibility
//!
//! A server is a candidate when its owner scope is an ancestor of (or equal to) the
//! caller's chain: Org-scoped servers are visible to the whole org, Team-scoped ones
//! to that team, User-scoped ones to their owner only.
//!
//! ## Restriction
//!
//! Disable lists merge as a union across Org, Team and User; nothing at a lower level
//! can re-enable a server or tool disabled above. Tool filtering runs after server
//! filtering, so a tool can be switched off while its server stays visible.
//!
//! ## Quotas
//!
//! [`check_server_limits`] is a precondition for registration: the count of existing
//! Team-scoped (per team) or User-scoped (per user) servers is compared with the
//! min-merged quota before anything is inserted.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use super::merge::LevelChain;
use super::scope::{InvalidScopeError, ScopeChain, ScopeFields, Scoped, SettingsLevel};
use super::settings::EffectiveSettingsView;

/// MCP server identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct McpServerId(pub Uuid);

impl McpServerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for McpServerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for McpServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered MCP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerEntry {
    pub id: McpServerId,
    pub name: String,
    /// Scope the server was registered at; its level is the server's scope level.
    pub owner: ScopeChain,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Expose tools as `<server name>_<tool>` instead of the bare tool name.
    #[serde(default)]
    pub tool_prefix: bool,
    #[serde(default)]
    pub tools: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl McpServerEntry {
    pub fn new(name: impl Into<String>, owner: ScopeChain) -> Self {
        Self {
            id: McpServerId::new(),
            name: name.into(),
            owner,
            enabled: true,
            tool_prefix: false,
            tools: Vec::new(),
        }
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn scope_level(&self) -> SettingsLevel {
        self.owner.level()
    }

    /// Name under which `tool` is exposed to the agent.
    pub fn exposed_tool_name(&self, tool: &str) -> String {
        if self.tool_prefix {
            format!("{}_{}", self.name, tool)
        } else {
            tool.to_string()
        }
    }
}

impl Scoped for McpServerEntry {
    fn scope_fields(&self) -> ScopeFields {
        self.owner.scope_fields()
    }
}

/// Servers and tools explicitly switched off at one level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisabledOverrideSet {
    #[serde(default)]
    pub server_ids: BTreeSet<McpServerId>,
    /// Matched against both the bare and the exposed (prefixed) tool name.
    #[serde(default)]
    pub tool_names: BTreeSet<String>,
}

impl DisabledOverrideSet {
    pub fn is_empty(&self) -> bool {
        self.server_ids.is_empty() && self.tool_names.is_empty()
    }
}

/// A visible server together with the tools that survived filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveMcpServer {
    pub entry: McpServerEntry,
    pub tools: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveMcpServers {
    pub servers: Vec<EffectiveMcpServer>,
    /// Why a candidate server was removed: the highest level that disabled it, or
    /// the server's own level when the server itself is switched off.
    pub disabled_reasons: BTreeMap<McpServerId, SettingsLevel>,
    /// Exposed tool name → highest level that disabled it.
    pub disabled_tools: BTreeMap<String, SettingsLevel>,
    /// Set when the MCP feature as a whole is disabled for the chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_disabled_by: Option<SettingsLevel>,
}

impl EffectiveMcpServers {
    pub fn feature_disabled(level: Option<SettingsLevel>) -> Self {
        Self {
            feature_disabled_by: level,
            ..Default::default()
        }
    }

    pub fn server_ids(&self) -> Vec<McpServerId> {
        self.servers.iter().map(|s| s.entry.id).collect()
    }

    pub fn contains(&self, id: McpServerId) -> bool {
        self.servers.iter().any(|s| s.entry.id == id)
    }

    /// Every tool visible to the agent, in server order.
    pub fn tool_names(&self) -> Vec<&str> {
        self.servers
            .iter()
            .flat_map(|s| s.tools.iter().map(String::as_str))
            .collect()
    }
}

/// Resolve the servers and tools visible to `caller`.
pub fn resolve_mcp_servers(
    caller: &ScopeChain,
    registered: &[McpServerEntry],
    overrides: &LevelChain<DisabledOverrideSet>,
) -> EffectiveMcpServers {
    let mut result = EffectiveMcpServers::default();

    let mut candidates: Vec<&McpServerEntry> = registered
        .iter()
        .filter(|entry| entry.owner.is_ancestor_or_equal(caller))
        .collect();
    candidates.sort_by(|a, b| {
        a.scope_level()
            .cmp(&b.scope_level())
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.id.cmp(&b.id))
    });

    for entry in candidates {
        if !entry.enabled {
            result.disabled_reasons.insert(entry.id, entry.scope_level());
            continue;
        }
        let disabled_at = overrides
            .iter()
            .find(|(_, set)| set.server_ids.contains(&entry.id))
            .map(|(level, _)| level);
        if let Some(level) = disabled_at {
            result.disabled_reasons.insert(entry.id, level);
            continue;
        }

        let mut tools = Vec::with_capacity(entry.tools.len());
        for tool in &entry.tools {
            let exposed = entry.exposed_tool_name(tool);
            let tool_disabled_at = overrides
                .iter()
                .find(|(_, set)| set.tool_names.contains(tool) || set.tool_names.contains(&exposed))
                .map(|(level, _)| level);
            match tool_disabled_at {
                Some(level) => {
                    result.disabled_tools.insert(exposed, level);
                }
                None => tools.push(exposed),
            }
        }

        result.servers.push(EffectiveMcpServer {
            entry: entry.clone(),
            tools,
        });
    }

    result
}

/// Registration would exceed the effective server quota.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{level}-scoped MCP server limit reached: {current} of {limit} (bound by {bound_by})")]
pub struct QuotaExceededError {
    pub level: SettingsLevel,
    pub limit: u32,
    pub current: usize,
    pub bound_by: SettingsLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServerLimitError {
    #[error(transparent)]
    InvalidScope(#[from] InvalidScopeError),

    #[error(transparent)]
    QuotaExceeded(#[from] QuotaExceededError),
}

/// Check that one more server at `new_server_level` fits under the effective quota.
///
/// `existing` is the set of registered servers visible to `caller`; only those owned
/// by exactly the new server's owner scope are counted. Org-scoped servers are not
/// limited.
///
/// # Errors
///
/// - `InvalidScope`: `new_server_level` is deeper than `caller`
/// - `QuotaExceeded`: the owner scope is already at its limit
pub fn check_server_limits(
    caller: &ScopeChain,
    new_server_level: SettingsLevel,
    existing: &[McpServerEntry],
    settings: &EffectiveSettingsView,
) -> Result<(), ServerLimitError> {
    let owner = caller.truncate(new_server_level)?;
    let Some(quota) = settings.server_quota(new_server_level) else {
        return Ok(());
    };

    let current = existing.iter().filter(|entry| entry.owner == owner).count();
    if current >= quota.value as usize {
        return Err(QuotaExceededError {
            level: new_server_level,
            limit: quota.value,
            current,
            bound_by: quota.bound_by,
        }
        .into());
    }
    Ok(())
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Policy Snapshot
//
// YAML document holding every per-level record of one or more tenants.
// Used to seed the in-memory stores for local evaluation and tests.
//
// ```yaml
// settings:
//   - scope: { org_id: "..." }
//     record:
//       features: { memory_enabled: false }
//       mcp_max_servers_per_team: 8
// guardrails:
//   - scope: { org_id: "...", team_id: "..." }
//     record:
//       rules:
//         - { id: project-x, kind: keyword, pattern: "project x", action: block }
//       builtin_pii:
//         email: { enabled: true, action: redact }
// mcp_servers:
//   - { id: "...", name: github, owner: { org_id: "..." }, tools: [create_issue] }
// disabled_overrides:
//   - scope: { org_id: "..." }
//     record: { tool_names: [delete_repo] }
// ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::domain::guardrail::GuardrailRuleSet;
use crate::domain::mcp::{DisabledOverrideSet, McpServerEntry};
use crate::domain::repository::{
    GuardrailRepository, McpServerRepository, RepositoryError, SettingsRepository,
};
use crate::domain::scope::{ScopeChain, ScopeKey, SettingsLevel};
use crate::domain::settings::SettingsRecord;
use crate::infrastructure::repositories::{
    InMemoryGuardrailRepository, InMemoryMcpServerRepository, InMemorySettingsRepository,
};

/// A record stored at the most specific level of `scope`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopedRecord<T> {
    pub scope: ScopeChain,
    pub record: T,
}

impl<T> ScopedRecord<T> {
    pub fn key(&self) -> ScopeKey {
        self.scope.leaf_key()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    #[serde(default)]
    pub settings: Vec<ScopedRecord<SettingsRecord>>,
    #[serde(default)]
    pub guardrails: Vec<ScopedRecord<GuardrailRuleSet>>,
    #[serde(default)]
    pub mcp_servers: Vec<McpServerEntry>,
    #[serde(default)]
    pub disabled_overrides: Vec<ScopedRecord<DisabledOverrideSet>>,
}

impl PolicySnapshot {
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let snapshot: Self = serde_yaml::from_str(yaml)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn to_yaml_string(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Reject records that could never have been stored: duplicate keys, user
    /// level quotas, duplicate server ids and rule sets that do not compile.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut seen = HashSet::new();
        for entry in &self.settings {
            if !seen.insert(entry.key()) {
                anyhow::bail!("duplicate settings record for {}", entry.scope);
            }
            let record = &entry.record;
            if entry.scope.level() == SettingsLevel::User
                && (record.mcp_max_servers_per_team.is_some() || record.mcp_max_servers_per_user.is_some())
            {
                anyhow::bail!("user-level settings for {} cannot carry server quotas", entry.scope);
            }
        }

        let mut seen = HashSet::new();
        for entry in &self.guardrails {
            if !seen.insert(entry.key()) {
                anyhow::bail!("duplicate guardrail record for {}", entry.scope);
            }
            entry
                .record
                .validate()
                .map_err(|e| anyhow::anyhow!("guardrails for {}: {}", entry.scope, e))?;
        }

        let mut seen = HashSet::new();
        for server in &self.mcp_servers {
            if !seen.insert(server.id) {
                anyhow::bail!("duplicate MCP server id {}", server.id);
            }
        }

        let mut seen = HashSet::new();
        for entry in &self.disabled_overrides {
            if !seen.insert(entry.key()) {
                anyhow::bail!("duplicate disabled overrides for {}", entry.scope);
            }
        }
        Ok(())
    }

    /// Write every record into the given stores
    pub async fn load_into(
        &self,
        settings: &dyn SettingsRepository,
        guardrails: &dyn GuardrailRepository,
        mcp: &dyn McpServerRepository,
    ) -> Result<(), RepositoryError> {
        for entry in &self.settings {
            settings.save_settings(entry.key(), &entry.record).await?;
        }
        for entry in &self.guardrails {
            guardrails.save_guardrails(entry.key(), &entry.record).await?;
        }
        for server in &self.mcp_servers {
            mcp.save_mcp_server(server).await?;
        }
        for entry in &self.disabled_overrides {
            mcp.save_disabled_overrides(entry.key(), &entry.record).await?;
        }

        info!(
            "Loaded policy snapshot: {} settings, {} guardrail sets, {} MCP servers, {} disable lists",
            self.settings.len(),
            self.guardrails.len(),
            self.mcp_servers.len(),
            self.disabled_overrides.len()
        );
        Ok(())
    }
}

/// The three in-memory stores, sharing contents across clones
#[derive(Clone, Default)]
pub struct InMemoryPolicyStores {
    pub settings: Arc<InMemorySettingsRepository>,
    pub guardrails: Arc<InMemoryGuardrailRepository>,
    pub mcp: Arc<InMemoryMcpServerRepository>,
}

impl InMemoryPolicyStores {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn from_snapshot(snapshot: &PolicySnapshot) -> Result<Self, RepositoryError> {
        let stores = Self::new();
        snapshot
            .load_into(stores.settings.as_ref(), stores.guardrails.as_ref(), stores.mcp.as_ref())
            .await?;
        Ok(stores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::guardrail::PiiType;
    use crate::domain::scope::{OrgId, TeamId, UserId};
    use crate::domain::settings::FeatureKey;

    const ORG: &str = "6f1f3b1e-2c4d-4e8a-9b0c-1d2e3f4a5b6c";
    const TEAM: &str = "0a1b2c3d-4e5f-4a6b-8c7d-9e0f1a2b3c4d";

    fn yaml() -> String {
        format!(
            r#"
settings:
  - scope: {{ org_id: "{ORG}" }}
    record:
      features: {{ memory_enabled: false }}
      mcp_max_servers_per_team: 8
guardrails:
  - scope: {{ org_id: "{ORG}", team_id: "{TEAM}" }}
    record:
      rules:
        - {{ id: project-x, kind: keyword, pattern: "project x", action: block }}
      builtin_pii:
        email: {{ enabled: true, action: redact }}
mcp_servers:
  - {{ id: "11111111-2222-4333-8444-555555555555", name: github, owner: {{ org_id: "{ORG}" }}, tools: [create_issue] }}
disabled_overrides:
  - scope: {{ org_id: "{ORG}" }}
    record: {{ tool_names: [delete_repo] }}
"#
        )
    }

    #[tokio::test]
    async fn test_snapshot_seeds_stores() {
        let snapshot = PolicySnapshot::from_yaml_str(&yaml()).unwrap();
        let stores = InMemoryPolicyStores::from_snapshot(&snapshot).await.unwrap();

        let org = OrgId::from_string(ORG).unwrap();
        let team = TeamId::from_string(TEAM).unwrap();

        let settings = stores.settings.get_settings(ScopeKey::Org(org)).await.unwrap().unwrap();
        assert_eq!(settings.feature(FeatureKey::MemoryEnabled), Some(false));
        assert_eq!(settings.mcp_max_servers_per_team, Some(8));

        let rules = stores.guardrails.get_guardrails(ScopeKey::Team(team)).await.unwrap().unwrap();
        assert!(rules.contains_rule("project-x"));
        assert!(rules.builtin_pii.contains_key(&PiiType::Email));

        let caller = ScopeChain::for_user(org, team, UserId::new());
        assert_eq!(stores.mcp.list_mcp_servers(&caller).await.unwrap().len(), 1);
        let overrides = stores.mcp.get_disabled_overrides(ScopeKey::Org(org)).await.unwrap();
        assert!(overrides.tool_names.contains("delete_repo"));
    }

    #[test]
    fn test_snapshot_rejects_user_quota() {
        let yaml = format!(
            r#"
settings:
  - scope: {{ org_id: "{ORG}", team_id: "{TEAM}", user_id: "{ORG}" }}
    record: {{ mcp_max_servers_per_user: 2 }}
"#
        );
        assert!(PolicySnapshot::from_yaml_str(&yaml).is_err());
    }

    #[test]
    fn test_snapshot_rejects_invalid_rule() {
        let yaml = format!(
            r#"
guardrails:
  - scope: {{ org_id: "{ORG}" }}
    record:
      rules:
        - {{ id: broken, kind: regex, pattern: "([a-z", action: block }}
"#
        );
        let err = PolicySnapshot::from_yaml_str(&yaml).unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_snapshot_rejects_unnested_scope() {
        let yaml = format!(
            r#"
settings:
  - scope: {{ org_id: "{ORG}", user_id: "{TEAM}" }}
    record: {{}}
"#
        );
        assert!(PolicySnapshot::from_yaml_str(&yaml).is_err());
    }
}

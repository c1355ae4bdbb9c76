// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Settings Resolver
//!
//! Feature-visibility toggles and MCP quotas owned by each tenancy level, and the
//! resolution of an [`EffectiveSettingsView`] from the Org/Team/User records via
//! the [`super::merge`] reducers.
//!
//! Every flag is resolved independently with first-disabler-wins; both quotas with
//! minimum-wins over the Org and Team records (quotas do not exist at User level).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::merge::{merge_flag, merge_quota, EffectiveFlag, EffectiveQuota, LevelChain};
use super::scope::SettingsLevel;

pub const DEFAULT_MAX_SERVERS_PER_TEAM: u32 = 10;
pub const DEFAULT_MAX_SERVERS_PER_USER: u32 = 5;

/// Boolean feature keys carried by a [`SettingsRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKey {
    ChatEnabled,
    ChatPanelEnabled,
    MemoryEnabled,
    McpEnabled,
    McpToolApprovalRequired,
}

impl FeatureKey {
    pub const ALL: [FeatureKey; 5] = [
        FeatureKey::ChatEnabled,
        FeatureKey::ChatPanelEnabled,
        FeatureKey::MemoryEnabled,
        FeatureKey::McpEnabled,
        FeatureKey::McpToolApprovalRequired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureKey::ChatEnabled => "chat_enabled",
            FeatureKey::ChatPanelEnabled => "chat_panel_enabled",
            FeatureKey::MemoryEnabled => "memory_enabled",
            FeatureKey::McpEnabled => "mcp_enabled",
            FeatureKey::McpToolApprovalRequired => "mcp_tool_approval_required",
        }
    }
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FeatureKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| format!("unknown feature key '{}'", s))
    }
}

/// Values used when a level has no stored record yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsDefaults {
    #[serde(default)]
    pub features: BTreeMap<FeatureKey, bool>,
    #[serde(default = "default_max_servers_per_team")]
    pub mcp_max_servers_per_team: u32,
    #[serde(default = "default_max_servers_per_user")]
    pub mcp_max_servers_per_user: u32,
}

impl Default for SettingsDefaults {
    fn default() -> Self {
        Self {
            features: BTreeMap::new(),
            mcp_max_servers_per_team: DEFAULT_MAX_SERVERS_PER_TEAM,
            mcp_max_servers_per_user: DEFAULT_MAX_SERVERS_PER_USER,
        }
    }
}

impl SettingsDefaults {
    /// Default for a flag; anything not listed is permissive (`true`).
    pub fn feature(&self, key: FeatureKey) -> bool {
        self.features.get(&key).copied().unwrap_or(true)
    }
}

fn default_max_servers_per_team() -> u32 {
    DEFAULT_MAX_SERVERS_PER_TEAM
}

fn default_max_servers_per_user() -> u32 {
    DEFAULT_MAX_SERVERS_PER_USER
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsUpdateError {
    #[error("quota '{field}' cannot be set at {level} level")]
    QuotaNotAllowed { field: &'static str, level: SettingsLevel },
}

/// Partial update applied to exactly one level's record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default)]
    pub features: BTreeMap<FeatureKey, bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_max_servers_per_team: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_max_servers_per_user: Option<u32>,
}

/// Stored settings of one level.
///
/// A missing feature key means the level does not express an opinion on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsRecord {
    #[serde(default)]
    pub features: BTreeMap<FeatureKey, bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_max_servers_per_team: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_max_servers_per_user: Option<u32>,
}

impl SettingsRecord {
    /// Record synthesized on first read of `level`.
    ///
    /// Every flag takes its default. Only the Org record carries the default
    /// quotas: a lazily created Team record inherits the Org ceiling instead of
    /// pinning today's default.
    pub fn with_defaults(level: SettingsLevel, defaults: &SettingsDefaults) -> Self {
        let features = FeatureKey::ALL.into_iter().map(|key| (key, defaults.feature(key))).collect();
        let (per_team, per_user) = match level {
            SettingsLevel::Org => (
                Some(defaults.mcp_max_servers_per_team),
                Some(defaults.mcp_max_servers_per_user),
            ),
            SettingsLevel::Team | SettingsLevel::User => (None, None),
        };
        Self {
            features,
            mcp_max_servers_per_team: per_team,
            mcp_max_servers_per_user: per_user,
        }
    }

    pub fn feature(&self, key: FeatureKey) -> Option<bool> {
        self.features.get(&key).copied()
    }

    /// Apply `update` to this record, which belongs to `level`.
    ///
    /// # Errors
    ///
    /// `QuotaNotAllowed` when a quota is set on a User-level record.
    pub fn apply(&mut self, level: SettingsLevel, update: SettingsUpdate) -> Result<(), SettingsUpdateError> {
        if level == SettingsLevel::User {
            if update.mcp_max_servers_per_team.is_some() {
                return Err(SettingsUpdateError::QuotaNotAllowed { field: "mcp_max_servers_per_team", level });
            }
            if update.mcp_max_servers_per_user.is_some() {
                return Err(SettingsUpdateError::QuotaNotAllowed { field: "mcp_max_servers_per_user", level });
            }
        }

        self.features.extend(update.features);
        if let Some(quota) = update.mcp_max_servers_per_team {
            self.mcp_max_servers_per_team = Some(quota);
        }
        if let Some(quota) = update.mcp_max_servers_per_user {
            self.mcp_max_servers_per_user = Some(quota);
        }
        Ok(())
    }
}

/// Effective settings for one scope chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveSettingsView {
    pub chat_enabled: EffectiveFlag,
    pub chat_panel_enabled: EffectiveFlag,
    pub memory_enabled: EffectiveFlag,
    pub mcp_enabled: EffectiveFlag,
    pub mcp_tool_approval_required: EffectiveFlag,
    pub mcp_max_servers_per_team: EffectiveQuota,
    pub mcp_max_servers_per_user: EffectiveQuota,
}

impl EffectiveSettingsView {
    pub fn flag(&self, key: FeatureKey) -> EffectiveFlag {
        match key {
            FeatureKey::ChatEnabled => self.chat_enabled,
            FeatureKey::ChatPanelEnabled => self.chat_panel_enabled,
            FeatureKey::MemoryEnabled => self.memory_enabled,
            FeatureKey::McpEnabled => self.mcp_enabled,
            FeatureKey::McpToolApprovalRequired => self.mcp_tool_approval_required,
        }
    }

    pub fn is_enabled(&self, key: FeatureKey) -> bool {
        self.flag(key).value
    }

    /// Effective per-scope server quota for a new server at `level`; Org-scoped
    /// servers are not limited.
    pub fn server_quota(&self, level: SettingsLevel) -> Option<EffectiveQuota> {
        match level {
            SettingsLevel::Org => None,
            SettingsLevel::Team => Some(self.mcp_max_servers_per_team),
            SettingsLevel::User => Some(self.mcp_max_servers_per_user),
        }
    }
}

/// Resolve the effective settings from the records of each level.
///
/// A missing Org record is synthesized from `defaults`; missing Team/User records
/// contribute nothing.
pub fn resolve_settings(records: &LevelChain<SettingsRecord>, defaults: &SettingsDefaults) -> EffectiveSettingsView {
    let synthesized;
    let org = match records.org.as_ref() {
        Some(record) => record,
        None => {
            synthesized = SettingsRecord::with_defaults(SettingsLevel::Org, defaults);
            &synthesized
        }
    };
    let chain = LevelChain {
        org: Some(org),
        team: records.team.as_ref(),
        user: records.user.as_ref(),
    };

    let flag = |key: FeatureKey| merge_flag(&chain.project(|record| record.feature(key)));

    let quota = |select: fn(&SettingsRecord) -> Option<u32>, default: u32| {
        let quotas = LevelChain {
            org: Some(select(org).unwrap_or(default)),
            team: chain.team.and_then(select),
            user: None,
        };
        merge_quota(&quotas).unwrap_or(EffectiveQuota { value: default, bound_by: SettingsLevel::Org })
    };

    EffectiveSettingsView {
        chat_enabled: flag(FeatureKey::ChatEnabled),
        chat_panel_enabled: flag(FeatureKey::ChatPanelEnabled),
        memory_enabled: flag(FeatureKey::MemoryEnabled),
        mcp_enabled: flag(FeatureKey::McpEnabled),
        mcp_tool_approval_required: flag(FeatureKey::McpToolApprovalRequired),
        mcp_max_servers_per_team: quota(|r: &SettingsRecord| r.mcp_max_servers_per_team, defaults.mcp_max_servers_per_team),
        mcp_max_servers_per_user: quota(|r: &SettingsRecord| r.mcp_max_servers_per_user, defaults.mcp_max_servers_per_user),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(features: &[(FeatureKey, bool)]) -> SettingsRecord {
        SettingsRecord {
            features: features.iter().copied().collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_no_records_resolves_to_permissive_defaults() {
        let view = resolve_settings(&LevelChain::new(), &SettingsDefaults::default());
        for key in FeatureKey::ALL {
            assert_eq!(view.flag(key), EffectiveFlag::ENABLED);
        }
        assert_eq!(view.mcp_max_servers_per_team.value, 10);
        assert_eq!(view.mcp_max_servers_per_user.value, 5);
    }

    #[test]
    fn test_org_disable_overrides_lower_enables() {
        let records = LevelChain::new()
            .with(SettingsLevel::Org, record(&[(FeatureKey::ChatEnabled, false)]))
            .with(SettingsLevel::Team, record(&[(FeatureKey::ChatEnabled, true)]))
            .with(SettingsLevel::User, record(&[(FeatureKey::ChatEnabled, true)]));

        let view = resolve_settings(&records, &SettingsDefaults::default());
        assert!(!view.chat_enabled.value);
        assert_eq!(view.chat_enabled.disabled_by, Some(SettingsLevel::Org));
        assert!(view.memory_enabled.value);
    }

    #[test]
    fn test_fields_resolve_independently() {
        let records = LevelChain::new()
            .with(SettingsLevel::Team, record(&[(FeatureKey::MemoryEnabled, false)]))
            .with(SettingsLevel::User, record(&[(FeatureKey::McpEnabled, false)]));

        let view = resolve_settings(&records, &SettingsDefaults::default());
        assert_eq!(view.memory_enabled.disabled_by, Some(SettingsLevel::Team));
        assert_eq!(view.mcp_enabled.disabled_by, Some(SettingsLevel::User));
        assert!(view.chat_enabled.value);
    }

    #[test]
    fn test_team_quota_only_lowers() {
        let team = SettingsRecord {
            mcp_max_servers_per_team: Some(25),
            mcp_max_servers_per_user: Some(2),
            ..Default::default()
        };
        let records = LevelChain::new().with(SettingsLevel::Team, team);

        let view = resolve_settings(&records, &SettingsDefaults::default());
        assert_eq!(view.mcp_max_servers_per_team, EffectiveQuota { value: 10, bound_by: SettingsLevel::Org });
        assert_eq!(view.mcp_max_servers_per_user, EffectiveQuota { value: 2, bound_by: SettingsLevel::Team });
    }

    #[test]
    fn test_user_level_rejects_quota_update() {
        let mut user = SettingsRecord::with_defaults(SettingsLevel::User, &SettingsDefaults::default());
        let update = SettingsUpdate {
            mcp_max_servers_per_user: Some(1),
            ..Default::default()
        };
        assert!(matches!(
            user.apply(SettingsLevel::User, update),
            Err(SettingsUpdateError::QuotaNotAllowed { .. })
        ));
        assert_eq!(user.mcp_max_servers_per_user, None);
    }

    #[test]
    fn test_feature_key_parses_wire_names() {
        assert_eq!("mcp_tool_approval_required".parse::<FeatureKey>(), Ok(FeatureKey::McpToolApprovalRequired));
        assert!("telepathy_enabled".parse::<FeatureKey>().is_err());
    }
}

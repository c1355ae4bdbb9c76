// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Cascade tests for the settings resolver.
//!
//! Flags follow first-disabler-wins from Org down to User; quotas take the
//! minimum of the defined levels with ties reported at the enclosing level.

use std::collections::BTreeMap;
use strata_core::domain::merge::LevelChain;
use strata_core::domain::scope::SettingsLevel;
use strata_core::domain::settings::{
    resolve_settings, FeatureKey, SettingsDefaults, SettingsRecord, SettingsUpdate,
};

fn record(features: &[(FeatureKey, bool)]) -> SettingsRecord {
    SettingsRecord {
        features: features.iter().copied().collect(),
        ..Default::default()
    }
}

fn quotas(per_team: Option<u32>, per_user: Option<u32>) -> SettingsRecord {
    SettingsRecord {
        features: BTreeMap::new(),
        mcp_max_servers_per_team: per_team,
        mcp_max_servers_per_user: per_user,
    }
}

#[test]
fn test_org_disable_wins_over_lower_enables() {
    let chain = LevelChain::new()
        .with(SettingsLevel::Org, record(&[(FeatureKey::ChatEnabled, false)]))
        .with(SettingsLevel::Team, record(&[(FeatureKey::ChatEnabled, true)]))
        .with(SettingsLevel::User, record(&[(FeatureKey::ChatEnabled, true)]));

    let view = resolve_settings(&chain, &SettingsDefaults::default());

    assert!(!view.chat_enabled.value);
    assert_eq!(view.chat_enabled.disabled_by, Some(SettingsLevel::Org));
}

#[test]
fn test_every_flag_cascades_independently() {
    let chain = LevelChain::new()
        .with(SettingsLevel::Team, record(&[(FeatureKey::MemoryEnabled, false)]))
        .with(
            SettingsLevel::User,
            record(&[(FeatureKey::McpToolApprovalRequired, false), (FeatureKey::MemoryEnabled, true)]),
        );

    let view = resolve_settings(&chain, &SettingsDefaults::default());

    for key in FeatureKey::ALL {
        let flag = view.flag(key);
        match key {
            FeatureKey::MemoryEnabled => assert_eq!(flag.disabled_by, Some(SettingsLevel::Team)),
            FeatureKey::McpToolApprovalRequired => assert_eq!(flag.disabled_by, Some(SettingsLevel::User)),
            _ => assert!(flag.value, "{} should stay enabled", key),
        }
    }
}

#[test]
fn test_missing_org_record_uses_defaults() {
    let mut defaults = SettingsDefaults::default();
    defaults.features.insert(FeatureKey::ChatPanelEnabled, false);
    defaults.mcp_max_servers_per_team = 7;

    let view = resolve_settings(&LevelChain::new(), &defaults);

    assert_eq!(view.chat_panel_enabled.disabled_by, Some(SettingsLevel::Org));
    assert_eq!(view.mcp_max_servers_per_team.value, 7);
    assert_eq!(view.mcp_max_servers_per_team.bound_by, SettingsLevel::Org);
    assert_eq!(view.mcp_max_servers_per_user.value, 5);
}

#[test]
fn test_team_can_only_lower_org_quota() {
    let raising = LevelChain::new()
        .with(SettingsLevel::Org, quotas(Some(10), Some(5)))
        .with(SettingsLevel::Team, quotas(Some(25), Some(8)));
    let view = resolve_settings(&raising, &SettingsDefaults::default());
    assert_eq!(view.mcp_max_servers_per_team.value, 10);
    assert_eq!(view.mcp_max_servers_per_team.bound_by, SettingsLevel::Org);
    assert_eq!(view.mcp_max_servers_per_user.value, 5);

    let lowering = LevelChain::new()
        .with(SettingsLevel::Org, quotas(Some(10), Some(5)))
        .with(SettingsLevel::Team, quotas(Some(3), Some(5)));
    let view = resolve_settings(&lowering, &SettingsDefaults::default());
    assert_eq!(view.mcp_max_servers_per_team.value, 3);
    assert_eq!(view.mcp_max_servers_per_team.bound_by, SettingsLevel::Team);
    // tie goes to the enclosing level
    assert_eq!(view.mcp_max_servers_per_user.bound_by, SettingsLevel::Org);
}

#[test]
fn test_org_quota_without_team_override() {
    let chain = LevelChain::new().with(SettingsLevel::Org, quotas(Some(10), None));
    let view = resolve_settings(&chain, &SettingsDefaults::default());
    assert_eq!(view.mcp_max_servers_per_team.value, 10);
}

#[test]
fn test_lazily_created_team_record_inherits_org_quota() {
    let defaults = SettingsDefaults::default();
    let mut team = SettingsRecord::with_defaults(SettingsLevel::Team, &defaults);
    team.apply(
        SettingsLevel::Team,
        SettingsUpdate {
            features: [(FeatureKey::ChatEnabled, false)].into_iter().collect(),
            ..Default::default()
        },
    )
    .unwrap();

    let chain = LevelChain::new()
        .with(SettingsLevel::Org, quotas(Some(4), Some(2)))
        .with(SettingsLevel::Team, team);
    let view = resolve_settings(&chain, &defaults);

    assert_eq!(view.mcp_max_servers_per_team.value, 4);
    assert_eq!(view.chat_enabled.disabled_by, Some(SettingsLevel::Team));
}

#[test]
fn test_user_record_cannot_set_quotas() {
    let mut user = SettingsRecord::default();
    let result = user.apply(
        SettingsLevel::User,
        SettingsUpdate {
            mcp_max_servers_per_team: Some(1),
            ..Default::default()
        },
    );
    assert!(result.is_err());
    assert_eq!(user, SettingsRecord::default());
}

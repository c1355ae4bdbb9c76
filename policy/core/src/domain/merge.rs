// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Override Merger
//!
//! Generic reducers over a chain of same-shaped values ordered Org → Team → User.
//!
//! - [`merge_flag`]: first-disabler-wins. The first level holding `false` fixes the
//!   effective value to `false` and is reported as `disabled_by`; lower levels cannot
//!   re-enable it.
//! - [`merge_quota`]: minimum-wins. Team may lower the Org quota, never raise it.
//!
//! Absent levels are skipped ("inherits/allows").

use serde::{Deserialize, Serialize};

use super::scope::SettingsLevel;

/// One optional value per tenancy level, iterated in precedence order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelChain<T> {
    pub org: Option<T>,
    pub team: Option<T>,
    pub user: Option<T>,
}

impl<T> Default for LevelChain<T> {
    fn default() -> Self {
        Self { org: None, team: None, user: None }
    }
}

impl<T> LevelChain<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, level: SettingsLevel, value: T) -> Self {
        self.set(level, Some(value));
        self
    }

    pub fn get(&self, level: SettingsLevel) -> Option<&T> {
        match level {
            SettingsLevel::Org => self.org.as_ref(),
            SettingsLevel::Team => self.team.as_ref(),
            SettingsLevel::User => self.user.as_ref(),
        }
    }

    pub fn set(&mut self, level: SettingsLevel, value: Option<T>) {
        match level {
            SettingsLevel::Org => self.org = value,
            SettingsLevel::Team => self.team = value,
            SettingsLevel::User => self.user = value,
        }
    }

    /// Present levels, Org first.
    pub fn iter(&self) -> impl Iterator<Item = (SettingsLevel, &T)> + '_ {
        SettingsLevel::ALL
            .into_iter()
            .filter_map(move |level| self.get(level).map(|value| (level, value)))
    }

    /// Project every present level through `f`; `None` results count as absent.
    pub fn project<U>(&self, mut f: impl FnMut(&T) -> Option<U>) -> LevelChain<U> {
        LevelChain {
            org: self.org.as_ref().and_then(&mut f),
            team: self.team.as_ref().and_then(&mut f),
            user: self.user.as_ref().and_then(&mut f),
        }
    }
}

/// Effective boolean after merging, with attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveFlag {
    pub value: bool,
    pub disabled_by: Option<SettingsLevel>,
}

impl EffectiveFlag {
    pub const ENABLED: EffectiveFlag = EffectiveFlag { value: true, disabled_by: None };

    pub fn disabled_by(level: SettingsLevel) -> Self {
        Self { value: false, disabled_by: Some(level) }
    }
}

/// Effective quota after merging, with the level that supplied the binding minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveQuota {
    pub value: u32,
    pub bound_by: SettingsLevel,
}

/// First-disabler-wins merge of one boolean field.
pub fn merge_flag(chain: &LevelChain<bool>) -> EffectiveFlag {
    chain
        .iter()
        .find(|(_, enabled)| !**enabled)
        .map(|(level, _)| EffectiveFlag::disabled_by(level))
        .unwrap_or(EffectiveFlag::ENABLED)
}

/// Minimum-wins merge of one quota field.
///
/// Returns `None` only when no level defines the quota; callers synthesize Org
/// defaults first so this does not happen in resolution. On ties the more
/// enclosing level is reported.
pub fn merge_quota(chain: &LevelChain<u32>) -> Option<EffectiveQuota> {
    chain.iter().fold(None, |best: Option<EffectiveQuota>, (level, &value)| match best {
        Some(current) if current.value <= value => Some(current),
        _ => Some(EffectiveQuota { value, bound_by: level }),
    })
}

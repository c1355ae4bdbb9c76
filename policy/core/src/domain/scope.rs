// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Scope Model
//!
//! Defines the three-level tenancy (Organization → Team → User) that every
//! policy concern in this crate is keyed by.
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`OrgId`], [`TeamId`], [`UserId`] | Identifier newtypes for each tenancy level |
//! | [`SettingsLevel`] | The level a record or resource belongs to |
//! | [`ScopeFields`] | Raw identifying fields as populated on a stored resource |
//! | [`ScopeChain`] | Validated (org, team?, user?) identity of a request or resource |
//! | [`ScopeKey`] | A single level's storage key |
//!
//! ## Nesting
//!
//! User scope always implies a Team, and Team scope always implies an Org.
//! [`classify`] and [`ScopeChain::try_new`] enforce this as a hard precondition
//! and fail with [`InvalidScopeError`]; malformed scopes are never corrected.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

macro_rules! scope_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse identifier from string
            pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

scope_id!(
    /// Organization identifier (top of the tenancy)
    OrgId
);
scope_id!(
    /// Team identifier, always nested in an organization
    TeamId
);
scope_id!(
    /// User identifier, always nested in a team
    UserId
);

/// Tenancy level. Ordered from the most enclosing (`Org`) to the most specific (`User`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingsLevel {
    Org,
    Team,
    User,
}

impl SettingsLevel {
    /// All levels in precedence order (Org first).
    pub const ALL: [SettingsLevel; 3] = [SettingsLevel::Org, SettingsLevel::Team, SettingsLevel::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingsLevel::Org => "org",
            SettingsLevel::Team => "team",
            SettingsLevel::User => "user",
        }
    }
}

impl fmt::Display for SettingsLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Malformed scope: a caller contract violation, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidScopeError {
    #[error("scope has a team or user but no organization")]
    MissingOrg,

    #[error("user scope requires a team (user {user_id} has none)")]
    UserWithoutTeam { user_id: UserId },

    #[error("scope chain at level {chain} cannot address a {requested}-level resource")]
    LevelOutOfChain {
        chain: SettingsLevel,
        requested: SettingsLevel,
    },
}

/// Identifying fields as populated on a scoped resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<OrgId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<TeamId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

/// Anything that carries tenancy identifying fields.
pub trait Scoped {
    fn scope_fields(&self) -> ScopeFields;
}

impl Scoped for ScopeFields {
    fn scope_fields(&self) -> ScopeFields {
        *self
    }
}

/// Classify a resource's level from which identifying fields are populated.
///
/// `user_id` set ⇒ User; else `team_id` set ⇒ Team; else Org.
///
/// # Errors
///
/// - `UserWithoutTeam`: `user_id` is set but `team_id` is not
/// - `MissingOrg`: `team_id` or `user_id` is set but `org_id` is not
pub fn classify<R: Scoped + ?Sized>(resource: &R) -> Result<SettingsLevel, InvalidScopeError> {
    let fields = resource.scope_fields();

    if let (Some(user_id), None) = (fields.user_id, fields.team_id) {
        return Err(InvalidScopeError::UserWithoutTeam { user_id });
    }
    if fields.org_id.is_none() && (fields.team_id.is_some() || fields.user_id.is_some()) {
        return Err(InvalidScopeError::MissingOrg);
    }

    Ok(if fields.user_id.is_some() {
        SettingsLevel::User
    } else if fields.team_id.is_some() {
        SettingsLevel::Team
    } else {
        SettingsLevel::Org
    })
}

/// Storage key of a single level's record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "level", content = "id", rename_all = "lowercase")]
pub enum ScopeKey {
    Org(OrgId),
    Team(TeamId),
    User(UserId),
}

impl ScopeKey {
    pub fn level(&self) -> SettingsLevel {
        match self {
            ScopeKey::Org(_) => SettingsLevel::Org,
            ScopeKey::Team(_) => SettingsLevel::Team,
            ScopeKey::User(_) => SettingsLevel::User,
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKey::Org(id) => write!(f, "org:{}", id),
            ScopeKey::Team(id) => write!(f, "team:{}", id),
            ScopeKey::User(id) => write!(f, "user:{}", id),
        }
    }
}

/// Validated (org, team?, user?) identity.
///
/// # Invariants
///
/// - `org_id` is always present.
/// - `user_id` is only present together with `team_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "ScopeFields", into = "ScopeFields")]
pub struct ScopeChain {
    org_id: OrgId,
    team_id: Option<TeamId>,
    user_id: Option<UserId>,
}

impl ScopeChain {
    /// Build a chain from optional identifying fields, enforcing the nesting rule.
    pub fn try_new(
        org_id: Option<OrgId>,
        team_id: Option<TeamId>,
        user_id: Option<UserId>,
    ) -> Result<Self, InvalidScopeError> {
        Self::try_from(ScopeFields { org_id, team_id, user_id })
    }

    pub fn for_org(org_id: OrgId) -> Self {
        Self { org_id, team_id: None, user_id: None }
    }

    pub fn for_team(org_id: OrgId, team_id: TeamId) -> Self {
        Self { org_id, team_id: Some(team_id), user_id: None }
    }

    pub fn for_user(org_id: OrgId, team_id: TeamId, user_id: UserId) -> Self {
        Self { org_id, team_id: Some(team_id), user_id: Some(user_id) }
    }

    pub fn org_id(&self) -> OrgId {
        self.org_id
    }

    pub fn team_id(&self) -> Option<TeamId> {
        self.team_id
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    /// The most specific level present in the chain.
    pub fn level(&self) -> SettingsLevel {
        if self.user_id.is_some() {
            SettingsLevel::User
        } else if self.team_id.is_some() {
            SettingsLevel::Team
        } else {
            SettingsLevel::Org
        }
    }

    /// Storage key for `level`, if the chain reaches that deep.
    pub fn key_at(&self, level: SettingsLevel) -> Option<ScopeKey> {
        match level {
            SettingsLevel::Org => Some(ScopeKey::Org(self.org_id)),
            SettingsLevel::Team => self.team_id.map(ScopeKey::Team),
            SettingsLevel::User => self.user_id.map(ScopeKey::User),
        }
    }

    /// Storage key of the most specific level present.
    pub fn leaf_key(&self) -> ScopeKey {
        match (self.team_id, self.user_id) {
            (_, Some(user_id)) => ScopeKey::User(user_id),
            (Some(team_id), None) => ScopeKey::Team(team_id),
            (None, None) => ScopeKey::Org(self.org_id),
        }
    }

    /// Keys of every level present, Org first.
    pub fn keys(&self) -> impl Iterator<Item = ScopeKey> + '_ {
        SettingsLevel::ALL.into_iter().filter_map(move |level| self.key_at(level))
    }

    /// Truncate the chain to `level`.
    ///
    /// # Errors
    ///
    /// `LevelOutOfChain` when `level` is deeper than the chain itself.
    pub fn truncate(&self, level: SettingsLevel) -> Result<Self, InvalidScopeError> {
        if level > self.level() {
            return Err(InvalidScopeError::LevelOutOfChain {
                chain: self.level(),
                requested: level,
            });
        }
        Ok(Self {
            org_id: self.org_id,
            team_id: if level >= SettingsLevel::Team { self.team_id } else { None },
            user_id: if level >= SettingsLevel::User { self.user_id } else { None },
        })
    }

    /// True when a resource owned at `self` is visible to `caller`.
    ///
    /// An Org-scoped resource is visible to everyone in the org, a Team-scoped one
    /// only inside that team, and a User-scoped one only to its owner.
    pub fn is_ancestor_or_equal(&self, caller: &ScopeChain) -> bool {
        if self.org_id != caller.org_id {
            return false;
        }
        if let Some(team_id) = self.team_id {
            if caller.team_id != Some(team_id) {
                return false;
            }
        }
        if let Some(user_id) = self.user_id {
            if caller.user_id != Some(user_id) {
                return false;
            }
        }
        true
    }
}

impl TryFrom<ScopeFields> for ScopeChain {
    type Error = InvalidScopeError;

    fn try_from(fields: ScopeFields) -> Result<Self, Self::Error> {
        classify(&fields)?;
        let org_id = fields.org_id.ok_or(InvalidScopeError::MissingOrg)?;
        Ok(Self {
            org_id,
            team_id: fields.team_id,
            user_id: fields.user_id,
        })
    }
}

impl From<ScopeChain> for ScopeFields {
    fn from(chain: ScopeChain) -> Self {
        Self {
            org_id: Some(chain.org_id),
            team_id: chain.team_id,
            user_id: chain.user_id,
        }
    }
}

impl Scoped for ScopeChain {
    fn scope_fields(&self) -> ScopeFields {
        (*self).into()
    }
}

impl fmt::Display for ScopeChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "org:{}", self.org_id)?;
        if let Some(team_id) = self.team_id {
            write!(f, "/team:{}", team_id)?;
        }
        if let Some(user_id) = self.user_id {
            write!(f, "/user:{}", user_id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_populated_fields() {
        let org = OrgId::new();
        let team = TeamId::new();
        let user = UserId::new();

        let org_only = ScopeFields { org_id: Some(org), ..Default::default() };
        let team_scoped = ScopeFields { org_id: Some(org), team_id: Some(team), user_id: None };
        let user_scoped = ScopeFields { org_id: Some(org), team_id: Some(team), user_id: Some(user) };

        assert_eq!(classify(&org_only), Ok(SettingsLevel::Org));
        assert_eq!(classify(&team_scoped), Ok(SettingsLevel::Team));
        assert_eq!(classify(&user_scoped), Ok(SettingsLevel::User));
    }

    #[test]
    fn test_classify_rejects_user_without_team() {
        let user = UserId::new();
        let fields = ScopeFields { org_id: Some(OrgId::new()), team_id: None, user_id: Some(user) };
        assert_eq!(classify(&fields), Err(InvalidScopeError::UserWithoutTeam { user_id: user }));
    }

    #[test]
    fn test_chain_requires_org() {
        let result = ScopeChain::try_new(None, Some(TeamId::new()), None);
        assert_eq!(result, Err(InvalidScopeError::MissingOrg));

        let result = ScopeChain::try_new(None, None, None);
        assert_eq!(result, Err(InvalidScopeError::MissingOrg));
    }

    #[test]
    fn test_chain_keys_in_precedence_order() {
        let chain = ScopeChain::for_user(OrgId::new(), TeamId::new(), UserId::new());
        let levels: Vec<_> = chain.keys().map(|k| k.level()).collect();
        assert_eq!(levels, SettingsLevel::ALL.to_vec());

        let team_chain = chain.truncate(SettingsLevel::Team).unwrap();
        assert_eq!(team_chain.level(), SettingsLevel::Team);
        assert!(team_chain.truncate(SettingsLevel::User).is_err());
        assert_eq!(team_chain.leaf_key(), ScopeKey::Team(team_chain.team_id().unwrap()));
    }

    #[test]
    fn test_visibility_follows_nesting() {
        let org = OrgId::new();
        let team = TeamId::new();
        let other_team = TeamId::new();
        let user = UserId::new();

        let caller = ScopeChain::for_user(org, team, user);

        assert!(ScopeChain::for_org(org).is_ancestor_or_equal(&caller));
        assert!(ScopeChain::for_team(org, team).is_ancestor_or_equal(&caller));
        assert!(caller.is_ancestor_or_equal(&caller));
        assert!(!ScopeChain::for_team(org, other_team).is_ancestor_or_equal(&caller));
        assert!(!ScopeChain::for_org(OrgId::new()).is_ancestor_or_equal(&caller));
        assert!(!ScopeChain::for_user(org, team, UserId::new()).is_ancestor_or_equal(&caller));
    }

    #[test]
    fn test_chain_deserialization_enforces_nesting() {
        let json = format!(r#"{{"org_id":"{}","user_id":"{}"}}"#, OrgId::new(), UserId::new());
        assert!(serde_json::from_str::<ScopeChain>(&json).is_err());

        let chain = ScopeChain::for_team(OrgId::new(), TeamId::new());
        let roundtrip: ScopeChain = serde_json::from_str(&serde_json::to_string(&chain).unwrap()).unwrap();
        assert_eq!(roundtrip, chain);
    }
}

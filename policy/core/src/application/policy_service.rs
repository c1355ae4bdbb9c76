// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Tenant Policy Service
//!
//! Application-layer entry point for every policy decision. Fetches the
//! per-level records for a scope chain, hands them to the pure domain
//! evaluators, then logs, counts and audits the outcome.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Orchestrates record fetches and domain evaluation
//!
//! Fetch errors are returned as [`PolicyError::RecordFetch`] and never read as
//! "no restriction". The `screen_*`, `feature_enabled` helpers turn any error
//! into the conservative answer instead.

use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::domain::config::PolicyConfigManifest;
use crate::domain::events::{AuditEvent, AuditEventKind, AuditOutcome, AuditSink};
use crate::domain::guardrail::{
    self, CompiledGuardrails, Direction, GuardrailResult, GuardrailRuleSet, GuardrailStatus, PatternRule, PiiSetting,
    PiiType, RulePatternError,
};
use crate::domain::mcp::{
    self, DisabledOverrideSet, EffectiveMcpServers, McpServerEntry, McpServerId, QuotaExceededError, ServerLimitError,
};
use crate::domain::merge::{EffectiveQuota, LevelChain};
use crate::domain::repository::{
    GuardrailRepository, McpServerRepository, QuotaInsert, RepositoryError, SettingsRepository,
};
use crate::domain::scope::{classify, InvalidScopeError, ScopeChain, ScopeKey, SettingsLevel};
use crate::domain::settings::{
    self, EffectiveSettingsView, FeatureKey, SettingsDefaults, SettingsRecord, SettingsUpdate, SettingsUpdateError,
};

/// Errors returned by [`TenantPolicyService`]
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("invalid scope: {0}")]
    InvalidScope(#[from] InvalidScopeError),

    #[error(transparent)]
    QuotaExceeded(#[from] QuotaExceededError),

    #[error("invalid guardrail rule: {0}")]
    RulePattern(#[from] RulePatternError),

    #[error("invalid settings update: {0}")]
    SettingsUpdate(#[from] SettingsUpdateError),

    #[error("record fetch failed: {0}")]
    RecordFetch(#[from] RepositoryError),

    #[error("text of {len} bytes exceeds the {limit}-byte scan limit")]
    TextTooLarge { len: usize, limit: usize },
}

impl From<ServerLimitError> for PolicyError {
    fn from(err: ServerLimitError) -> Self {
        match err {
            ServerLimitError::InvalidScope(e) => PolicyError::InvalidScope(e),
            ServerLimitError::QuotaExceeded(e) => PolicyError::QuotaExceeded(e),
        }
    }
}

impl PolicyError {
    /// True when the failure came from a dependency rather than from the request.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, PolicyError::RecordFetch(_))
    }
}

fn level_key(chain: &ScopeChain, level: SettingsLevel) -> Result<ScopeKey, InvalidScopeError> {
    chain.key_at(level).ok_or(InvalidScopeError::LevelOutOfChain {
        chain: chain.level(),
        requested: level,
    })
}

pub struct TenantPolicyService {
    settings_repo: Arc<dyn SettingsRepository>,
    guardrail_repo: Arc<dyn GuardrailRepository>,
    mcp_repo: Arc<dyn McpServerRepository>,
    audit: Arc<dyn AuditSink>,
    defaults: SettingsDefaults,
    pii_replacements: BTreeMap<PiiType, String>,
    max_text_bytes: usize,
}

impl TenantPolicyService {
    pub fn new(
        settings_repo: Arc<dyn SettingsRepository>,
        guardrail_repo: Arc<dyn GuardrailRepository>,
        mcp_repo: Arc<dyn McpServerRepository>,
        audit: Arc<dyn AuditSink>,
        config: &PolicyConfigManifest,
    ) -> Self {
        Self {
            settings_repo,
            guardrail_repo,
            mcp_repo,
            audit,
            defaults: config.spec.defaults.clone(),
            pii_replacements: config.spec.guardrails.pii_replacements.clone(),
            max_text_bytes: config.spec.guardrails.max_text_bytes,
        }
    }

    pub fn defaults(&self) -> &SettingsDefaults {
        &self.defaults
    }

    fn record_event(&self, kind: AuditEventKind, scope: &ScopeChain, outcome: AuditOutcome, metadata: serde_json::Value) {
        self.audit.record(AuditEvent::new(kind, *scope, outcome, metadata));
    }

    fn fail_closed(&self, kind: AuditEventKind, scope: &ScopeChain, operation: &'static str, err: &PolicyError) {
        error!("{} failed for scope {}, failing closed: {}", operation, scope, err);
        metrics::counter!("strata_fail_closed_total", "operation" => operation).increment(1);
        self.record_event(kind, scope, AuditOutcome::FailClosed, json!({ "error": err.to_string() }));
    }

    // ------------------------------------------------------------------
    // Record fetches
    // ------------------------------------------------------------------

    async fn fetch_settings(&self, chain: &ScopeChain) -> Result<LevelChain<SettingsRecord>, RepositoryError> {
        let repo = &self.settings_repo;
        let fetch = move |level| async move {
            match chain.key_at(level) {
                Some(key) => repo.get_settings(key).await,
                None => Ok(None),
            }
        };
        let (org, team, user) = futures::try_join!(
            fetch(SettingsLevel::Org),
            fetch(SettingsLevel::Team),
            fetch(SettingsLevel::User)
        )?;
        Ok(LevelChain { org, team, user })
    }

    async fn fetch_guardrails(&self, chain: &ScopeChain) -> Result<LevelChain<GuardrailRuleSet>, RepositoryError> {
        let repo = &self.guardrail_repo;
        let fetch = move |level| async move {
            match chain.key_at(level) {
                Some(key) => repo.get_guardrails(key).await,
                None => Ok(None),
            }
        };
        let (org, team, user) = futures::try_join!(
            fetch(SettingsLevel::Org),
            fetch(SettingsLevel::Team),
            fetch(SettingsLevel::User)
        )?;
        Ok(LevelChain { org, team, user })
    }

    async fn fetch_overrides(&self, chain: &ScopeChain) -> Result<LevelChain<DisabledOverrideSet>, RepositoryError> {
        let repo = &self.mcp_repo;
        let fetch = move |level| async move {
            match chain.key_at(level) {
                Some(key) => repo.get_disabled_overrides(key).await.map(Some),
                None => Ok(None),
            }
        };
        let (org, team, user) = futures::try_join!(
            fetch(SettingsLevel::Org),
            fetch(SettingsLevel::Team),
            fetch(SettingsLevel::User)
        )?;
        Ok(LevelChain { org, team, user })
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    /// Resolve the effective settings for a scope chain
    pub async fn resolve_settings(&self, chain: &ScopeChain) -> Result<EffectiveSettingsView, PolicyError> {
        let records = self.fetch_settings(chain).await?;
        let view = settings::resolve_settings(&records, &self.defaults);

        debug!("Resolved settings for {}: {:?}", chain, view);
        metrics::counter!("strata_settings_resolutions_total").increment(1);
        self.record_event(
            AuditEventKind::SettingsResolved,
            chain,
            AuditOutcome::Allowed,
            json!({
                "mcp_max_servers_per_team": view.mcp_max_servers_per_team.value,
                "mcp_max_servers_per_user": view.mcp_max_servers_per_user.value,
            }),
        );
        Ok(view)
    }

    /// Whether `feature` is on for the chain. Any failure reads as "off".
    pub async fn feature_enabled(&self, chain: &ScopeChain, feature: FeatureKey) -> bool {
        match self.resolve_settings(chain).await {
            Ok(view) => view.is_enabled(feature),
            Err(e) => {
                self.fail_closed(AuditEventKind::SettingsResolved, chain, "feature_enabled", &e);
                false
            }
        }
    }

    /// Apply a partial update to the settings record of `level`, creating the
    /// record from defaults when the level has none yet.
    pub async fn update_settings(
        &self,
        chain: &ScopeChain,
        level: SettingsLevel,
        update: SettingsUpdate,
    ) -> Result<SettingsRecord, PolicyError> {
        let key = level_key(chain, level)?;
        let mut record = self
            .settings_repo
            .get_settings(key)
            .await?
            .unwrap_or_else(|| SettingsRecord::with_defaults(level, &self.defaults));

        let changed: Vec<&str> = update.features.keys().map(FeatureKey::as_str).collect();
        let metadata = json!({ "level": level, "features": changed });
        record.apply(level, update)?;
        self.settings_repo.save_settings(key, &record).await?;

        info!("Updated {} settings for {}", level, key);
        self.record_event(AuditEventKind::SettingsUpdated, &chain.truncate(level)?, AuditOutcome::Allowed, metadata);
        Ok(record)
    }

    // ------------------------------------------------------------------
    // Guardrails
    // ------------------------------------------------------------------

    /// Screen a user message
    pub async fn check_input(&self, chain: &ScopeChain, text: &str) -> Result<GuardrailResult, PolicyError> {
        self.check(chain, text, Direction::Input).await
    }

    /// Screen a model response
    pub async fn check_output(&self, chain: &ScopeChain, text: &str) -> Result<GuardrailResult, PolicyError> {
        self.check(chain, text, Direction::Output).await
    }

    async fn check(&self, chain: &ScopeChain, text: &str, direction: Direction) -> Result<GuardrailResult, PolicyError> {
        if text.len() > self.max_text_bytes {
            return Err(PolicyError::TextTooLarge {
                len: text.len(),
                limit: self.max_text_bytes,
            });
        }

        let rule_sets = self.fetch_guardrails(chain).await?;
        let compiled = CompiledGuardrails::compile(&rule_sets, &self.pii_replacements)?;
        let result = compiled.evaluate(text, direction);

        for m in &result.matches {
            debug!("Guardrail {} ({}) matched {}..{} on {}", m.rule_id, m.level, m.start, m.end, direction);
        }
        let outcome = match result.status {
            GuardrailStatus::Blocked => {
                let rules: Vec<&str> = result.blocking_matches().map(|m| m.rule_id.as_str()).collect();
                warn!("Blocked {} for {}: rules {:?}", direction, chain, rules);
                AuditOutcome::Blocked
            }
            GuardrailStatus::Redacted => {
                info!("Redacted {} for {} ({} matches)", direction, chain, result.matches.len());
                AuditOutcome::Redacted
            }
            GuardrailStatus::Clean => AuditOutcome::Allowed,
        };

        metrics::counter!(
            "strata_guardrail_checks_total",
            "direction" => direction.as_str(),
            "status" => result.status.as_str()
        )
        .increment(1);

        let rule_ids: Vec<&str> = result.matches.iter().map(|m| m.rule_id.as_str()).collect();
        self.record_event(
            AuditEventKind::GuardrailChecked,
            chain,
            outcome,
            json!({ "direction": direction, "active_rules": compiled.len(), "matched_rules": rule_ids }),
        );
        Ok(result)
    }

    /// [`check_input`](Self::check_input), blocking on any failure
    pub async fn screen_input(&self, chain: &ScopeChain, text: &str) -> GuardrailResult {
        self.screen(chain, text, Direction::Input).await
    }

    /// [`check_output`](Self::check_output), blocking on any failure
    pub async fn screen_output(&self, chain: &ScopeChain, text: &str) -> GuardrailResult {
        self.screen(chain, text, Direction::Output).await
    }

    async fn screen(&self, chain: &ScopeChain, text: &str, direction: Direction) -> GuardrailResult {
        match self.check(chain, text, direction).await {
            Ok(result) => result,
            Err(e) => {
                self.fail_closed(AuditEventKind::GuardrailChecked, chain, "guardrail_check", &e);
                GuardrailResult::fail_closed(direction)
            }
        }
    }

    /// Add a custom rule to the rule set of `level`
    pub async fn define_guardrail_rule(
        &self,
        chain: &ScopeChain,
        level: SettingsLevel,
        rule: PatternRule,
    ) -> Result<(), PolicyError> {
        let key = level_key(chain, level)?;
        rule.compile()?;

        let mut rule_set = self.guardrail_repo.get_guardrails(key).await?.unwrap_or_default();
        if rule_set.contains_rule(&rule.id) {
            return Err(RulePatternError::DuplicateRuleId { rule_id: rule.id }.into());
        }
        let rule_id = rule.id.clone();
        rule_set.rules.push(rule);
        rule_set.validate()?;
        self.guardrail_repo.save_guardrails(key, &rule_set).await?;

        info!("Defined guardrail rule '{}' at {}", rule_id, key);
        self.record_event(
            AuditEventKind::GuardrailRuleDefined,
            &chain.truncate(level)?,
            AuditOutcome::Allowed,
            json!({ "rule_id": rule_id }),
        );
        Ok(())
    }

    /// Enable, disable or reconfigure one builtin PII detector at `level`
    pub async fn configure_builtin_pii(
        &self,
        chain: &ScopeChain,
        level: SettingsLevel,
        pii_type: PiiType,
        setting: PiiSetting,
    ) -> Result<(), PolicyError> {
        let key = level_key(chain, level)?;
        let mut rule_set = self.guardrail_repo.get_guardrails(key).await?.unwrap_or_default();
        let enabled = setting.enabled;
        rule_set.builtin_pii.insert(pii_type, setting);
        rule_set.validate()?;
        self.guardrail_repo.save_guardrails(key, &rule_set).await?;

        info!("Configured builtin {} detector at {} (enabled: {})", pii_type, key, enabled);
        self.record_event(
            AuditEventKind::GuardrailRuleDefined,
            &chain.truncate(level)?,
            AuditOutcome::Allowed,
            json!({ "rule_id": pii_type.rule_id(), "enabled": enabled }),
        );
        Ok(())
    }

    /// Validate one level's rule set and dry-run it against a sample text
    pub fn test_guardrails(
        &self,
        level: SettingsLevel,
        rule_set: &GuardrailRuleSet,
        sample: &str,
        direction: Direction,
    ) -> Result<GuardrailResult, PolicyError> {
        let result = guardrail::test_guardrails(level, rule_set, sample, direction, &self.pii_replacements)?;
        debug!("Guardrail dry run at {} level: {:?} ({} matches)", level, result.status, result.matches.len());
        Ok(result)
    }

    // ------------------------------------------------------------------
    // MCP servers
    // ------------------------------------------------------------------

    /// Servers and tools visible to the chain after every level's disables
    pub async fn get_effective_mcp_servers(&self, chain: &ScopeChain) -> Result<EffectiveMcpServers, PolicyError> {
        let (records, registered, overrides) = futures::try_join!(
            self.fetch_settings(chain),
            self.mcp_repo.list_mcp_servers(chain),
            self.fetch_overrides(chain)
        )?;

        let view = settings::resolve_settings(&records, &self.defaults);
        let mcp_flag = view.flag(FeatureKey::McpEnabled);
        let effective = if mcp_flag.value {
            mcp::resolve_mcp_servers(chain, &registered, &overrides)
        } else {
            debug!("MCP disabled for {} at {:?} level", chain, mcp_flag.disabled_by);
            EffectiveMcpServers::feature_disabled(mcp_flag.disabled_by)
        };

        info!(
            "Resolved {} MCP servers for {} ({} disabled, {} tools filtered)",
            effective.servers.len(),
            chain,
            effective.disabled_reasons.len(),
            effective.disabled_tools.len()
        );
        self.record_event(
            AuditEventKind::McpServersResolved,
            chain,
            AuditOutcome::Allowed,
            json!({
                "servers": effective.server_ids(),
                "feature_disabled_by": effective.feature_disabled_by,
            }),
        );
        Ok(effective)
    }

    /// Fail with `QuotaExceeded` when one more server at `new_server_level` would
    /// exceed the effective limit for the chain
    pub async fn check_server_limits(
        &self,
        chain: &ScopeChain,
        new_server_level: SettingsLevel,
    ) -> Result<(), PolicyError> {
        self.enforce_server_limit(chain, new_server_level).await.map(|_| ())
    }

    /// Limit check that also hands back the quota it applied, if any
    async fn enforce_server_limit(
        &self,
        chain: &ScopeChain,
        new_server_level: SettingsLevel,
    ) -> Result<Option<EffectiveQuota>, PolicyError> {
        let (records, existing) =
            futures::try_join!(self.fetch_settings(chain), self.mcp_repo.list_mcp_servers(chain))?;
        let view = settings::resolve_settings(&records, &self.defaults);

        match mcp::check_server_limits(chain, new_server_level, &existing, &view) {
            Ok(()) => Ok(view.server_quota(new_server_level)),
            Err(ServerLimitError::QuotaExceeded(e)) => Err(self.quota_denied(chain, e)),
            Err(e) => Err(e.into()),
        }
    }

    fn quota_denied(&self, chain: &ScopeChain, err: QuotaExceededError) -> PolicyError {
        warn!("MCP server quota reached for {}: {}", chain, err);
        metrics::counter!("strata_mcp_quota_denials_total", "level" => err.level.as_str()).increment(1);
        err.into()
    }

    /// Register a server at its owner scope once the owner's quota allows it.
    /// Any failure, including a failed fetch, denies the registration.
    pub async fn register_mcp_server(&self, entry: McpServerEntry) -> Result<McpServerEntry, PolicyError> {
        let result = self.try_register(&entry).await;
        match &result {
            Ok(()) => {
                info!("Registered MCP server '{}' ({}) at {}", entry.name, entry.id, entry.owner);
                self.record_event(
                    AuditEventKind::McpServerRegistered,
                    &entry.owner,
                    AuditOutcome::Allowed,
                    json!({ "server_id": entry.id, "name": entry.name }),
                );
            }
            Err(e) if e.is_fetch_failure() => {
                self.fail_closed(AuditEventKind::McpServerRegistered, &entry.owner, "register_mcp_server", e);
            }
            Err(e) => {
                self.record_event(
                    AuditEventKind::McpServerRegistered,
                    &entry.owner,
                    AuditOutcome::Denied,
                    json!({ "name": entry.name, "reason": e.to_string() }),
                );
            }
        }
        result.map(|()| entry)
    }

    async fn try_register(&self, entry: &McpServerEntry) -> Result<(), PolicyError> {
        let level = classify(entry)?;
        let quota = self.enforce_server_limit(&entry.owner, level).await?;

        // The store re-counts under its own guard; a concurrent registration may
        // have taken the last slot since the check above.
        match self.mcp_repo.save_mcp_server_within(entry, quota.map(|q| q.value)).await? {
            QuotaInsert::Saved => Ok(()),
            QuotaInsert::LimitReached { current } => {
                let quota = quota.ok_or_else(|| {
                    RepositoryError::Unknown(format!("store applied a server limit to unlimited {}", entry.owner))
                })?;
                Err(self.quota_denied(
                    &entry.owner,
                    QuotaExceededError {
                        level,
                        limit: quota.value,
                        current,
                        bound_by: quota.bound_by,
                    },
                ))
            }
        }
    }

    /// Switch a server off for everything at or below `level`
    pub async fn disable_mcp_server(
        &self,
        chain: &ScopeChain,
        level: SettingsLevel,
        server_id: McpServerId,
    ) -> Result<(), PolicyError> {
        self.update_overrides(chain, level, json!({ "server_id": server_id }), |set| {
            set.server_ids.insert(server_id);
        })
        .await
    }

    /// Switch a tool off for everything at or below `level`
    pub async fn disable_mcp_tool(
        &self,
        chain: &ScopeChain,
        level: SettingsLevel,
        tool_name: &str,
    ) -> Result<(), PolicyError> {
        self.update_overrides(chain, level, json!({ "tool_name": tool_name }), |set| {
            set.tool_names.insert(tool_name.to_string());
        })
        .await
    }

    async fn update_overrides(
        &self,
        chain: &ScopeChain,
        level: SettingsLevel,
        metadata: serde_json::Value,
        change: impl FnOnce(&mut DisabledOverrideSet),
    ) -> Result<(), PolicyError> {
        let key = level_key(chain, level)?;
        let mut overrides = self.mcp_repo.get_disabled_overrides(key).await?;
        change(&mut overrides);
        self.mcp_repo.save_disabled_overrides(key, &overrides).await?;

        info!("Updated MCP disable list at {}: {}", key, metadata);
        self.record_event(AuditEventKind::McpOverrideChanged, &chain.truncate(level)?, AuditOutcome::Allowed, metadata);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::NoopAuditSink;
    use crate::domain::scope::{OrgId, TeamId, UserId};
    use crate::infrastructure::repositories::{
        InMemoryGuardrailRepository, InMemoryMcpServerRepository, InMemorySettingsRepository,
    };

    fn service() -> TenantPolicyService {
        TenantPolicyService::new(
            Arc::new(InMemorySettingsRepository::new()),
            Arc::new(InMemoryGuardrailRepository::new()),
            Arc::new(InMemoryMcpServerRepository::new()),
            Arc::new(NoopAuditSink),
            &PolicyConfigManifest::default(),
        )
    }

    #[tokio::test]
    async fn test_update_settings_rejects_level_outside_chain() {
        let service = service();
        let chain = ScopeChain::for_team(OrgId::new(), TeamId::new());

        let err = service
            .update_settings(&chain, SettingsLevel::User, SettingsUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PolicyError::InvalidScope(InvalidScopeError::LevelOutOfChain { .. })));
    }

    #[tokio::test]
    async fn test_update_settings_rejects_user_quota() {
        let service = service();
        let chain = ScopeChain::for_user(OrgId::new(), TeamId::new(), UserId::new());
        let update = SettingsUpdate {
            mcp_max_servers_per_user: Some(1),
            ..Default::default()
        };

        let err = service.update_settings(&chain, SettingsLevel::User, update).await.unwrap_err();
        assert!(matches!(err, PolicyError::SettingsUpdate(_)));
    }

    #[tokio::test]
    async fn test_oversized_text_fails_closed() {
        let mut config = PolicyConfigManifest::default();
        config.spec.guardrails.max_text_bytes = 8;
        let service = TenantPolicyService::new(
            Arc::new(InMemorySettingsRepository::new()),
            Arc::new(InMemoryGuardrailRepository::new()),
            Arc::new(InMemoryMcpServerRepository::new()),
            Arc::new(NoopAuditSink),
            &config,
        );
        let chain = ScopeChain::for_org(OrgId::new());

        let err = service.check_input(&chain, "this is longer than eight").await.unwrap_err();
        assert!(matches!(err, PolicyError::TextTooLarge { limit: 8, .. }));

        let screened = service.screen_input(&chain, "this is longer than eight").await;
        assert!(screened.blocked);
        assert!(screened.fail_closed);
    }

    #[tokio::test]
    async fn test_define_guardrail_rule_rejects_duplicate() {
        let service = service();
        let chain = ScopeChain::for_org(OrgId::new());
        let rule: PatternRule = serde_yaml::from_str(
            "id: secret\nkind: keyword\npattern: secret\naction: block\n",
        )
        .unwrap();

        service.define_guardrail_rule(&chain, SettingsLevel::Org, rule.clone()).await.unwrap();
        let err = service.define_guardrail_rule(&chain, SettingsLevel::Org, rule).await.unwrap_err();
        assert!(matches!(err, PolicyError::RulePattern(RulePatternError::DuplicateRuleId { .. })));
    }
}

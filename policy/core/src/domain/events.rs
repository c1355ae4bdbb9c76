// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Audit events emitted by the service layer after it has used an engine decision.
//!
//! The [`AuditSink`] is fire-and-forget: recording never fails the request and
//! never feeds back into evaluation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::scope::ScopeChain;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    SettingsResolved,
    SettingsUpdated,
    GuardrailChecked,
    GuardrailRuleDefined,
    McpServersResolved,
    McpServerRegistered,
    McpOverrideChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Allowed,
    Redacted,
    Blocked,
    Denied,
    /// A dependency failed and the conservative answer was returned.
    FailClosed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub kind: AuditEventKind,
    pub scope: ScopeChain,
    pub outcome: AuditOutcome,
    pub metadata: Value,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(kind: AuditEventKind, scope: ScopeChain, outcome: AuditOutcome, metadata: Value) -> Self {
        Self {
            kind,
            scope,
            outcome,
            metadata,
            recorded_at: Utc::now(),
        }
    }
}

/// Side-effect sink for audit records.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Sink that drops everything; used when auditing is switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: AuditEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::scope::OrgId;
    use serde_json::json;

    #[test]
    fn test_audit_event_serialization() {
        let event = AuditEvent::new(
            AuditEventKind::GuardrailChecked,
            ScopeChain::for_org(OrgId::new()),
            AuditOutcome::Blocked,
            json!({"direction": "input", "matches": 2}),
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"guardrail_checked\""));

        let deserialized: AuditEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Audit Sinks
//!
//! Writes audit records to the structured log, and fans one record out to
//! several sinks.
//!
//! Blocks, denials and fail-closed fallbacks are logged at `WARN`; every other
//! decision at `INFO`. Records never carry the screened text itself.

use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::events::{AuditEvent, AuditOutcome, AuditSink};

/// Writes audit records to the structured tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl TracingAuditSink {
    pub fn new() -> Self {
        Self
    }
}

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        match event.outcome {
            AuditOutcome::Blocked | AuditOutcome::Denied | AuditOutcome::FailClosed => warn!(
                target: "strata::audit",
                kind = ?event.kind,
                scope = %event.scope,
                outcome = ?event.outcome,
                metadata = %event.metadata,
                "policy audit"
            ),
            AuditOutcome::Allowed | AuditOutcome::Redacted => info!(
                target: "strata::audit",
                kind = ?event.kind,
                scope = %event.scope,
                outcome = ?event.outcome,
                metadata = %event.metadata,
                "policy audit"
            ),
        }
    }
}

/// Offers each record to every wrapped sink in order.
#[derive(Clone, Default)]
pub struct FanoutAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl AuditSink for FanoutAuditSink {
    fn record(&self, event: AuditEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.record(event.clone());
            }
            last.record(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::AuditEventKind;
    use crate::domain::scope::{OrgId, ScopeChain};
    use crate::infrastructure::event_bus::AuditEventBus;
    use serde_json::json;

    #[tokio::test]
    async fn test_fanout_reaches_every_sink() {
        let first = AuditEventBus::new(4);
        let second = AuditEventBus::new(4);
        let mut first_rx = first.subscribe();
        let mut second_rx = second.subscribe();

        let sink = FanoutAuditSink::new()
            .with(Arc::new(TracingAuditSink::new()))
            .with(Arc::new(first.clone()))
            .with(Arc::new(second.clone()));
        assert_eq!(sink.len(), 3);

        sink.record(AuditEvent::new(
            AuditEventKind::McpServerRegistered,
            ScopeChain::for_org(OrgId::new()),
            AuditOutcome::Denied,
            json!({ "reason": "quota" }),
        ));

        assert_eq!(first_rx.recv().await.unwrap().outcome, AuditOutcome::Denied);
        assert_eq!(second_rx.recv().await.unwrap().kind, AuditEventKind::McpServerRegistered);
    }
}

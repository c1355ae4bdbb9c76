// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Audit Event Bus - Pub/Sub for Policy Decisions
//
// In-memory streaming of audit events over a tokio broadcast channel.
// Subscribers that fall behind lose the oldest events; publishing never blocks.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::events::{AuditEvent, AuditEventKind, AuditSink};
use crate::domain::scope::ScopeChain;

/// Event bus for publishing and subscribing to audit events
#[derive(Clone)]
pub struct AuditEventBus {
    sender: Arc<broadcast::Sender<AuditEvent>>,
}

impl AuditEventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before dropping old ones
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Publish an audit event to all subscribers
    pub fn publish(&self, event: AuditEvent) {
        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to audit event");
        }
    }

    /// Subscribe to all audit events
    pub fn subscribe(&self) -> AuditEventReceiver {
        AuditEventReceiver {
            receiver: self.sender.subscribe(),
            scope: None,
            kind: None,
        }
    }

    /// Subscribe to events recorded for exactly `scope`
    pub fn subscribe_scope(&self, scope: ScopeChain) -> AuditEventReceiver {
        AuditEventReceiver {
            receiver: self.sender.subscribe(),
            scope: Some(scope),
            kind: None,
        }
    }

    /// Subscribe to one kind of event
    pub fn subscribe_kind(&self, kind: AuditEventKind) -> AuditEventReceiver {
        AuditEventReceiver {
            receiver: self.sender.subscribe(),
            scope: None,
            kind: Some(kind),
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for AuditEventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

impl AuditSink for AuditEventBus {
    fn record(&self, event: AuditEvent) {
        self.publish(event);
    }
}

/// Receiver for audit events, optionally filtered by scope or kind
pub struct AuditEventReceiver {
    receiver: broadcast::Receiver<AuditEvent>,
    scope: Option<ScopeChain>,
    kind: Option<AuditEventKind>,
}

impl AuditEventReceiver {
    /// Receive the next matching event
    pub async fn recv(&mut self) -> Result<AuditEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(|e| match e {
                broadcast::error::RecvError::Closed => EventBusError::Closed,
                broadcast::error::RecvError::Lagged(n) => {
                    warn!("Audit receiver lagged by {} events", n);
                    EventBusError::Lagged(n)
                }
            })?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Try to receive a matching event without blocking
    pub fn try_recv(&mut self) -> Result<AuditEvent, EventBusError> {
        loop {
            let event = self.receiver.try_recv().map_err(|e| match e {
                broadcast::error::TryRecvError::Empty => EventBusError::Empty,
                broadcast::error::TryRecvError::Closed => EventBusError::Closed,
                broadcast::error::TryRecvError::Lagged(n) => {
                    warn!("Audit receiver lagged by {} events", n);
                    EventBusError::Lagged(n)
                }
            })?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    fn matches(&self, event: &AuditEvent) -> bool {
        self.scope.map_or(true, |scope| event.scope == scope) && self.kind.map_or(true, |kind| event.kind == kind)
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::AuditOutcome;
    use crate::domain::scope::{OrgId, TeamId};
    use serde_json::json;

    fn event(kind: AuditEventKind, scope: ScopeChain) -> AuditEvent {
        AuditEvent::new(kind, scope, AuditOutcome::Allowed, json!({}))
    }

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let bus = AuditEventBus::new(10);
        let mut receiver = bus.subscribe();
        let scope = ScopeChain::for_org(OrgId::new());

        bus.record(event(AuditEventKind::SettingsResolved, scope));

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.kind, AuditEventKind::SettingsResolved);
        assert_eq!(received.scope, scope);
    }

    #[tokio::test]
    async fn test_scope_filtering() {
        let bus = AuditEventBus::new(10);
        let org = OrgId::new();
        let team = ScopeChain::for_team(org, TeamId::new());
        let mut receiver = bus.subscribe_scope(team);

        bus.publish(event(AuditEventKind::GuardrailChecked, ScopeChain::for_org(org)));
        bus.publish(event(AuditEventKind::McpServersResolved, team));

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.kind, AuditEventKind::McpServersResolved);
        assert!(matches!(receiver.try_recv(), Err(EventBusError::Empty)));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = AuditEventBus::default();
        bus.publish(event(AuditEventKind::SettingsUpdated, ScopeChain::for_org(OrgId::new())));
        assert_eq!(bus.subscriber_count(), 0);
    }
}

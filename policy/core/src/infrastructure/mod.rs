// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod repositories;
pub mod event_bus;
pub mod audit;
pub mod snapshot;

pub use audit::{FanoutAuditSink, TracingAuditSink};
pub use event_bus::{AuditEventBus, AuditEventReceiver, EventBusError};
pub use snapshot::{InMemoryPolicyStores, PolicySnapshot, ScopedRecord};

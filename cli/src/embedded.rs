// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Embedded policy engine
//!
//! Builds the policy service in-process over in-memory stores seeded from a
//! YAML snapshot, so commands can evaluate policy without a running backend.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use strata_core::application::TenantPolicyService;
use strata_core::domain::config::{ObservabilityConfig, PolicyConfigManifest};
use strata_core::infrastructure::audit::{FanoutAuditSink, TracingAuditSink};
use strata_core::infrastructure::event_bus::AuditEventBus;
use strata_core::infrastructure::snapshot::{InMemoryPolicyStores, PolicySnapshot};

pub struct EmbeddedPolicyEngine {
    pub config: PolicyConfigManifest,
    pub stores: InMemoryPolicyStores,
    pub service: TenantPolicyService,
    /// Every audit record the service emits is published here
    pub events: AuditEventBus,
}

impl EmbeddedPolicyEngine {
    /// Load configuration (with discovery) and, when given, a policy snapshot
    pub async fn load(config_path: Option<PathBuf>, snapshot_path: Option<&Path>) -> Result<Self> {
        match PolicyConfigManifest::resolve_path(config_path.clone()) {
            Some(path) => info!("Loading configuration from {:?}", path),
            None => info!("No configuration file found in standard locations. Using defaults."),
        }
        let config = PolicyConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;

        let snapshot = match snapshot_path {
            Some(path) => PolicySnapshot::from_yaml_file(path)
                .with_context(|| format!("Failed to load policy snapshot {:?}", path))?,
            None => {
                info!("No policy snapshot given; evaluating against defaults only");
                PolicySnapshot::default()
            }
        };

        Self::from_parts(config, &snapshot).await
    }

    pub async fn from_parts(config: PolicyConfigManifest, snapshot: &PolicySnapshot) -> Result<Self> {
        let stores = InMemoryPolicyStores::from_snapshot(snapshot)
            .await
            .context("Failed to seed policy stores")?;

        let events = AuditEventBus::new(config.spec.audit.bus_capacity);
        let mut audit = FanoutAuditSink::new();
        if config.spec.audit.tracing_sink {
            audit = audit.with(Arc::new(TracingAuditSink::new()));
        }
        let audit = audit.with(Arc::new(events.clone()));

        let service = TenantPolicyService::new(
            stores.settings.clone(),
            stores.guardrails.clone(),
            stores.mcp.clone(),
            Arc::new(audit),
            &config,
        );

        Ok(Self {
            config,
            stores,
            service,
            events,
        })
    }
}

/// Log settings for the process: command-line flags first, then the
/// configuration's `spec.observability` (which carries `STRATA_LOG_LEVEL`).
///
/// Runs before logging is up, so a configuration that fails to load falls back
/// to defaults here and is reported by the command that loads it.
pub fn resolve_observability(
    config_path: Option<PathBuf>,
    log_level: Option<String>,
    log_format: Option<String>,
) -> ObservabilityConfig {
    let configured = PolicyConfigManifest::load_or_default(config_path)
        .map(|config| config.spec.observability)
        .unwrap_or_default();

    ObservabilityConfig {
        log_level: log_level.unwrap_or(configured.log_level),
        log_format: log_format.unwrap_or(configured.log_format),
    }
}

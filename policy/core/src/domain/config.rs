// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Policy Engine Configuration
//
// Defines the configuration schema for a Strata policy engine deployment:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Defaults synthesized for tenants that have no stored settings yet
// - Guardrail tuning (PII replacement tokens, scan size ceiling)
// - Audit sink and observability settings

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use super::guardrail::PiiType;
use super::settings::SettingsDefaults;

pub const API_VERSION: &str = "strata.dev/v1";
pub const KIND: &str = "PolicyConfig";

/// Top-level Kubernetes-style policy configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfigManifest {
    /// API version (must be "strata.dev/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "PolicyConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: PolicyConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfigSpec {
    /// Values synthesized for levels without a stored settings record
    #[serde(default)]
    pub defaults: SettingsDefaults,

    #[serde(default)]
    pub guardrails: GuardrailConfig,

    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailConfig {
    /// Replacement tokens overriding the builtin PII catalog defaults
    #[serde(default)]
    pub pii_replacements: BTreeMap<PiiType, String>,

    /// Texts longer than this are not scanned and fail closed
    #[serde(default = "default_max_text_bytes")]
    pub max_text_bytes: usize,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            pii_replacements: BTreeMap::new(),
            max_text_bytes: default_max_text_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Buffered events per audit bus subscriber
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,

    /// Also write audit records to the structured log
    #[serde(default = "default_true")]
    pub tracing_sink: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            bus_capacity: default_bus_capacity(),
            tracing_sink: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// "compact" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_text_bytes() -> usize {
    256 * 1024
}

fn default_bus_capacity() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

impl Default for PolicyConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "default".to_string(),
                version: None,
                labels: None,
            },
            spec: PolicyConfigSpec::default(),
        }
    }
}

impl PolicyConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. STRATA_CONFIG_PATH environment variable
    /// 2. ./strata-config.yaml (working directory)
    /// 3. ~/.strata/config.yaml (user home)
    /// 4. /etc/strata/config.yaml (system, Unix) or C:\ProgramData\Strata\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("STRATA_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./strata-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".strata").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/strata/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Strata\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// The file `load_or_default` reads: the explicit path, else the first
    /// discovered one. `None` means built-in defaults.
    pub fn resolve_path(cli_path: Option<PathBuf>) -> Option<PathBuf> {
        cli_path.or_else(Self::discover_config)
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path fails if missing/invalid
        let mut config = match Self::resolve_path(cli_path) {
            Some(path) => Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        if let Some(quota) = env_u32("STRATA_MAX_SERVERS_PER_TEAM")? {
            self.spec.defaults.mcp_max_servers_per_team = quota;
        }
        if let Some(quota) = env_u32("STRATA_MAX_SERVERS_PER_USER")? {
            self.spec.defaults.mcp_max_servers_per_user = quota;
        }
        if let Ok(level) = std::env::var("STRATA_LOG_LEVEL") {
            self.spec.observability.log_level = level;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!("Invalid apiVersion: '{}'. Must be '{}'", self.api_version, API_VERSION);
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let defaults = &self.spec.defaults;
        if defaults.mcp_max_servers_per_team == 0 || defaults.mcp_max_servers_per_user == 0 {
            anyhow::bail!("spec.defaults quotas must be greater than zero");
        }
        if defaults.mcp_max_servers_per_user > defaults.mcp_max_servers_per_team {
            anyhow::bail!(
                "spec.defaults.mcp_max_servers_per_user ({}) cannot exceed mcp_max_servers_per_team ({})",
                defaults.mcp_max_servers_per_user,
                defaults.mcp_max_servers_per_team
            );
        }

        for (pii_type, token) in &self.spec.guardrails.pii_replacements {
            if token.is_empty() {
                anyhow::bail!("spec.guardrails.pii_replacements.{} cannot be empty", pii_type);
            }
        }

        if self.spec.guardrails.max_text_bytes == 0 {
            anyhow::bail!("spec.guardrails.max_text_bytes must be greater than zero");
        }

        if self.spec.audit.bus_capacity == 0 {
            anyhow::bail!("spec.audit.bus_capacity must be greater than zero");
        }

        match self.spec.observability.log_format.as_str() {
            "compact" | "json" => Ok(()),
            other => anyhow::bail!("Invalid log_format: '{}'. Expected 'compact' or 'json'", other),
        }
    }
}

fn env_u32(name: &str) -> anyhow::Result<Option<u32>> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("Invalid value for {}: '{}'. Expected a positive integer", name, value)),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::settings::FeatureKey;

    #[test]
    fn test_default_manifest() {
        let manifest = PolicyConfigManifest::default();
        assert_eq!(manifest.api_version, API_VERSION);
        assert_eq!(manifest.spec.defaults.mcp_max_servers_per_team, 10);
        assert_eq!(manifest.spec.defaults.mcp_max_servers_per_user, 5);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
apiVersion: strata.dev/v1
kind: PolicyConfig
metadata:
  name: staging
spec:
  defaults:
    features:
      memory_enabled: false
    mcp_max_servers_per_team: 20
  guardrails:
    pii_replacements:
      email: "<email>"
  observability:
    log_format: json
"#;
        let manifest = PolicyConfigManifest::from_yaml_str(yaml).unwrap();
        assert!(manifest.validate().is_ok());
        assert!(!manifest.spec.defaults.feature(FeatureKey::MemoryEnabled));
        assert!(manifest.spec.defaults.feature(FeatureKey::ChatEnabled));
        assert_eq!(manifest.spec.defaults.mcp_max_servers_per_team, 20);
        assert_eq!(manifest.spec.defaults.mcp_max_servers_per_user, 5);
        assert_eq!(manifest.spec.guardrails.pii_replacements.get(&PiiType::Email).map(String::as_str), Some("<email>"));
        assert_eq!(manifest.spec.audit.bus_capacity, 1000);
    }

    #[test]
    fn test_validation() {
        let mut manifest = PolicyConfigManifest::default();
        manifest.kind = "NodeConfig".to_string();
        assert!(manifest.validate().is_err());

        let mut manifest = PolicyConfigManifest::default();
        manifest.spec.defaults.mcp_max_servers_per_user = 50;
        assert!(manifest.validate().is_err());

        let mut manifest = PolicyConfigManifest::default();
        manifest.spec.guardrails.pii_replacements.insert(PiiType::Phone, String::new());
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_explicit_path_wins_discovery() {
        let explicit = PathBuf::from("/tmp/strata-explicit.yaml");
        assert_eq!(PolicyConfigManifest::resolve_path(Some(explicit.clone())), Some(explicit));
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strata-config.yaml");

        let mut manifest = PolicyConfigManifest::default();
        manifest.metadata.name = "prod".to_string();
        manifest.to_yaml_file(&path).unwrap();

        let loaded = PolicyConfigManifest::load_or_default(Some(path)).unwrap();
        assert_eq!(loaded.metadata.name, "prod");
    }
}

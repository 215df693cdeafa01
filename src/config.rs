//! Driver Configuration
//!
//! YAML-backed settings for the share driver. Every field but `servers` has a
//! default, so a minimal file is just the server list.

use crate::backend::address::ServerAddress;
use crate::backend::executor::ProcessExecutorConfig;
use crate::backend::version::{Feature, FeatureGates};
use crate::error::{Error, Result};
use crate::pool::VolumePattern;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

fn default_prefix() -> String {
    "manila-".to_string()
}

fn default_backend_name() -> String {
    "GlusterFS-Native".to_string()
}

/// Configuration for the GlusterFS native share driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Backend servers, as `[user@]host`
    pub servers: Vec<String>,

    /// Pattern volume names must match to join the pool; `#{size}` marks the size
    #[serde(default)]
    pub volume_pattern: Option<String>,

    /// Private key for ssh logins to the servers
    #[serde(default)]
    pub path_to_private_key: Option<PathBuf>,

    #[serde(default)]
    pub ssh_port: Option<u16>,

    /// Command prefixed to privileged local commands, e.g. `["sudo"]`
    #[serde(default)]
    pub root_helper: Option<Vec<String>>,

    #[serde(default = "default_prefix")]
    pub snapshot_prefix: String,

    /// Prefix of volumes created from snapshots
    #[serde(default = "default_prefix")]
    pub volume_prefix: String,

    #[serde(default = "default_backend_name")]
    pub backend_name: String,

    /// Server version thresholds
    #[serde(default)]
    pub versions: FeatureGates,
}

impl DriverConfig {
    /// Configuration with defaults for everything but the servers
    pub fn new(servers: Vec<String>) -> Self {
        Self {
            servers,
            volume_pattern: None,
            path_to_private_key: None,
            ssh_port: None,
            root_helper: None,
            snapshot_prefix: default_prefix(),
            volume_prefix: default_prefix(),
            backend_name: default_backend_name(),
            versions: FeatureGates::default(),
        }
    }

    /// Load and validate a YAML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_yaml(&raw)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(raw)
            .map_err(|e| Error::Configuration(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            return Err(Error::Configuration(
                "at least one backend server is required".to_string(),
            ));
        }
        self.server_addresses()?;
        self.pattern()?;

        if self.snapshot_prefix.is_empty() || self.volume_prefix.is_empty() {
            return Err(Error::Configuration("name prefixes must not be empty".to_string()));
        }

        let gates = &self.versions;
        for feature in [
            Feature::Snapshot,
            Feature::SnapshotErrno,
            Feature::Clone,
            Feature::TrashAwareWipe,
        ] {
            if gates.threshold(feature) < gates.minimum {
                return Err(Error::Configuration(format!(
                    "{:?} threshold {} is below the minimum version {}",
                    feature,
                    gates.threshold(feature),
                    gates.minimum
                )));
            }
        }

        Ok(())
    }

    /// Parsed server addresses, in configuration order
    pub fn server_addresses(&self) -> Result<Vec<ServerAddress>> {
        self.servers.iter().map(|s| s.parse()).collect()
    }

    /// Compiled volume pattern, if one is configured
    pub fn pattern(&self) -> Result<Option<VolumePattern>> {
        self.volume_pattern
            .as_deref()
            .map(VolumePattern::new)
            .transpose()
    }

    pub fn executor_config(&self) -> ProcessExecutorConfig {
        ProcessExecutorConfig {
            private_key: self.path_to_private_key.clone(),
            ssh_port: self.ssh_port,
        }
    }
}

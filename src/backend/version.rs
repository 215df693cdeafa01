//! Backend Version Gate
//!
//! Resolves each backend server's GlusterFS version once at setup and answers
//! feature questions (snapshots, clones, trash-aware wipes) from the cache.

use super::address::ServerAddress;
use super::cli::GlusterCli;
use crate::error::{Error, Result};
use futures::future::try_join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

// =============================================================================
// Version Tuple
// =============================================================================

/// A (major, minor) version pair, compared lexicographically
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionTuple {
    pub major: u32,
    pub minor: u32,
}

impl VersionTuple {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for VersionTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for VersionTuple {
    type Err = String;

    /// Parse `major.minor[.anything]`
    fn from_str(s: &str) -> std::result::Result<Self, String> {
        let mut parts = s.split('.');
        let mut numeral = |what: &str| -> std::result::Result<u32, String> {
            parts
                .next()
                .and_then(|p| p.parse::<u32>().ok())
                .ok_or_else(|| format!("missing {} version in {:?}", what, s))
        };
        let major = numeral("major")?;
        let minor = numeral("minor")?;
        Ok(Self::new(major, minor))
    }
}

impl Serialize for VersionTuple {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionTuple {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Feature Gates
// =============================================================================

/// Backend features whose availability depends on the server version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    /// Volume snapshots at all
    Snapshot,
    /// Snapshot create reports a missing feature as errno 0
    SnapshotErrno,
    /// Creating a volume from a snapshot
    Clone,
    /// Volumes carry a `.trashcan` directory the wipe must leave alone
    TrashAwareWipe,
}

/// Version thresholds for each feature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureGates {
    /// Minimum server version the driver runs against
    pub minimum: VersionTuple,
    pub snapshot: VersionTuple,
    pub snapshot_errno: VersionTuple,
    pub clone: VersionTuple,
    pub trash_aware_wipe: VersionTuple,
}

impl Default for FeatureGates {
    fn default() -> Self {
        Self {
            minimum: VersionTuple::new(3, 6),
            snapshot: VersionTuple::new(3, 6),
            snapshot_errno: VersionTuple::new(3, 7),
            clone: VersionTuple::new(3, 7),
            trash_aware_wipe: VersionTuple::new(3, 7),
        }
    }
}

impl FeatureGates {
    /// Minimum version providing `feature`
    pub fn threshold(&self, feature: Feature) -> VersionTuple {
        match feature {
            Feature::Snapshot => self.snapshot,
            Feature::SnapshotErrno => self.snapshot_errno,
            Feature::Clone => self.clone,
            Feature::TrashAwareWipe => self.trash_aware_wipe,
        }
    }
}

// =============================================================================
// Version Gate
// =============================================================================

/// Per-server version cache
pub struct VersionGate {
    cli: Arc<GlusterCli>,
    gates: FeatureGates,
    versions: RwLock<HashMap<ServerAddress, VersionTuple>>,
}

impl VersionGate {
    pub fn new(cli: Arc<GlusterCli>, gates: FeatureGates) -> Self {
        Self {
            cli,
            gates,
            versions: RwLock::new(HashMap::new()),
        }
    }

    pub fn gates(&self) -> &FeatureGates {
        &self.gates
    }

    /// Fetch every server's version; nothing is recorded unless all succeed
    pub async fn setup(&self, servers: &[ServerAddress]) -> Result<()> {
        let pending: Vec<&ServerAddress> = {
            let versions = self.versions.read();
            servers.iter().filter(|s| !versions.contains_key(*s)).collect()
        };

        let fetched = try_join_all(pending.iter().map(|server| async move {
            let version = self.cli.version(server).await.map_err(|source| {
                Error::BackendUnavailable {
                    server: server.to_string(),
                    source,
                }
            })?;
            debug!("GlusterFS {} on {}", version, server);
            Ok::<_, Error>(((*server).clone(), version))
        }))
        .await?;

        for (server, version) in &fetched {
            if *version < self.gates.minimum {
                return Err(Error::UnsupportedBackendVersion {
                    server: server.to_string(),
                    found: *version,
                    minimum: self.gates.minimum,
                });
            }
        }

        let mut versions = self.versions.write();
        for (server, version) in fetched {
            info!("Resolved GlusterFS {} on {}", version, server);
            versions.entry(server).or_insert(version);
        }

        Ok(())
    }

    /// Resolved version of a server
    pub fn version(&self, server: &ServerAddress) -> Result<VersionTuple> {
        self.versions
            .read()
            .get(server)
            .copied()
            .ok_or_else(|| Error::UnknownServer {
                server: server.to_string(),
            })
    }

    /// Check whether a server's version provides a feature
    pub fn supports(&self, server: &ServerAddress, feature: Feature) -> Result<bool> {
        Ok(self.version(server)? >= self.gates.threshold(feature))
    }

    /// Snapshot of all resolved versions
    pub fn resolved(&self) -> Vec<(ServerAddress, VersionTuple)> {
        let mut all: Vec<_> = self
            .versions
            .read()
            .iter()
            .map(|(s, v)| (s.clone(), *v))
            .collect();
        all.sort();
        all
    }
}

//! Snapshot Lifecycle
//!
//! Snapshot create/delete and cloning a snapshot into a new volume. The
//! backend decorates snapshot names (a timestamp suffix), so a client ID is
//! resolved to the backend's name by listing the volume's snapshots.

use crate::access::AccessControlList;
use crate::backend::address::VolumeAddress;
use crate::backend::cli::{check_status, GlusterCli};
use crate::backend::output::{self, OpStatus};
use crate::backend::version::{Feature, VersionGate};
use crate::error::{CommandError, Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

// =============================================================================
// No-Snapshot Cache
// =============================================================================

/// Volumes on which snapshots were attempted and found unsupported
///
/// Holds the backend's error string per volume.
#[derive(Debug, Default)]
pub struct NoSnapCache {
    markers: RwLock<HashMap<VolumeAddress, String>>,
}

impl NoSnapCache {
    pub fn get(&self, volume: &VolumeAddress) -> Option<String> {
        self.markers.read().get(volume).cloned()
    }

    pub fn mark(&self, volume: &VolumeAddress, reason: impl Into<String>) {
        self.markers.write().insert(volume.clone(), reason.into());
    }

    pub fn len(&self) -> usize {
        self.markers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Snapshot Resolver
// =============================================================================

/// Maps client snapshot IDs to backend snapshot names
pub struct SnapshotResolver {
    cli: Arc<GlusterCli>,
}

impl SnapshotResolver {
    pub fn new(cli: Arc<GlusterCli>) -> Self {
        Self { cli }
    }

    /// The single backend snapshot of `volume` whose name contains `snapshot_id`
    pub async fn resolve(&self, volume: &VolumeAddress, snapshot_id: &str) -> Result<String> {
        let listing = self
            .cli
            .snapshot_list(volume)
            .await
            .map_err(|source| Error::SnapshotFailed {
                volume: volume.to_string(),
                source,
            })?;

        match output::matching_snapshots(&listing, snapshot_id).as_slice() {
            [name] => Ok(name.to_string()),
            found => Err(Error::AmbiguousSnapshot {
                snapshot_id: snapshot_id.to_string(),
                volume: volume.to_string(),
                found: found.len(),
            }),
        }
    }
}

// =============================================================================
// Snapshot Manager
// =============================================================================

/// Snapshot operations over backend volumes
pub struct SnapshotManager {
    cli: Arc<GlusterCli>,
    versions: Arc<VersionGate>,
    acl: Arc<AccessControlList>,
    resolver: SnapshotResolver,
    no_snap: NoSnapCache,
    snapshot_prefix: String,
    volume_prefix: String,
}

impl SnapshotManager {
    pub fn new(
        cli: Arc<GlusterCli>,
        versions: Arc<VersionGate>,
        acl: Arc<AccessControlList>,
        snapshot_prefix: impl Into<String>,
        volume_prefix: impl Into<String>,
    ) -> Self {
        Self {
            resolver: SnapshotResolver::new(cli.clone()),
            cli,
            versions,
            acl,
            no_snap: NoSnapCache::default(),
            snapshot_prefix: snapshot_prefix.into(),
            volume_prefix: volume_prefix.into(),
        }
    }

    pub fn no_snap_cache(&self) -> &NoSnapCache {
        &self.no_snap
    }

    /// Snapshot `volume` as `<snapshot_prefix><snapshot_id>`
    pub async fn create(&self, volume: &VolumeAddress, snapshot_id: &str) -> Result<()> {
        let server = volume.server();
        let reports_absence = self.versions.supports(server, Feature::SnapshotErrno)?;
        let refused = |reason: String| Error::SnapshotFailed {
            volume: volume.to_string(),
            source: CommandError::Refused { reason },
        };

        if !self.versions.supports(server, Feature::Snapshot)? {
            return Err(refused(format!(
                "GlusterFS {} on {} has no snapshot support",
                self.versions.version(server)?,
                server
            )));
        }

        if let Some(reason) = self.no_snap.get(volume) {
            return Err(if reports_absence {
                Error::SnapshotNotSupported {
                    volume: volume.to_string(),
                    reason,
                }
            } else {
                refused(reason)
            });
        }

        let name = format!("{}{}", self.snapshot_prefix, snapshot_id);
        let status = self
            .cli
            .snapshot_create(volume, &name)
            .await
            .map_err(|source| Error::SnapshotFailed {
                volume: volume.to_string(),
                source,
            })?;

        if status.succeeded() {
            info!("Created snapshot {} of {}", name, volume);
            return Ok(());
        }

        if status.errno == 0 && reports_absence {
            warn!(
                "Volume {} does not support snapshots: {}",
                volume, status.errstr
            );
            self.no_snap.mark(volume, status.errstr.clone());
            return Err(Error::SnapshotNotSupported {
                volume: volume.to_string(),
                reason: status.errstr,
            });
        }

        Err(self.op_failed(volume, "snapshot create", status))
    }

    /// Delete the backend snapshot matching `snapshot_id`
    pub async fn delete(&self, volume: &VolumeAddress, snapshot_id: &str) -> Result<()> {
        let name = self.resolver.resolve(volume, snapshot_id).await?;
        let status = self
            .cli
            .snapshot_delete(volume.server(), &name)
            .await
            .map_err(|source| Error::SnapshotFailed {
                volume: volume.to_string(),
                source,
            })?;

        if !status.succeeded() {
            return Err(self.op_failed(volume, "snapshot delete", status));
        }
        info!("Deleted snapshot {} of {}", name, volume);
        Ok(())
    }

    /// The volume a clone of `source` for `share_id` is created as
    pub fn clone_target(&self, source: &VolumeAddress, share_id: &str) -> VolumeAddress {
        source
            .server()
            .volume(format!("{}{}", self.volume_prefix, share_id))
    }

    /// Clone a snapshot of `source` into a new volume for `share_id`
    ///
    /// The new volume lives on the source's server and is started with the
    /// baseline allow-list. Registering it is left to the caller.
    pub async fn clone_to_volume(
        &self,
        source: &VolumeAddress,
        snapshot_id: &str,
        share_id: &str,
    ) -> Result<VolumeAddress> {
        let server = source.server();
        let found = self.versions.version(server)?;
        let minimum = self.versions.gates().threshold(Feature::Clone);
        if found < minimum {
            return Err(Error::CloneNotSupported {
                server: server.to_string(),
                found,
                minimum,
            });
        }

        let name = self.resolver.resolve(source, snapshot_id).await?;
        let snapshot_failed = |source_err| Error::SnapshotFailed {
            volume: source.to_string(),
            source: source_err,
        };
        let volume = self.clone_target(source, share_id);

        self.cli
            .snapshot_activate(server, &name)
            .await
            .map_err(snapshot_failed)?;
        self.cli
            .snapshot_clone(server, volume.volume(), &name)
            .await
            .map_err(snapshot_failed)?;

        let setup_failed = |source| Error::VolumeSetupFailed {
            volume: volume.to_string(),
            source,
        };
        self.acl
            .reset_to_baseline(&volume)
            .await
            .map_err(setup_failed)?;
        self.cli.start(&volume).await.map_err(setup_failed)?;

        info!("Cloned snapshot {} of {} into {}", name, source, volume);
        Ok(volume)
    }

    fn op_failed(&self, volume: &VolumeAddress, command: &str, status: OpStatus) -> Error {
        match check_status(command, status) {
            Err(source) => Error::SnapshotFailed {
                volume: volume.to_string(),
                source,
            },
            Ok(()) => Error::SnapshotFailed {
                volume: volume.to_string(),
                source: CommandError::Refused {
                    reason: format!("{} reported success", command),
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::address::ServerAddress;
    use crate::backend::version::FeatureGates;
    use crate::testing::{op_xml, volume_info_xml, FakeExecutor, Reply};
    use assert_matches::assert_matches;

    const HOST: &str = "root@host1";
    const CREATE: &str = "--xml snapshot create manila-fake_snap_id gv1";
    const LIST: &str = "snapshot list gv1 --mode=script";

    async fn manager(fake: &Arc<FakeExecutor>, version: &str) -> SnapshotManager {
        fake.on(HOST, "--version", Reply::ok(format!("glusterfs {}", version)));
        let cli = Arc::new(GlusterCli::new(fake.clone(), None));
        let versions = Arc::new(VersionGate::new(cli.clone(), FeatureGates::default()));
        let server: ServerAddress = HOST.parse().unwrap();
        versions.setup(&[server]).await.unwrap();
        let acl = Arc::new(AccessControlList::new(cli.clone()));
        SnapshotManager::new(cli, versions, acl, "manila-", "manila-")
    }

    fn gv1() -> VolumeAddress {
        "root@host1:/gv1".parse().unwrap()
    }

    fn calls_after_setup(fake: &FakeExecutor) -> Vec<String> {
        fake.commands(HOST)
            .into_iter()
            .filter(|c| c != "--version")
            .collect()
    }

    #[tokio::test]
    async fn test_create_snapshot() {
        let fake = FakeExecutor::new();
        fake.on(HOST, CREATE, Reply::ok(op_xml(0, 0, "")));
        let snaps = manager(&fake, "3.6.2").await;

        snaps.create(&gv1(), "fake_snap_id").await.unwrap();
        assert_eq!(calls_after_setup(&fake), vec![CREATE]);
    }

    #[tokio::test]
    async fn test_create_snapshot_error_is_not_cached() {
        let fake = FakeExecutor::new();
        fake.on(HOST, CREATE, Reply::ok(op_xml(-1, 2, "fake error")));
        let snaps = manager(&fake, "3.7.1").await;

        let err = snaps.create(&gv1(), "fake_snap_id").await.unwrap_err();
        assert_matches!(
            err,
            Error::SnapshotFailed { source: CommandError::OpFailed { errno: 2, .. }, .. }
        );
        assert!(snaps.no_snap_cache().is_empty());
    }

    #[tokio::test]
    async fn test_create_snapshot_unsupported_soft_at_errno_version() {
        let fake = FakeExecutor::new();
        fake.on(HOST, CREATE, Reply::ok(op_xml(-1, 0, "thin LV required")));
        let snaps = manager(&fake, "3.7.0").await;

        let err = snaps.create(&gv1(), "fake_snap_id").await.unwrap_err();
        assert!(err.is_soft());
        assert_eq!(snaps.no_snap_cache().get(&gv1()).as_deref(), Some("thin LV required"));

        // cached: no second remote call
        let err = snaps.create(&gv1(), "fake_snap_id").await.unwrap_err();
        assert_matches!(err, Error::SnapshotNotSupported { ref reason, .. } if reason == "thin LV required");
        assert_eq!(fake.count(HOST, CREATE), 1);
    }

    #[tokio::test]
    async fn test_create_snapshot_errno_zero_is_hard_before_errno_version() {
        let fake = FakeExecutor::new();
        fake.on(HOST, CREATE, Reply::ok(op_xml(-1, 0, "")));
        let snaps = manager(&fake, "3.6.0").await;

        let err = snaps.create(&gv1(), "fake_snap_id").await.unwrap_err();
        assert_matches!(err, Error::SnapshotFailed { .. });
        assert!(snaps.no_snap_cache().is_empty());
    }

    #[tokio::test]
    async fn test_cached_marker_without_remote_call() {
        for (version, soft) in [("3.6.0", false), ("3.7.0", true)] {
            let fake = FakeExecutor::new();
            let snaps = manager(&fake, version).await;
            snaps.no_snap_cache().mark(&gv1(), "fake error");

            let err = snaps.create(&gv1(), "fake_snap_id").await.unwrap_err();
            assert_eq!(err.is_soft(), soft);
            if !soft {
                assert_matches!(err, Error::SnapshotFailed { .. });
            }
            assert!(calls_after_setup(&fake).is_empty());
        }
    }

    #[tokio::test]
    async fn test_create_snapshot_below_snapshot_version() {
        let fake = FakeExecutor::new();
        fake.on(HOST, "--version", Reply::ok("glusterfs 3.6.0"));
        let cli = Arc::new(GlusterCli::new(fake.clone(), None));
        let gates = FeatureGates {
            snapshot: crate::backend::version::VersionTuple::new(3, 7),
            ..FeatureGates::default()
        };
        let versions = Arc::new(VersionGate::new(cli.clone(), gates));
        versions.setup(&[HOST.parse().unwrap()]).await.unwrap();
        let acl = Arc::new(AccessControlList::new(cli.clone()));
        let snaps = SnapshotManager::new(cli, versions, acl, "manila-", "manila-");

        let err = snaps.create(&gv1(), "fake_snap_id").await.unwrap_err();
        assert_matches!(
            err,
            Error::SnapshotFailed { source: CommandError::Refused { .. }, .. }
        );
        assert!(calls_after_setup(&fake).is_empty());
    }

    #[tokio::test]
    async fn test_create_snapshot_malformed_output() {
        let fake = FakeExecutor::new();
        fake.on(HOST, CREATE, Reply::ok("snapshot create: success"));
        let snaps = manager(&fake, "3.7.0").await;

        let err = snaps.create(&gv1(), "fake_snap_id").await.unwrap_err();
        assert_matches!(
            err,
            Error::SnapshotFailed { source: CommandError::Malformed { .. }, .. }
        );
    }

    #[tokio::test]
    async fn test_resolve_single_match() {
        let fake = FakeExecutor::new();
        fake.on(HOST, LIST, Reply::ok("fake_snap_id_xyz\n"));
        let snaps = manager(&fake, "3.6.0").await;

        assert_eq!(
            snaps.resolver.resolve(&gv1(), "fake_snap_id").await.unwrap(),
            "fake_snap_id_xyz"
        );
    }

    #[tokio::test]
    async fn test_resolve_rejects_zero_or_many() {
        for (listing, found) in [
            ("this is too bad", 0),
            ("fake_snap_id_xyx\nfake_snap_id_pqr", 2),
        ] {
            let fake = FakeExecutor::new();
            fake.on(HOST, LIST, Reply::ok(listing));
            let snaps = manager(&fake, "3.6.0").await;

            let err = snaps.resolver.resolve(&gv1(), "fake_snap_id").await.unwrap_err();
            assert_matches!(err, Error::AmbiguousSnapshot { found: n, .. } if n == found);
        }
    }

    #[tokio::test]
    async fn test_delete_snapshot() {
        let fake = FakeExecutor::new();
        fake.on(HOST, LIST, Reply::ok("manila-fake_snap_id_GMT-2015\n"));
        fake.on(
            HOST,
            "--xml snapshot delete manila-fake_snap_id_GMT-2015 --mode=script",
            Reply::ok(op_xml(0, 0, "")),
        );
        let snaps = manager(&fake, "3.6.0").await;

        snaps.delete(&gv1(), "fake_snap_id").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_ambiguous_issues_no_delete() {
        let fake = FakeExecutor::new();
        fake.on(HOST, LIST, Reply::ok("fake_snap_id_xyx\nfake_snap_id_pqr\n"));
        let snaps = manager(&fake, "3.6.0").await;

        let err = snaps.delete(&gv1(), "fake_snap_id").await.unwrap_err();
        assert_matches!(err, Error::AmbiguousSnapshot { found: 2, .. });
        assert_eq!(fake.count_prefix(HOST, "--xml snapshot delete"), 0);
    }

    #[tokio::test]
    async fn test_delete_snapshot_failure() {
        let fake = FakeExecutor::new();
        fake.on(HOST, LIST, Reply::ok("fake_snap_id_xyz\n"));
        fake.on_prefix(HOST, "--xml snapshot delete", Reply::ok(op_xml(-1, 2, "busy")));
        let snaps = manager(&fake, "3.6.0").await;

        let err = snaps.delete(&gv1(), "fake_snap_id").await.unwrap_err();
        assert_matches!(err, Error::SnapshotFailed { .. });
    }

    #[tokio::test]
    async fn test_clone_to_volume() {
        let fake = FakeExecutor::new();
        fake.on(HOST, LIST, Reply::ok("fake_snap_id_xyz\n"));
        fake.on(
            HOST,
            "--xml volume info manila-share2",
            Reply::ok(volume_info_xml(
                "manila-share2",
                &[("auth.ssl-allow", "glusterfs-server-1,client")],
            )),
        );
        let snaps = manager(&fake, "3.7.1").await;

        let volume = snaps
            .clone_to_volume(&gv1(), "fake_snap_id", "share2")
            .await
            .unwrap();

        assert_eq!(volume.to_string(), "root@host1:/manila-share2");
        assert_eq!(
            calls_after_setup(&fake),
            vec![
                LIST,
                "snapshot activate fake_snap_id_xyz force --mode=script",
                "snapshot clone manila-share2 fake_snap_id_xyz",
                "--xml volume info manila-share2",
                "volume set manila-share2 auth.ssl-allow glusterfs-server-1",
                "volume start manila-share2",
            ]
        );
    }

    #[tokio::test]
    async fn test_clone_requires_version() {
        let fake = FakeExecutor::new();
        let snaps = manager(&fake, "3.6.2").await;

        let err = snaps
            .clone_to_volume(&gv1(), "fake_snap_id", "share2")
            .await
            .unwrap_err();
        assert_matches!(err, Error::CloneNotSupported { .. });
        assert!(calls_after_setup(&fake).is_empty());
    }

    #[tokio::test]
    async fn test_clone_failure_stops_before_setup() {
        let fake = FakeExecutor::new();
        fake.on(HOST, LIST, Reply::ok("fake_snap_id_xyz\n"));
        fake.on_prefix(HOST, "snapshot clone", Reply::fail(1, "clone failed"));
        let snaps = manager(&fake, "3.7.1").await;

        let err = snaps
            .clone_to_volume(&gv1(), "fake_snap_id", "share2")
            .await
            .unwrap_err();
        assert_matches!(err, Error::SnapshotFailed { .. });
        assert_eq!(fake.count_prefix(HOST, "--xml volume info"), 0);
        assert_eq!(fake.count_prefix(HOST, "volume start"), 0);
    }

    #[tokio::test]
    async fn test_clone_setup_failure_after_clone() {
        let fake = FakeExecutor::new();
        fake.on(HOST, LIST, Reply::ok("fake_snap_id_xyz\n"));
        fake.on(HOST, "--xml volume info manila-share2", Reply::fail(1, "no such volume"));
        let snaps = manager(&fake, "3.7.1").await;

        let err = snaps
            .clone_to_volume(&gv1(), "fake_snap_id", "share2")
            .await
            .unwrap_err();
        assert_matches!(err, Error::VolumeSetupFailed { ref volume, .. } if volume == "root@host1:/manila-share2");
        assert_eq!(fake.count(HOST, "snapshot clone manila-share2 fake_snap_id_xyz"), 1);
        assert_eq!(fake.count_prefix(HOST, "volume set"), 0);
        assert_eq!(fake.count_prefix(HOST, "volume start"), 0);
    }
}

//! Volume Lifecycle Manager
//!
//! The share driver facade: binds pool volumes to shares, reclaims them, and
//! routes access and snapshot requests to the volume behind a share. Every
//! multi-phase operation on an existing volume runs under that volume's lock.

use crate::access::{AccessControlList, AccessType};
use crate::backend::address::{ServerAddress, VolumeAddress};
use crate::backend::cli::GlusterCli;
use crate::backend::version::VersionGate;
use crate::config::DriverConfig;
use crate::domain::ports::{
    AccessRule, CommandExecutorRef, Share, ShareDriver, ShareStats, Snapshot,
};
use crate::error::{Error, Result};
use crate::pool::{PoolVolume, UsedVolume, VolumePoolRegistry};
use crate::snapshot::SnapshotManager;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

const VENDOR_NAME: &str = "Red Hat";
const DRIVER_VERSION: &str = "1.1";
const STORAGE_PROTOCOL: &str = "glusterfs";

/// GlusterFS native share driver
pub struct VolumeLifecycleManager {
    backend_name: String,
    servers: Vec<ServerAddress>,
    cli: Arc<GlusterCli>,
    versions: Arc<VersionGate>,
    acl: Arc<AccessControlList>,
    pool: VolumePoolRegistry,
    snapshots: SnapshotManager,
    stats: RwLock<Option<ShareStats>>,
}

impl VolumeLifecycleManager {
    /// Build a driver from validated configuration over an executor
    pub fn new(config: &DriverConfig, executor: CommandExecutorRef) -> Result<Self> {
        config.validate()?;
        let servers = config.server_addresses()?;

        let cli = Arc::new(GlusterCli::new(executor, config.root_helper.clone()));
        let versions = Arc::new(VersionGate::new(cli.clone(), config.versions.clone()));
        let acl = Arc::new(AccessControlList::new(cli.clone()));
        let pool = VolumePoolRegistry::new(
            cli.clone(),
            versions.clone(),
            acl.clone(),
            servers.clone(),
            config.pattern()?,
        );
        let snapshots = SnapshotManager::new(
            cli.clone(),
            versions.clone(),
            acl.clone(),
            config.snapshot_prefix.clone(),
            config.volume_prefix.clone(),
        );

        Ok(Self {
            backend_name: config.backend_name.clone(),
            servers,
            cli,
            versions,
            acl,
            pool,
            snapshots,
            stats: RwLock::new(None),
        })
    }

    pub fn versions(&self) -> &VersionGate {
        &self.versions
    }

    pub fn free_volumes(&self) -> Vec<PoolVolume> {
        self.pool.free_volumes()
    }

    pub fn used_volumes(&self) -> Vec<UsedVolume> {
        self.pool.used_volumes()
    }

    pub fn poisoned_volumes(&self) -> Vec<VolumeAddress> {
        self.pool.poisoned_volumes()
    }

    /// Volume behind a share's export location
    fn share_volume(share: &Share) -> Result<VolumeAddress> {
        share
            .export_location
            .as_deref()
            .ok_or_else(|| Error::VolumeNotManaged {
                volume: format!("share {}", share.id),
            })?
            .parse()
    }

    fn compute_stats(&self) -> ShareStats {
        ShareStats {
            share_backend_name: self.backend_name.clone(),
            driver_handles_share_servers: false,
            vendor_name: VENDOR_NAME.to_string(),
            driver_version: DRIVER_VERSION.to_string(),
            storage_protocol: STORAGE_PROTOCOL.to_string(),
            reserved_percentage: 0,
            qos_support: false,
            total_capacity_gb: "infinite".to_string(),
            free_capacity_gb: "infinite".to_string(),
            snapshot_support: true,
        }
    }
}

#[async_trait]
impl ShareDriver for VolumeLifecycleManager {
    async fn do_setup(&self) -> Result<()> {
        info!("Setting up GlusterFS native driver for {} servers", self.servers.len());

        self.versions.setup(&self.servers).await?;

        self.pool.refresh().await?;
        if self.pool.is_empty() {
            return Err(Error::Configuration(
                "no compatible GlusterFS volumes found on the configured servers".to_string(),
            ));
        }

        self.cli
            .probe_mount_client()
            .await
            .map_err(|source| Error::BackendUnavailable {
                server: "local".to_string(),
                source,
            })?;

        info!(
            "Driver ready: {} free volumes, {} used",
            self.pool.free_volumes().len(),
            self.pool.used_volumes().len()
        );
        Ok(())
    }

    async fn ensure_share(&self, share: &Share) -> Result<()> {
        let volume = Self::share_volume(share)?;
        self.pool.adopt(&volume, &share.id)?;
        debug!("Share {} bound to {}", share.id, volume);
        Ok(())
    }

    async fn create_share(&self, share: &Share) -> Result<String> {
        self.pool.refresh().await?;
        let volume = self.pool.acquire(&share.id, share.size).await?;
        info!("Share {} exported as {}", share.id, volume);
        Ok(volume.to_string())
    }

    async fn delete_share(&self, share: &Share) -> Result<()> {
        let location = match share.export_location.as_deref() {
            Some(location) => location,
            None => {
                warn!("Share {} has no export location, nothing to delete", share.id);
                return Ok(());
            }
        };
        let volume: VolumeAddress = location.parse()?;
        self.pool.release(&volume).await?;
        info!("Share {} deleted, {} reclaimed", share.id, volume);
        Ok(())
    }

    async fn create_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let volume = Self::share_volume(&snapshot.share)?;
        let _guard = self.pool.lock_volume(&volume).await;
        self.snapshots.create(&volume, &snapshot.id).await
    }

    async fn delete_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let volume = Self::share_volume(&snapshot.share)?;
        let _guard = self.pool.lock_volume(&volume).await;
        self.snapshots.delete(&volume, &snapshot.id).await
    }

    async fn create_share_from_snapshot(
        &self,
        share: &Share,
        snapshot: &Snapshot,
    ) -> Result<String> {
        let source = Self::share_volume(&snapshot.share)?;
        let _guard = self.pool.lock_volume(&source).await;

        // the new volume is visible to refresh as soon as it is cloned
        let target = self.snapshots.clone_target(&source, &share.id);
        if target == source {
            return Err(Error::VolumeInUse {
                volume: target.to_string(),
                share: snapshot.share.id.clone(),
            });
        }
        let reservation = self.pool.reserve(&target, &share.id).await?;
        let volume = self
            .snapshots
            .clone_to_volume(&source, &snapshot.id, &share.id)
            .await?;
        reservation.commit();

        info!("Share {} created from snapshot {} as {}", share.id, snapshot.id, volume);
        Ok(volume.to_string())
    }

    async fn allow_access(&self, share: &Share, access: &AccessRule) -> Result<()> {
        AccessType::parse(&access.access_type)?;
        let volume = Self::share_volume(share)?;
        let _guard = self.pool.lock_volume(&volume).await;
        self.acl
            .allow(&volume, &access.access_type, &access.access_to)
            .await?;
        Ok(())
    }

    async fn deny_access(&self, share: &Share, access: &AccessRule) -> Result<()> {
        AccessType::parse(&access.access_type)?;
        let volume = Self::share_volume(share)?;
        let _guard = self.pool.lock_volume(&volume).await;
        self.acl
            .deny(&volume, &access.access_type, &access.access_to)
            .await?;
        Ok(())
    }

    async fn get_share_stats(&self, refresh: bool) -> ShareStats {
        if !refresh {
            if let Some(stats) = self.stats.read().clone() {
                return stats;
            }
        }
        let stats = self.compute_stats();
        *self.stats.write() = Some(stats.clone());
        stats
    }

    fn backend_name(&self) -> &str {
        &self.backend_name
    }
}

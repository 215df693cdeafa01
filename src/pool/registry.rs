//! Volume Pool Registry
//!
//! Tracks which backend volumes are free and which are bound to shares.
//! The free list is rebuilt from the servers' volume listings on refresh; the
//! used set is authoritative and survives refreshes, so a volume bound to a
//! share (or poisoned by a failed wipe) never reappears as free.

use super::locks::{VolumeGuard, VolumeLocks};
use super::pattern::VolumePattern;
use crate::access::AccessControlList;
use crate::backend::address::{ServerAddress, VolumeAddress};
use crate::backend::cli::{GlusterCli, CLIENT_SSL, NFS_EXPORT_VOLUMES, SERVER_SSL};
use crate::backend::version::{Feature, VersionGate};
use crate::error::{CommandError, Error, Result};
use crate::wipe::WipeSequence;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

// =============================================================================
// Pool Entries
// =============================================================================

/// A free volume and the size its name advertises
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolVolume {
    pub address: VolumeAddress,
    /// Size in GB, `None` for volumes of any size
    pub size: Option<u64>,
}

/// A volume bound to a share
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsedVolume {
    pub address: VolumeAddress,
    /// Share the volume is bound to
    pub share: String,
    pub size: Option<u64>,
    pub acquired_at: DateTime<Utc>,
    /// A wipe failed; the volume stays out of the pool until a wipe succeeds
    pub poisoned: bool,
}

#[derive(Debug, Default)]
struct PoolState {
    /// Free volumes in refresh order
    free: Vec<PoolVolume>,
    used: BTreeMap<VolumeAddress, UsedVolume>,
}

impl PoolState {
    fn bind(&mut self, volume: &PoolVolume, share: &str) {
        self.used.insert(
            volume.address.clone(),
            UsedVolume {
                address: volume.address.clone(),
                share: share.to_string(),
                size: volume.size,
                acquired_at: Utc::now(),
                poisoned: false,
            },
        );
    }

    fn take_free(&mut self, volume: &VolumeAddress) -> Option<PoolVolume> {
        let i = self.free.iter().position(|v| v.address == *volume)?;
        Some(self.free.remove(i))
    }

    /// Refuse a volume already bound to some share other than `share`
    fn check_owner(&self, volume: &VolumeAddress, share: Option<&str>) -> Result<bool> {
        match self.used.get(volume) {
            Some(used) if Some(used.share.as_str()) == share => Ok(true),
            Some(used) => Err(Error::VolumeInUse {
                volume: volume.to_string(),
                share: used.share.clone(),
            }),
            None => Ok(false),
        }
    }
}

/// Indices into `free` in order of preference for a requested size
///
/// Without a size every volume qualifies. With one, exact matches come first,
/// then volumes of unspecified size.
pub fn candidates(free: &[PoolVolume], size: Option<u64>) -> Vec<usize> {
    match size {
        None => (0..free.len()).collect(),
        Some(wanted) => {
            let exact = free
                .iter()
                .enumerate()
                .filter(|(_, v)| v.size == Some(wanted))
                .map(|(i, _)| i);
            let any_size = free
                .iter()
                .enumerate()
                .filter(|(_, v)| v.size.is_none())
                .map(|(i, _)| i);
            exact.chain(any_size).collect()
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Free and used backend volumes across all servers
pub struct VolumePoolRegistry {
    cli: Arc<GlusterCli>,
    versions: Arc<VersionGate>,
    acl: Arc<AccessControlList>,
    servers: Vec<ServerAddress>,
    pattern: Option<VolumePattern>,
    state: Mutex<PoolState>,
    locks: VolumeLocks,
}

impl VolumePoolRegistry {
    pub fn new(
        cli: Arc<GlusterCli>,
        versions: Arc<VersionGate>,
        acl: Arc<AccessControlList>,
        servers: Vec<ServerAddress>,
        pattern: Option<VolumePattern>,
    ) -> Self {
        Self {
            cli,
            versions,
            acl,
            servers,
            pattern,
            state: Mutex::new(PoolState::default()),
            locks: VolumeLocks::new(),
        }
    }

    pub fn servers(&self) -> &[ServerAddress] {
        &self.servers
    }

    fn admit(&self, name: &str) -> Option<Option<u64>> {
        match &self.pattern {
            Some(pattern) => pattern.admit(name),
            None => Some(None),
        }
    }

    /// Rebuild the free list from the servers' listings
    ///
    /// Returns the number of free volumes. Any listing failure aborts the
    /// refresh and leaves the previous pool in place.
    pub async fn refresh(&self) -> Result<usize> {
        let listings = try_join_all(self.servers.iter().map(|server| async move {
            let names = self.cli.list_volumes(server).await.map_err(|source| {
                Error::BackendUnavailable {
                    server: server.to_string(),
                    source,
                }
            })?;
            Ok::<_, Error>((server, names))
        }))
        .await?;

        let listed: Vec<PoolVolume> = listings
            .into_iter()
            .flat_map(|(server, names)| {
                names.into_iter().filter_map(move |name| {
                    let size = self.admit(&name)?;
                    Some(PoolVolume {
                        address: server.volume(name),
                        size,
                    })
                })
            })
            .collect();

        let mut state = self.state.lock();
        let free: Vec<PoolVolume> = listed
            .into_iter()
            .filter(|v| !state.used.contains_key(&v.address))
            .collect();
        state.free = free;
        debug!(
            "Pool refreshed: {} free, {} used",
            state.free.len(),
            state.used.len()
        );
        Ok(state.free.len())
    }

    /// Bind a free volume to `share` for `size` GB and prepare it for serving
    pub async fn acquire(&self, share: &str, size: Option<u64>) -> Result<VolumeAddress> {
        let (volume, index, _guard) = self.select(share, size)?;
        info!(
            "Selected volume {} for requested size {:?}",
            volume.address, size
        );

        if let Err(source) = self.setup_volume(&volume.address).await {
            error!("Setup of volume {} failed: {}", volume.address, source);
            let mut state = self.state.lock();
            state.used.remove(&volume.address);
            let at = index.min(state.free.len());
            state.free.insert(at, volume.clone());
            return Err(Error::VolumeSetupFailed {
                volume: volume.address.to_string(),
                source,
            });
        }

        Ok(volume.address)
    }

    /// Pick a free volume and move it to the used set
    fn select(&self, share: &str, size: Option<u64>) -> Result<(PoolVolume, usize, VolumeGuard)> {
        let mut state = self.state.lock();
        let picked = candidates(&state.free, size)
            .into_iter()
            .find_map(|i| Some((i, self.locks.try_lock(&state.free[i].address)?)));

        let (index, guard) = picked.ok_or(Error::PoolExhausted { size })?;
        let volume = state.free.remove(index);
        state.bind(&volume, share);
        Ok((volume, index, guard))
    }

    /// One-time configuration of a newly bound volume
    async fn setup_volume(&self, volume: &VolumeAddress) -> std::result::Result<(), CommandError> {
        self.acl.reset_to_baseline(volume).await?;
        for (option, value) in [(NFS_EXPORT_VOLUMES, "off"), (CLIENT_SSL, "on"), (SERVER_SSL, "on")] {
            self.cli.set_option(volume, option, value).await?;
        }
        self.cli.restart(volume).await
    }

    /// Wipe a used volume and return it to the free list
    pub async fn release(&self, volume: &VolumeAddress) -> Result<()> {
        self.ensure_used(volume)?;
        let _guard = self.locks.lock(volume).await;
        self.ensure_used(volume)?;

        let spare_trashcan = self.versions.supports(volume.server(), Feature::TrashAwareWipe)?;
        let report = WipeSequence::new(&self.cli, volume, spare_trashcan).run().await;

        let mut state = self.state.lock();
        if report.succeeded() {
            if let Some(used) = state.used.remove(volume) {
                state.free.push(PoolVolume {
                    address: used.address,
                    size: used.size,
                });
            }
            info!("Volume {} returned to the pool", volume);
        } else if let Some(used) = state.used.get_mut(volume) {
            warn!("Volume {} poisoned by failed wipe", volume);
            used.poisoned = true;
        }
        drop(state);

        report.into_result()
    }

    /// Mark an existing volume as bound to `share` without preparing it
    ///
    /// Adopting a volume again for the same share is a no-op.
    pub fn adopt(&self, volume: &VolumeAddress, share: &str) -> Result<()> {
        self.ensure_known_server(volume)?;

        let mut state = self.state.lock();
        if state.check_owner(volume, Some(share))? {
            return Ok(());
        }

        let entry = state.take_free(volume).unwrap_or_else(|| PoolVolume {
            address: volume.clone(),
            size: self.admit(volume.volume()).flatten(),
        });
        state.bind(&entry, share);
        debug!("Adopted volume {} for share {}", volume, share);
        Ok(())
    }

    /// Claim a volume that is about to be created on the backend
    ///
    /// The volume is locked and marked used for `share` until the returned
    /// [`Reservation`] is committed or dropped, so no refresh or acquire can
    /// hand it to another share in the meantime.
    pub async fn reserve(&self, volume: &VolumeAddress, share: &str) -> Result<Reservation<'_>> {
        self.ensure_known_server(volume)?;
        self.state.lock().check_owner(volume, None)?;
        let guard = self.locks.lock(volume).await;

        let mut state = self.state.lock();
        state.check_owner(volume, None)?;
        let was_free = state.take_free(volume);
        let entry = was_free.clone().unwrap_or_else(|| PoolVolume {
            address: volume.clone(),
            size: self.admit(volume.volume()).flatten(),
        });
        state.bind(&entry, share);
        drop(state);

        debug!("Reserved volume {} for share {}", volume, share);
        Ok(Reservation {
            pool: self,
            volume: volume.clone(),
            was_free,
            committed: false,
            _guard: guard,
        })
    }

    fn ensure_known_server(&self, volume: &VolumeAddress) -> Result<()> {
        if self.servers.contains(volume.server()) {
            Ok(())
        } else {
            Err(Error::UnknownServer {
                server: volume.server().to_string(),
            })
        }
    }

    fn ensure_used(&self, volume: &VolumeAddress) -> Result<()> {
        if self.is_used(volume) {
            Ok(())
        } else {
            Err(Error::VolumeNotManaged {
                volume: volume.to_string(),
            })
        }
    }

    /// Hold a volume's lock for a multi-phase operation
    pub async fn lock_volume(&self, volume: &VolumeAddress) -> VolumeGuard {
        self.locks.lock(volume).await
    }

    // =========================================================================
    // Views
    // =========================================================================

    pub fn free_volumes(&self) -> Vec<PoolVolume> {
        self.state.lock().free.clone()
    }

    pub fn used_volumes(&self) -> Vec<UsedVolume> {
        self.state.lock().used.values().cloned().collect()
    }

    pub fn is_used(&self, volume: &VolumeAddress) -> bool {
        self.state.lock().used.contains_key(volume)
    }

    pub fn poisoned_volumes(&self) -> Vec<VolumeAddress> {
        self.state
            .lock()
            .used
            .values()
            .filter(|u| u.poisoned)
            .map(|u| u.address.clone())
            .collect()
    }

    /// Total number of known volumes, free and used
    pub fn len(&self) -> usize {
        let state = self.state.lock();
        state.free.len() + state.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Reservation
// =============================================================================

/// A volume held out of the pool while it is being created
///
/// Dropping an uncommitted reservation unbinds the volume and returns it to
/// the free list if it was there before.
pub struct Reservation<'a> {
    pool: &'a VolumePoolRegistry,
    volume: VolumeAddress,
    was_free: Option<PoolVolume>,
    committed: bool,
    _guard: VolumeGuard,
}

impl Reservation<'_> {
    pub fn volume(&self) -> &VolumeAddress {
        &self.volume
    }

    /// Keep the binding
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let mut state = self.pool.state.lock();
        state.used.remove(&self.volume);
        if let Some(volume) = self.was_free.take() {
            state.free.push(volume);
        }
        debug!("Reservation of {} released", self.volume);
    }
}

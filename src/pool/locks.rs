//! Per-volume locks

use crate::backend::address::VolumeAddress;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Guard held for the duration of a multi-phase operation on one volume
pub type VolumeGuard = OwnedMutexGuard<()>;

/// Lazily created mutex per volume identity
#[derive(Default)]
pub struct VolumeLocks {
    locks: DashMap<VolumeAddress, Arc<Mutex<()>>>,
}

impl VolumeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, volume: &VolumeAddress) -> Arc<Mutex<()>> {
        self.locks
            .entry(volume.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Take a volume's lock, waiting for any operation in progress
    pub async fn lock(&self, volume: &VolumeAddress) -> VolumeGuard {
        self.entry(volume).lock_owned().await
    }

    /// Take a volume's lock only if it is free right now
    pub fn try_lock(&self, volume: &VolumeAddress) -> Option<VolumeGuard> {
        self.entry(volume).try_lock_owned().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_try_lock_fails_while_held() {
        let locks = VolumeLocks::new();
        let gv1: VolumeAddress = "host1:/gv1".parse().unwrap();
        let gv2: VolumeAddress = "host1:/gv2".parse().unwrap();

        let guard = locks.lock(&gv1).await;
        assert!(locks.try_lock(&gv1).is_none());
        assert!(locks.try_lock(&gv2).is_some());

        drop(guard);
        assert!(locks.try_lock(&gv1).is_some());
    }
}

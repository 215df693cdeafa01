//! Volume Wipe
//!
//! Reclaiming a volume clears its contents through a native mount. TLS has to
//! be off for the driver host to mount, so the sequence is bracketed by
//! disabling and re-enabling it, with restarts to apply each change.
//!
//! The sequence is an explicit state machine: [`WipePhase::next`] decides the
//! following phase from the outcome of the current one, so every restore phase
//! that must run after a failure is a transition in one table.
//!
//! ```text
//!  DisableClientTls ──fail──▶ (end)
//!         │ok
//!  DisableServerTls ──fail──▶ (end)
//!         │ok
//!       Restart ──────fail──────────────┐
//!         │ok                           │
//!        Mount ───────fail──────────────┤
//!         │ok                           │
//!       Delete ──────any──▶ Unmount ──any──▶ EnableServerTls ──any──▶ EnableClientTls
//!                                                                          │any
//!                                                                     FinalRestart
//! ```

use crate::backend::address::VolumeAddress;
use crate::backend::cli::{GlusterCli, CLIENT_SSL, SERVER_SSL};
use crate::error::{CommandError, Error, Result};
use std::fmt;
use std::path::PathBuf;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// One step of the wipe sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WipePhase {
    DisableClientTls,
    DisableServerTls,
    Restart,
    Mount,
    Delete,
    Unmount,
    EnableServerTls,
    EnableClientTls,
    FinalRestart,
}

impl WipePhase {
    pub const FIRST: WipePhase = WipePhase::DisableClientTls;

    /// The phase to run after this one
    pub fn next(self, succeeded: bool) -> Option<WipePhase> {
        use WipePhase::*;
        match (self, succeeded) {
            (DisableClientTls, true) => Some(DisableServerTls),
            (DisableClientTls, false) => None,
            (DisableServerTls, true) => Some(Restart),
            (DisableServerTls, false) => None,
            (Restart, true) => Some(Mount),
            // TLS is restored even when the volume was never mounted, so a
            // failed restart or mount does not leave it serving plaintext.
            (Restart, false) => Some(EnableServerTls),
            (Mount, true) => Some(Delete),
            (Mount, false) => Some(EnableServerTls),
            (Delete, _) => Some(Unmount),
            (Unmount, _) => Some(EnableServerTls),
            (EnableServerTls, _) => Some(EnableClientTls),
            (EnableClientTls, _) => Some(FinalRestart),
            (FinalRestart, _) => None,
        }
    }
}

impl fmt::Display for WipePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WipePhase::DisableClientTls => "client TLS disable",
            WipePhase::DisableServerTls => "server TLS disable",
            WipePhase::Restart => "restart",
            WipePhase::Mount => "mount",
            WipePhase::Delete => "delete",
            WipePhase::Unmount => "unmount",
            WipePhase::EnableServerTls => "server TLS enable",
            WipePhase::EnableClientTls => "client TLS enable",
            WipePhase::FinalRestart => "final restart",
        };
        f.write_str(name)
    }
}

/// Outcome of a wipe sequence
#[derive(Debug)]
pub struct WipeReport {
    pub volume: VolumeAddress,
    /// Phases run, in order, with whether each succeeded
    pub phases: Vec<(WipePhase, bool)>,
    /// Failed phases with their causes, in order
    pub failures: Vec<(WipePhase, CommandError)>,
    /// Scratch directory left behind because unmounting it failed
    pub kept_scratch: Option<PathBuf>,
}

impl WipeReport {
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn ran(&self, phase: WipePhase) -> bool {
        self.phases.iter().any(|(p, _)| *p == phase)
    }

    /// Report the first failure, if any
    pub fn into_result(self) -> Result<()> {
        match self.failures.into_iter().next() {
            None => Ok(()),
            Some((phase, source)) => Err(Error::WipeFailed {
                volume: self.volume.to_string(),
                phase,
                source,
            }),
        }
    }
}

/// A single run of the wipe sequence over one volume
pub struct WipeSequence<'a> {
    cli: &'a GlusterCli,
    volume: &'a VolumeAddress,
    spare_trashcan: bool,
    scratch: Option<TempDir>,
}

impl<'a> WipeSequence<'a> {
    /// `spare_trashcan` keeps the backend's trash directories in place
    pub fn new(cli: &'a GlusterCli, volume: &'a VolumeAddress, spare_trashcan: bool) -> Self {
        Self {
            cli,
            volume,
            spare_trashcan,
            scratch: None,
        }
    }

    pub async fn run(mut self) -> WipeReport {
        let mut report = WipeReport {
            volume: self.volume.clone(),
            phases: Vec::new(),
            failures: Vec::new(),
            kept_scratch: None,
        };

        info!("Wiping volume {}", self.volume);
        let mut phase = Some(WipePhase::FIRST);
        while let Some(current) = phase {
            let outcome = self.step(current, &mut report).await;
            let succeeded = outcome.is_ok();
            report.phases.push((current, succeeded));
            if let Err(e) = outcome {
                warn!("Wipe of {} failed at {}: {}", self.volume, current, e);
                report.failures.push((current, e));
            }
            phase = current.next(succeeded);
        }

        if report.succeeded() {
            info!("Wiped volume {}", self.volume);
        }
        report
    }

    async fn step(
        &mut self,
        phase: WipePhase,
        report: &mut WipeReport,
    ) -> std::result::Result<(), CommandError> {
        debug!("Wipe {}: {}", self.volume, phase);
        match phase {
            WipePhase::DisableClientTls => self.cli.set_option(self.volume, CLIENT_SSL, "off").await,
            WipePhase::DisableServerTls => self.cli.set_option(self.volume, SERVER_SSL, "off").await,
            WipePhase::Restart | WipePhase::FinalRestart => self.cli.restart(self.volume).await,
            WipePhase::Mount => {
                let dir = TempDir::new().map_err(CommandError::Scratch)?;
                self.cli.mount(self.volume, dir.path()).await?;
                self.scratch = Some(dir);
                Ok(())
            }
            WipePhase::Delete => match &self.scratch {
                Some(dir) => self.cli.delete_contents(dir.path(), self.spare_trashcan).await,
                None => Err(CommandError::Refused {
                    reason: "volume is not mounted".to_string(),
                }),
            },
            WipePhase::Unmount => {
                let dir = match self.scratch.take() {
                    Some(dir) => dir,
                    None => return Ok(()),
                };
                match self.cli.umount(dir.path()).await {
                    Ok(()) => {
                        if let Err(e) = dir.close() {
                            warn!("Failed to remove scratch directory: {}", e);
                        }
                        Ok(())
                    }
                    Err(e) => {
                        let kept = dir.keep();
                        warn!("Keeping scratch directory {} of {}", kept.display(), self.volume);
                        report.kept_scratch = Some(kept);
                        Err(e)
                    }
                }
            }
            WipePhase::EnableServerTls => self.cli.set_option(self.volume, SERVER_SSL, "on").await,
            WipePhase::EnableClientTls => self.cli.set_option(self.volume, CLIENT_SSL, "on").await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeExecutor, Reply};
    use assert_matches::assert_matches;
    use std::sync::Arc;

    const HOST: &str = "root@host1";

    fn cli(fake: &Arc<FakeExecutor>) -> GlusterCli {
        GlusterCli::new(fake.clone(), Some(vec!["sudo".to_string()]))
    }

    fn gv1() -> VolumeAddress {
        "root@host1:/gv1".parse().unwrap()
    }

    async fn wipe(fake: &Arc<FakeExecutor>, spare_trashcan: bool) -> WipeReport {
        let cli = cli(fake);
        let volume = gv1();
        WipeSequence::new(&cli, &volume, spare_trashcan).run().await
    }

    #[test]
    fn test_transitions() {
        use WipePhase::*;
        assert_eq!(DisableClientTls.next(false), None);
        assert_eq!(DisableServerTls.next(false), None);
        assert_eq!(Restart.next(false), Some(EnableServerTls));
        assert_eq!(Mount.next(false), Some(EnableServerTls));
        assert_eq!(Delete.next(false), Some(Unmount));
        assert_eq!(Unmount.next(false), Some(EnableServerTls));
        assert_eq!(EnableServerTls.next(false), Some(EnableClientTls));
        assert_eq!(FinalRestart.next(true), None);

        let mut phase = Some(WipePhase::FIRST);
        let mut happy = Vec::new();
        while let Some(p) = phase {
            happy.push(p);
            phase = p.next(true);
        }
        assert_eq!(happy.len(), 9);
    }

    #[tokio::test]
    async fn test_full_wipe() {
        let fake = FakeExecutor::new();
        let report = wipe(&fake, false).await;

        assert!(report.succeeded());
        assert!(report.kept_scratch.is_none());
        assert_eq!(
            fake.commands(HOST),
            vec![
                "volume set gv1 client.ssl off",
                "volume set gv1 server.ssl off",
                "volume stop gv1 --mode=script",
                "volume start gv1",
                "volume set gv1 server.ssl on",
                "volume set gv1 client.ssl on",
                "volume stop gv1 --mode=script",
                "volume start gv1",
            ]
        );

        let local = fake.commands("local");
        assert_eq!(local.len(), 3);
        assert!(local[0].starts_with("sudo mount -t glusterfs host1:/gv1 "));
        assert!(local[1].starts_with("sudo find "));
        assert!(local[1].ends_with(" -mindepth 1 -delete"));
        assert!(local[2].starts_with("sudo umount "));
    }

    #[tokio::test]
    async fn test_scratch_dir_removed_after_unmount() {
        let fake = FakeExecutor::new();
        wipe(&fake, false).await;

        let mount = &fake.commands("local")[0];
        let dir = mount.rsplit(' ').next().unwrap();
        assert!(!std::path::Path::new(dir).exists());
    }

    #[tokio::test]
    async fn test_trash_aware_wipe_spares_trashcan() {
        let fake = FakeExecutor::new();
        wipe(&fake, true).await;

        let find = &fake.commands("local")[1];
        assert!(find.contains("/.trashcan ! -path "));
        assert!(find.ends_with("/.trashcan/internal_op -delete"));
    }

    #[tokio::test]
    async fn test_client_tls_disable_failure_stops_everything() {
        let fake = FakeExecutor::new();
        fake.on(HOST, "volume set gv1 client.ssl off", Reply::fail(1, "failed"));

        let report = wipe(&fake, false).await;

        assert_eq!(fake.commands(HOST), vec!["volume set gv1 client.ssl off"]);
        assert!(fake.commands("local").is_empty());
        assert_matches!(
            report.into_result(),
            Err(Error::WipeFailed { phase: WipePhase::DisableClientTls, .. })
        );
    }

    #[tokio::test]
    async fn test_server_tls_disable_failure_stops_everything() {
        let fake = FakeExecutor::new();
        fake.on(HOST, "volume set gv1 server.ssl off", Reply::fail(1, "failed"));

        let report = wipe(&fake, false).await;

        assert_eq!(fake.count_prefix(HOST, "volume stop"), 0);
        assert_eq!(fake.count(HOST, "volume set gv1 client.ssl on"), 0);
        assert!(fake.commands("local").is_empty());
        assert_matches!(
            report.into_result(),
            Err(Error::WipeFailed { phase: WipePhase::DisableServerTls, .. })
        );
    }

    #[tokio::test]
    async fn test_delete_failure_still_restores() {
        let fake = FakeExecutor::new();
        fake.on_prefix("local", "sudo find", Reply::fail(1, "Permission denied"));

        let report = wipe(&fake, false).await;

        assert_eq!(fake.count_prefix("local", "sudo umount"), 1);
        assert_eq!(fake.count(HOST, "volume set gv1 server.ssl on"), 1);
        assert_eq!(fake.count(HOST, "volume set gv1 client.ssl on"), 1);
        assert_eq!(fake.count_prefix(HOST, "volume stop"), 2);
        assert_matches!(
            report.into_result(),
            Err(Error::WipeFailed { phase: WipePhase::Delete, .. })
        );
    }

    #[tokio::test]
    async fn test_mount_failure_skips_unmount() {
        let fake = FakeExecutor::new();
        fake.on_prefix("local", "sudo mount", Reply::fail(32, "mount failed"));

        let report = wipe(&fake, false).await;

        assert!(!report.ran(WipePhase::Delete));
        assert!(!report.ran(WipePhase::Unmount));
        assert_eq!(fake.commands("local").len(), 1);
        assert_eq!(fake.count(HOST, "volume set gv1 server.ssl on"), 1);
        assert_eq!(fake.count(HOST, "volume set gv1 client.ssl on"), 1);
        assert_matches!(
            report.into_result(),
            Err(Error::WipeFailed { phase: WipePhase::Mount, .. })
        );
    }

    #[tokio::test]
    async fn test_restart_failure_skips_mount_but_restores() {
        let fake = FakeExecutor::new();
        fake.on(HOST, "volume start gv1", Reply::fail(1, "start failed"));
        fake.on(HOST, "volume start gv1", Reply::ok(""));

        let report = wipe(&fake, false).await;

        assert!(fake.commands("local").is_empty());
        assert_eq!(fake.count(HOST, "volume set gv1 server.ssl on"), 1);
        assert_eq!(fake.count(HOST, "volume start gv1"), 2);
        assert_eq!(report.failures.len(), 1);
        assert_matches!(
            report.into_result(),
            Err(Error::WipeFailed { phase: WipePhase::Restart, .. })
        );
    }

    #[tokio::test]
    async fn test_unmount_failure_keeps_scratch_dir() {
        let fake = FakeExecutor::new();
        fake.on_prefix("local", "sudo umount", Reply::fail(1, "target is busy"));

        let report = wipe(&fake, false).await;

        let kept = report.kept_scratch.clone().unwrap();
        assert!(kept.exists());
        assert_eq!(fake.count(HOST, "volume set gv1 client.ssl on"), 1);
        assert_matches!(
            report.into_result(),
            Err(Error::WipeFailed { phase: WipePhase::Unmount, .. })
        );
        std::fs::remove_dir(kept).unwrap();
    }

    #[tokio::test]
    async fn test_first_failure_is_reported() {
        let fake = FakeExecutor::new();
        fake.on_prefix("local", "sudo find", Reply::fail(1, "find failed"));
        fake.on(HOST, "volume set gv1 client.ssl on", Reply::fail(1, "set failed"));

        let report = wipe(&fake, false).await;
        assert_eq!(report.failures.len(), 2);
        assert_matches!(
            report.into_result(),
            Err(Error::WipeFailed { phase: WipePhase::Delete, .. })
        );
    }
}

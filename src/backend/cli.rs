//! GlusterFS Administrative Commands
//!
//! Builds the argument vectors for every administrative operation the driver
//! performs and decodes their output. Executor errors are converted into
//! [`CommandError`] here; callers wrap that into the domain error for the
//! operation at hand.

use super::address::{ServerAddress, VolumeAddress};
use super::output::{self, OpStatus};
use super::version::VersionTuple;
use crate::domain::ports::{CommandExecutorRef, CommandOutput, CommandTarget, ExecError};
use crate::error::CommandError;
use std::path::Path;
use tracing::debug;

/// Volume option holding the TLS principal allow-list
pub const AUTH_SSL_ALLOW: &str = "auth.ssl-allow";
pub const CLIENT_SSL: &str = "client.ssl";
pub const SERVER_SSL: &str = "server.ssl";
pub const NFS_EXPORT_VOLUMES: &str = "nfs.export-volumes";

/// Trash-can directories the backend keeps inside every volume
const TRASHCAN_DIRS: [&str; 2] = [".trashcan", ".trashcan/internal_op"];

/// Typed front-end to the volume-management tool
pub struct GlusterCli {
    executor: CommandExecutorRef,
    root_helper: Vec<String>,
}

impl GlusterCli {
    /// Create a CLI over an executor; `root_helper` prefixes privileged local commands
    pub fn new(executor: CommandExecutorRef, root_helper: Option<Vec<String>>) -> Self {
        Self {
            executor,
            root_helper: root_helper.unwrap_or_default(),
        }
    }

    // =========================================================================
    // Raw Invocation
    // =========================================================================

    async fn gluster(
        &self,
        server: &ServerAddress,
        args: &[&str],
    ) -> Result<CommandOutput, CommandError> {
        let argv: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        debug!("gluster {} on {}", argv.join(" "), server);
        let out = self
            .executor
            .execute(&CommandTarget::Server(server.clone()), &argv)
            .await?;
        Ok(out)
    }

    async fn local(&self, args: &[&str], privileged: bool) -> Result<CommandOutput, CommandError> {
        let mut argv: Vec<String> = Vec::with_capacity(self.root_helper.len() + args.len());
        if privileged {
            argv.extend(self.root_helper.iter().cloned());
        }
        argv.extend(args.iter().map(|a| a.to_string()));
        debug!("local: {}", argv.join(" "));
        let out = self.executor.execute(&CommandTarget::Local, &argv).await?;
        Ok(out)
    }

    /// Run a structured (`--xml`) command and decode its result record
    async fn gluster_xml(
        &self,
        server: &ServerAddress,
        args: &[&str],
    ) -> Result<OpStatus, CommandError> {
        let out = self.gluster(server, args).await?;
        output::decode_op_status(&out.stdout).map_err(|reason| CommandError::Malformed {
            command: args.join(" "),
            reason,
        })
    }

    // =========================================================================
    // Server Queries
    // =========================================================================

    /// Version of the backend software on a server
    pub async fn version(&self, server: &ServerAddress) -> Result<VersionTuple, CommandError> {
        let out = self.gluster(server, &["--version"]).await?;
        output::parse_version(&out.stdout).map_err(|reason| CommandError::Malformed {
            command: "--version".to_string(),
            reason,
        })
    }

    /// Names of all volumes administered by a server
    pub async fn list_volumes(&self, server: &ServerAddress) -> Result<Vec<String>, CommandError> {
        let out = self.gluster(server, &["volume", "list"]).await?;
        Ok(output::parse_volume_list(&out.stdout))
    }

    // =========================================================================
    // Volume Configuration
    // =========================================================================

    /// Current value of a volume option, `None` if unset
    pub async fn volume_option(
        &self,
        volume: &VolumeAddress,
        option: &str,
    ) -> Result<Option<String>, CommandError> {
        let args = ["--xml", "volume", "info", volume.volume()];
        let out = self.gluster(volume.server(), &args).await?;
        let malformed = |reason| CommandError::Malformed {
            command: args.join(" "),
            reason,
        };
        let (status, value) =
            output::decode_volume_option(&out.stdout, volume.volume(), option).map_err(malformed)?;
        check_status(&args.join(" "), status)?;
        Ok(value)
    }

    pub async fn set_option(
        &self,
        volume: &VolumeAddress,
        option: &str,
        value: &str,
    ) -> Result<(), CommandError> {
        self.gluster(volume.server(), &["volume", "set", volume.volume(), option, value])
            .await?;
        Ok(())
    }

    pub async fn start(&self, volume: &VolumeAddress) -> Result<(), CommandError> {
        self.gluster(volume.server(), &["volume", "start", volume.volume()])
            .await?;
        Ok(())
    }

    /// Stop and start a volume so configuration changes take effect
    pub async fn restart(&self, volume: &VolumeAddress) -> Result<(), CommandError> {
        self.gluster(
            volume.server(),
            &["volume", "stop", volume.volume(), "--mode=script"],
        )
        .await?;
        self.start(volume).await
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Issue a snapshot; the result record is returned undecided
    pub async fn snapshot_create(
        &self,
        volume: &VolumeAddress,
        name: &str,
    ) -> Result<OpStatus, CommandError> {
        self.gluster_xml(
            volume.server(),
            &["--xml", "snapshot", "create", name, volume.volume()],
        )
        .await
    }

    pub async fn snapshot_delete(
        &self,
        server: &ServerAddress,
        name: &str,
    ) -> Result<OpStatus, CommandError> {
        self.gluster_xml(server, &["--xml", "snapshot", "delete", name, "--mode=script"])
            .await
    }

    /// Raw `snapshot list` output for a volume
    pub async fn snapshot_list(&self, volume: &VolumeAddress) -> Result<String, CommandError> {
        let out = self
            .gluster(
                volume.server(),
                &["snapshot", "list", volume.volume(), "--mode=script"],
            )
            .await?;
        Ok(out.stdout)
    }

    pub async fn snapshot_activate(
        &self,
        server: &ServerAddress,
        name: &str,
    ) -> Result<(), CommandError> {
        self.gluster(server, &["snapshot", "activate", name, "force", "--mode=script"])
            .await?;
        Ok(())
    }

    /// Create `new_volume` on `server` from a snapshot
    pub async fn snapshot_clone(
        &self,
        server: &ServerAddress,
        new_volume: &str,
        name: &str,
    ) -> Result<(), CommandError> {
        self.gluster(server, &["snapshot", "clone", new_volume, name])
            .await?;
        Ok(())
    }

    // =========================================================================
    // Local Host
    // =========================================================================

    /// Check the native-protocol mount helper is installed
    ///
    /// The helper exits non-zero when run bare; only a missing program fails.
    pub async fn probe_mount_client(&self) -> Result<(), CommandError> {
        match self.local(&["mount.glusterfs"], false).await {
            Ok(_) | Err(CommandError::Exec(ExecError::Failed { .. })) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub async fn mount(&self, volume: &VolumeAddress, mount_point: &Path) -> Result<(), CommandError> {
        let source = volume.mount_source();
        let target = mount_point.to_string_lossy();
        self.local(&["mount", "-t", "glusterfs", source.as_str(), target.as_ref()], true)
            .await?;
        Ok(())
    }

    pub async fn umount(&self, mount_point: &Path) -> Result<(), CommandError> {
        let target = mount_point.to_string_lossy();
        self.local(&["umount", target.as_ref()], true).await?;
        Ok(())
    }

    /// Delete everything beneath a mount point, optionally sparing the trash can
    pub async fn delete_contents(
        &self,
        mount_point: &Path,
        spare_trashcan: bool,
    ) -> Result<(), CommandError> {
        let root = mount_point.to_string_lossy().into_owned();
        let excluded: Vec<String> = if spare_trashcan {
            TRASHCAN_DIRS
                .iter()
                .map(|d| mount_point.join(d).to_string_lossy().into_owned())
                .collect()
        } else {
            Vec::new()
        };

        let mut args: Vec<&str> = vec!["find", root.as_str(), "-mindepth", "1"];
        for path in &excluded {
            args.extend(["!", "-path", path.as_str()]);
        }
        args.push("-delete");

        self.local(&args, true).await?;
        Ok(())
    }
}

/// Turn an undecided result record into an error unless it succeeded
pub fn check_status(command: &str, status: OpStatus) -> Result<(), CommandError> {
    if status.succeeded() {
        Ok(())
    } else {
        Err(CommandError::OpFailed {
            command: command.to_string(),
            ret: status.ret,
            errno: status.errno,
            message: status.errstr,
        })
    }
}

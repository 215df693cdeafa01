//! Domain Ports - Core trait definitions for the share driver
//!
//! These traits define the boundaries between the volume lifecycle logic and
//! the systems around it: the command transport underneath and the share
//! service on top.

use crate::backend::address::ServerAddress;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

// =============================================================================
// Command Execution Port
// =============================================================================

/// Where an administrative command runs
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandTarget {
    /// The host running the driver (mount, umount, find)
    Local,
    /// A backend server; argv is the volume-management tool's argument vector
    Server(ServerAddress),
}

impl std::fmt::Display for CommandTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandTarget::Local => write!(f, "local"),
            CommandTarget::Server(server) => write!(f, "{}", server),
        }
    }
}

/// Captured output of a successful command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }
}

/// Transport or process failure raised by an executor
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Program not found: {program}")]
    NotFound { program: String },

    #[error("Command exited with status {}: {stderr}", display_status(.status))]
    Failed { status: Option<i32>, stderr: String },

    #[error("Command IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn display_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

/// Port for running administrative commands
///
/// Implementations own retries and timeouts; the driver issues each call
/// once and treats any error as final for the current phase.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `argv` against `target`
    async fn execute(
        &self,
        target: &CommandTarget,
        argv: &[String],
    ) -> std::result::Result<CommandOutput, ExecError>;
}

// =============================================================================
// Share Requests
// =============================================================================

/// A share as seen by the host service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    /// Share ID
    pub id: String,
    /// Requested size in GB
    pub size: Option<u64>,
    /// Export location (`[user@]host:/volume`) once the share is bound
    pub export_location: Option<String>,
}

impl Share {
    pub fn new(id: impl Into<String>, size: Option<u64>) -> Self {
        Self {
            id: id.into(),
            size,
            export_location: None,
        }
    }

    pub fn with_export_location(mut self, location: impl Into<String>) -> Self {
        self.export_location = Some(location.into());
        self
    }
}

/// A snapshot of a share
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Client-facing snapshot ID
    pub id: String,
    /// The share the snapshot was taken from
    pub share: Share,
}

/// An access rule to grant or revoke
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRule {
    /// Access type, e.g. `cert`
    pub access_type: String,
    /// Principal the rule applies to
    pub access_to: String,
}

impl AccessRule {
    pub fn cert(principal: impl Into<String>) -> Self {
        Self {
            access_type: "cert".to_string(),
            access_to: principal.into(),
        }
    }
}

/// Capability report for the share scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareStats {
    pub share_backend_name: String,
    pub driver_handles_share_servers: bool,
    pub vendor_name: String,
    pub driver_version: String,
    pub storage_protocol: String,
    pub reserved_percentage: u32,
    #[serde(rename = "QoS_support")]
    pub qos_support: bool,
    pub total_capacity_gb: String,
    pub free_capacity_gb: String,
    pub snapshot_support: bool,
}

// =============================================================================
// Share Driver Port
// =============================================================================

/// Port through which the host share service drives a backend
#[async_trait]
pub trait ShareDriver: Send + Sync {
    /// Resolve backend state; must succeed before any other call
    async fn do_setup(&self) -> Result<()>;

    /// Re-attach a share that already owns a volume
    async fn ensure_share(&self, share: &Share) -> Result<()>;

    /// Bind a volume to a new share, returning its export location
    async fn create_share(&self, share: &Share) -> Result<String>;

    /// Reclaim the volume bound to a share
    async fn delete_share(&self, share: &Share) -> Result<()>;

    /// Take a snapshot of a share's volume
    async fn create_snapshot(&self, snapshot: &Snapshot) -> Result<()>;

    /// Remove a snapshot
    async fn delete_snapshot(&self, snapshot: &Snapshot) -> Result<()>;

    /// Create a new share by cloning a snapshot, returning its export location
    async fn create_share_from_snapshot(&self, share: &Share, snapshot: &Snapshot)
        -> Result<String>;

    /// Grant a principal access to a share
    async fn allow_access(&self, share: &Share, access: &AccessRule) -> Result<()>;

    /// Revoke a principal's access to a share
    async fn deny_access(&self, share: &Share, access: &AccessRule) -> Result<()>;

    /// Report backend capabilities, recomputing them when `refresh` is set
    async fn get_share_stats(&self, refresh: bool) -> ShareStats;

    /// Get backend name
    fn backend_name(&self) -> &str;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type CommandExecutorRef = Arc<dyn CommandExecutor>;
pub type ShareDriverRef = Arc<dyn ShareDriver>;

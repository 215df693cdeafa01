//! GlusterFS Share Driver - Volume Lifecycle Manager
//!
//! Serves file shares from a pool of pre-created GlusterFS volumes accessed
//! over the native protocol with TLS. A share binds a whole volume; access
//! is granted per certificate common name.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                       ShareDriver (host service)                     │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                      VolumeLifecycleManager                          │
//! │  ┌──────────────────┐  ┌─────────────────┐  ┌─────────────────────┐  │
//! │  │ VolumePool       │  │ AccessControl   │  │ SnapshotManager     │  │
//! │  │ Registry + Wipe  │  │ List            │  │ + Resolver          │  │
//! │  └────────┬─────────┘  └────────┬────────┘  └──────────┬──────────┘  │
//! │           └─────────────────────┼──────────────────────┘             │
//! │                    ┌────────────┴────────────┐                       │
//! │                    │ GlusterCli + VersionGate│                       │
//! │                    └────────────┬────────────┘                       │
//! ├─────────────────────────────────┼────────────────────────────────────┤
//! │                      CommandExecutor (port)                          │
//! │            ProcessExecutor: ssh / --remote-host / local              │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`driver`]: the share driver facade
//! - [`pool`]: volume pool selection and reclaiming
//! - [`access`]: TLS allow-list management
//! - [`snapshot`]: snapshot create/delete/clone
//! - [`wipe`]: the volume wipe state machine
//! - [`backend`]: command front-end, executor, version gate
//! - [`domain`]: core port traits and request types
//! - [`config`]: driver configuration
//! - [`error`]: error types and handling

pub mod access;
pub mod backend;
pub mod config;
pub mod domain;
pub mod driver;
pub mod error;
pub mod pool;
pub mod snapshot;
pub mod wipe;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use access::{AccessControlList, AccessList, AccessType};

pub use backend::{
    Feature, FeatureGates, GlusterCli, ProcessExecutor, ProcessExecutorConfig, ServerAddress,
    VersionGate, VersionTuple, VolumeAddress,
};

pub use config::DriverConfig;

pub use domain::ports::{
    AccessRule, CommandExecutor, CommandOutput, CommandTarget, ExecError, Share, ShareDriver,
    ShareStats, Snapshot,
};

pub use driver::VolumeLifecycleManager;

pub use error::{CommandError, Error, ErrorClass, Result};

pub use pool::{PoolVolume, UsedVolume, VolumePattern, VolumePoolRegistry};

pub use snapshot::{NoSnapCache, SnapshotManager, SnapshotResolver};

pub use wipe::{WipePhase, WipeReport, WipeSequence};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

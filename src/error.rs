//! Error types for the GlusterFS share driver
//!
//! Every remote-command failure is caught where the command is issued and
//! re-raised as one of the domain kinds below. Command-level causes are kept
//! as a chained [`CommandError`] so the raw transport error stays inspectable
//! without ever being the error a caller matches on.

use crate::backend::version::VersionTuple;
use crate::domain::ports::ExecError;
use crate::wipe::WipePhase;
use thiserror::Error;

/// Unified error type for the driver
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Setup / Configuration Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Unsupported GlusterFS version {found} on {server}, minimum is {minimum}")]
    UnsupportedBackendVersion {
        server: String,
        found: VersionTuple,
        minimum: VersionTuple,
    },

    #[error("Server {server} is not managed by this driver")]
    UnknownServer { server: String },

    // =========================================================================
    // Pool Errors
    // =========================================================================
    #[error("Backend unavailable: {server}")]
    BackendUnavailable {
        server: String,
        #[source]
        source: CommandError,
    },

    #[error("No free volume available for requested size {}", display_size(.size))]
    PoolExhausted { size: Option<u64> },

    #[error("Setup of volume {volume} failed")]
    VolumeSetupFailed {
        volume: String,
        #[source]
        source: CommandError,
    },

    #[error("Volume {volume} is not managed by this driver")]
    VolumeNotManaged { volume: String },

    #[error("Volume {volume} is already bound to share {share}")]
    VolumeInUse { volume: String, share: String },

    #[error("Wipe of volume {volume} failed at {phase}")]
    WipeFailed {
        volume: String,
        phase: WipePhase,
        #[source]
        source: CommandError,
    },

    // =========================================================================
    // Access Control Errors
    // =========================================================================
    #[error("Invalid access type {access_type}: only {allowed} is supported")]
    InvalidAccessType {
        access_type: String,
        allowed: &'static str,
    },

    #[error("Access update on volume {volume} failed")]
    AccessUpdateFailed {
        volume: String,
        #[source]
        source: CommandError,
    },

    // =========================================================================
    // Snapshot Errors
    // =========================================================================
    #[error("Snapshot operation on volume {volume} failed")]
    SnapshotFailed {
        volume: String,
        #[source]
        source: CommandError,
    },

    #[error("Volume {volume} does not support snapshots: {reason}")]
    SnapshotNotSupported { volume: String, reason: String },

    #[error(
        "Failed to identify backend snapshot for {snapshot_id} on {volume}: \
         a single candidate was expected, {found} found"
    )]
    AmbiguousSnapshot {
        snapshot_id: String,
        volume: String,
        found: usize,
    },

    #[error("Cloning snapshots requires GlusterFS {minimum}, {server} runs {found}")]
    CloneNotSupported {
        server: String,
        found: VersionTuple,
        minimum: VersionTuple,
    },
}

/// Cause of a failed administrative command
#[derive(Error, Debug)]
pub enum CommandError {
    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("Malformed output from `{command}`: {reason}")]
    Malformed { command: String, reason: String },

    #[error("Operation `{command}` returned {ret} (errno {errno}): {message}")]
    OpFailed {
        command: String,
        ret: i32,
        errno: i32,
        message: String,
    },

    #[error("Option {option} is not set on volume {volume}")]
    MissingOption { volume: String, option: String },

    #[error("Scratch directory error: {0}")]
    Scratch(#[source] std::io::Error),

    #[error("Command not issued: {reason}")]
    Refused { reason: String },
}

/// Coarse classification of an error for the host service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Feature absent; the host may report "not supported" instead of failure
    Soft,
    /// The operation failed; the driver stays usable
    Failed,
    /// The driver cannot become ready
    Fatal,
}

impl Error {
    /// Classify this error
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::SnapshotNotSupported { .. } => ErrorClass::Soft,

            Error::UnsupportedBackendVersion { .. } | Error::Configuration(_) => {
                ErrorClass::Fatal
            }

            _ => ErrorClass::Failed,
        }
    }

    /// Check if this error only signals an absent feature
    pub fn is_soft(&self) -> bool {
        self.class() == ErrorClass::Soft
    }

    /// Check if this error prevents the driver from becoming ready
    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Fatal
    }
}

fn display_size(size: &Option<u64>) -> String {
    match size {
        Some(s) => format!("{}G", s),
        None => "any".to_string(),
    }
}

/// Result type alias for the driver
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_classes() {
        let err = Error::SnapshotNotSupported {
            volume: "host1:/gv1".into(),
            reason: "no thin lvm".into(),
        };
        assert!(err.is_soft());
        assert!(!err.is_fatal());

        let err = Error::UnsupportedBackendVersion {
            server: "host1".into(),
            found: VersionTuple::new(3, 5),
            minimum: VersionTuple::new(3, 6),
        };
        assert!(err.is_fatal());

        let err = Error::PoolExhausted { size: Some(2) };
        assert_eq!(err.class(), ErrorClass::Failed);
        assert_eq!(err.to_string(), "No free volume available for requested size 2G");
    }

    #[test]
    fn test_cause_is_chained() {
        let err = Error::VolumeSetupFailed {
            volume: "host1:/gv1".into(),
            source: CommandError::Exec(ExecError::Failed {
                status: Some(1),
                stderr: "volume set: failed".into(),
            }),
        };
        let cause = err.source().map(|s| s.to_string()).unwrap_or_default();
        assert!(cause.contains("volume set: failed"));
    }
}

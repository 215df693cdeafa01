//! Access Control
//!
//! Principals allowed to mount a volume are certificate common names kept in
//! the volume's `auth.ssl-allow` option as one comma-joined value. The first
//! entry is the baseline: the backend servers' own principal, which must
//! never be revoked.

use crate::backend::address::VolumeAddress;
use crate::backend::cli::{GlusterCli, AUTH_SSL_ALLOW};
use crate::error::{CommandError, Error, Result};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

// =============================================================================
// Access Type
// =============================================================================

/// Supported access rule types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    /// TLS certificate common name
    Cert,
}

impl AccessType {
    const ALLOWED: &'static str = "cert";

    /// Validate a rule's access type
    pub fn parse(access_type: &str) -> Result<Self> {
        match access_type {
            "cert" => Ok(AccessType::Cert),
            other => Err(Error::InvalidAccessType {
                access_type: other.to_string(),
                allowed: Self::ALLOWED,
            }),
        }
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessType::Cert => write!(f, "cert"),
        }
    }
}

// =============================================================================
// Access List
// =============================================================================

/// Ordered, duplicate-free list of principals
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessList {
    entries: Vec<String>,
}

impl AccessList {
    /// Parse a comma-joined option value, dropping blanks and repeats
    pub fn parse(value: &str) -> Self {
        let mut list = Self::default();
        for principal in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            list.push(principal);
        }
        list
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, principal: &str) -> bool {
        self.entries.iter().any(|p| p == principal)
    }

    pub fn baseline(&self) -> Option<&str> {
        self.entries.first().map(String::as_str)
    }

    /// Append a principal; false if it was already present
    pub fn push(&mut self, principal: &str) -> bool {
        if self.contains(principal) {
            return false;
        }
        self.entries.push(principal.to_string());
        true
    }

    /// Remove a principal; false if it was absent
    pub fn remove(&mut self, principal: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|p| p != principal);
        self.entries.len() != before
    }

    /// The value to store in the volume option
    pub fn to_option_value(&self) -> String {
        self.entries.join(",")
    }
}

// =============================================================================
// Access Control List Manager
// =============================================================================

/// Reads and rewrites volume allow-lists
pub struct AccessControlList {
    cli: Arc<GlusterCli>,
}

impl AccessControlList {
    pub fn new(cli: Arc<GlusterCli>) -> Self {
        Self { cli }
    }

    /// Current allow-list, `None` if the option is unset
    pub async fn read(
        &self,
        volume: &VolumeAddress,
    ) -> std::result::Result<Option<AccessList>, CommandError> {
        Ok(self
            .cli
            .volume_option(volume, AUTH_SSL_ALLOW)
            .await?
            .map(|value| AccessList::parse(&value)))
    }

    async fn write(
        &self,
        volume: &VolumeAddress,
        list: &AccessList,
    ) -> std::result::Result<(), CommandError> {
        self.cli
            .set_option(volume, AUTH_SSL_ALLOW, &list.to_option_value())
            .await
    }

    /// Grant `principal`; returns whether the list changed
    pub async fn allow(
        &self,
        volume: &VolumeAddress,
        access_type: &str,
        principal: &str,
    ) -> Result<bool> {
        AccessType::parse(access_type)?;
        let failed = |source| Error::AccessUpdateFailed {
            volume: volume.to_string(),
            source,
        };

        let mut list = self.read(volume).await.map_err(failed)?.unwrap_or_default();
        if !list.push(principal) {
            debug!("{} already allowed on {}", principal, volume);
            return Ok(false);
        }

        self.write(volume, &list).await.map_err(failed)?;
        self.cli.restart(volume).await.map_err(failed)?;
        info!("Allowed {} on {}", principal, volume);
        Ok(true)
    }

    /// Revoke `principal`; returns whether the list changed
    pub async fn deny(
        &self,
        volume: &VolumeAddress,
        access_type: &str,
        principal: &str,
    ) -> Result<bool> {
        AccessType::parse(access_type)?;
        let failed = |source| Error::AccessUpdateFailed {
            volume: volume.to_string(),
            source,
        };

        let mut list = match self.read(volume).await.map_err(failed)? {
            Some(list) => list,
            None => return Ok(false),
        };
        if !list.remove(principal) {
            debug!("{} not allowed on {}, nothing to deny", principal, volume);
            return Ok(false);
        }

        self.write(volume, &list).await.map_err(failed)?;
        self.cli.restart(volume).await.map_err(failed)?;
        info!("Denied {} on {}", principal, volume);
        Ok(true)
    }

    /// Drop every principal but the baseline; returns whether the list changed
    ///
    /// Does not restart the volume. A volume without an allow-list has no
    /// baseline and cannot be served.
    pub async fn reset_to_baseline(
        &self,
        volume: &VolumeAddress,
    ) -> std::result::Result<bool, CommandError> {
        let missing = || CommandError::MissingOption {
            volume: volume.to_string(),
            option: AUTH_SSL_ALLOW.to_string(),
        };

        let list = self.read(volume).await?.ok_or_else(missing)?;
        let baseline = list.baseline().ok_or_else(missing)?;
        if list.len() == 1 {
            return Ok(false);
        }

        self.write(volume, &AccessList::parse(baseline)).await?;
        debug!("Reset allow-list of {} to {}", volume, baseline);
        Ok(true)
    }
}

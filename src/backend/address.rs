//! Backend Addresses
//!
//! Server and volume identities in the `[user@]host` and
//! `[user@]host:/volume` forms the backend tooling and share export
//! locations use.

use crate::error::{Error, Result};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Server Address
// =============================================================================

/// A backend server, optionally with the remote user to log in as
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerAddress {
    user: Option<String>,
    host: String,
}

impl ServerAddress {
    pub fn new(user: Option<&str>, host: impl Into<String>) -> Self {
        Self {
            user: user.map(str::to_string),
            host: host.into(),
        }
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Address of a volume on this server
    pub fn volume(&self, name: impl Into<String>) -> VolumeAddress {
        VolumeAddress {
            server: self.clone(),
            volume: name.into(),
        }
    }
}

impl FromStr for ServerAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidAddress {
            address: s.to_string(),
            reason: reason.to_string(),
        };

        let (user, host) = match s.split_once('@') {
            Some((user, host)) => {
                if user.is_empty() {
                    return Err(invalid("empty user"));
                }
                (Some(user), host)
            }
            None => (None, s),
        };

        if host.is_empty() {
            return Err(invalid("empty host"));
        }
        if host.contains(['@', '/', ':']) || host.chars().any(char::is_whitespace) {
            return Err(invalid("malformed host"));
        }

        Ok(Self::new(user, host))
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.user {
            Some(user) => write!(f, "{}@{}", user, self.host),
            None => write!(f, "{}", self.host),
        }
    }
}

impl Serialize for ServerAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// =============================================================================
// Volume Address
// =============================================================================

/// Identity of a backend volume: the server administering it and its name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VolumeAddress {
    server: ServerAddress,
    volume: String,
}

impl VolumeAddress {
    pub fn server(&self) -> &ServerAddress {
        &self.server
    }

    pub fn volume(&self) -> &str {
        &self.volume
    }

    /// Source for a native-protocol mount (`host:/volume`, no user)
    pub fn mount_source(&self) -> String {
        format!("{}:/{}", self.server.host, self.volume)
    }
}

impl FromStr for VolumeAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (server, volume) = s.split_once(":/").ok_or_else(|| Error::InvalidAddress {
            address: s.to_string(),
            reason: "expected [user@]host:/volume".to_string(),
        })?;

        if volume.is_empty() || volume.contains('/') {
            return Err(Error::InvalidAddress {
                address: s.to_string(),
                reason: "malformed volume name".to_string(),
            });
        }

        Ok(server.parse::<ServerAddress>()?.volume(volume))
    }
}

impl fmt::Display for VolumeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:/{}", self.server, self.volume)
    }
}

impl Serialize for VolumeAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

//! Volume name pattern
//!
//! A regular expression over volume names, with a `#{size}` placeholder
//! standing for the volume's size in GB. Matching is anchored at the start of
//! the name only.

use crate::error::{Error, Result};
use regex::Regex;

const SIZE_PLACEHOLDER: &str = "#{size}";
const SIZE_GROUP: &str = "size";

/// Compiled volume name pattern
#[derive(Debug, Clone)]
pub struct VolumePattern {
    source: String,
    regex: Regex,
}

impl VolumePattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let expanded = pattern.replace(SIZE_PLACEHOLDER, &format!(r"(?P<{}>\d+)", SIZE_GROUP));
        let regex = Regex::new(&format!("^(?:{})", expanded)).map_err(|e| {
            Error::Configuration(format!("Invalid volume pattern {:?}: {}", pattern, e))
        })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match a volume name
    ///
    /// `None` if the name is not admitted, otherwise the size captured by the
    /// placeholder, if the pattern has one.
    pub fn admit(&self, name: &str) -> Option<Option<u64>> {
        let caps = self.regex.captures(name)?;
        Some(
            caps.name(SIZE_GROUP)
                .and_then(|m| m.as_str().parse::<u64>().ok()),
        )
    }
}

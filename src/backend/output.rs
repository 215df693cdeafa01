//! Command Output Decoding
//!
//! Typed decoders for the volume-management tool's output: the structured
//! `--xml` result record and the line-oriented listings. Every decoder fails
//! closed: anything that does not match the expected shape is an error.

use super::version::VersionTuple;
use serde::Deserialize;

// =============================================================================
// Structured Output
// =============================================================================

/// The `{opRet, opErrno, opErrstr}` record of a structured response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpStatus {
    pub ret: i32,
    pub errno: i32,
    pub errstr: String,
}

impl OpStatus {
    pub fn succeeded(&self) -> bool {
        self.ret == 0
    }
}

#[derive(Debug, Deserialize)]
struct CliOutput {
    #[serde(rename = "opRet")]
    op_ret: i32,
    #[serde(rename = "opErrno")]
    op_errno: i32,
    #[serde(rename = "opErrstr", default)]
    op_errstr: String,
    #[serde(rename = "volInfo", default)]
    vol_info: Option<VolInfo>,
}

#[derive(Debug, Deserialize)]
struct VolInfo {
    volumes: VolumeList,
}

#[derive(Debug, Deserialize)]
struct VolumeList {
    #[serde(rename = "volume", default)]
    entries: Vec<VolumeEntry>,
}

#[derive(Debug, Deserialize)]
struct VolumeEntry {
    name: String,
    #[serde(default)]
    options: Option<OptionList>,
}

#[derive(Debug, Deserialize)]
struct OptionList {
    #[serde(rename = "option", default)]
    entries: Vec<OptionEntry>,
}

#[derive(Debug, Deserialize)]
struct OptionEntry {
    name: String,
    #[serde(default)]
    value: String,
}

fn decode(xml: &str) -> Result<CliOutput, String> {
    if xml.trim().is_empty() {
        return Err("empty output".to_string());
    }
    quick_xml::de::from_str(xml).map_err(|e| e.to_string())
}

/// Decode the result record of a structured response
pub fn decode_op_status(xml: &str) -> Result<OpStatus, String> {
    let out = decode(xml)?;
    Ok(OpStatus {
        ret: out.op_ret,
        errno: out.op_errno,
        errstr: out.op_errstr,
    })
}

/// Decode `--xml volume info` and extract one option of one volume
///
/// Returns the result record alongside the option value, which is `None`
/// when the volume carries no such option.
pub fn decode_volume_option(
    xml: &str,
    volume: &str,
    option: &str,
) -> Result<(OpStatus, Option<String>), String> {
    let out = decode(xml)?;
    let status = OpStatus {
        ret: out.op_ret,
        errno: out.op_errno,
        errstr: out.op_errstr,
    };
    if !status.succeeded() {
        return Ok((status, None));
    }

    let info = out.vol_info.ok_or_else(|| "missing volInfo".to_string())?;
    let entry = info
        .volumes
        .entries
        .into_iter()
        .find(|v| v.name == volume)
        .ok_or_else(|| format!("volume {} not in volInfo", volume))?;

    let value = entry
        .options
        .map(|o| o.entries)
        .unwrap_or_default()
        .into_iter()
        .find(|o| o.name == option)
        .map(|o| o.value);

    Ok((status, value))
}

// =============================================================================
// Plain-Text Output
// =============================================================================

/// Parse `volume list`: one volume name per line
pub fn parse_volume_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter(|l| !l.starts_with("No volumes present"))
        .map(str::to_string)
        .collect()
}

/// Parse `--version`, whose first two words are `glusterfs <major>.<minor>...`
pub fn parse_version(text: &str) -> Result<VersionTuple, String> {
    let mut words = text.split_whitespace();
    match (words.next(), words.next()) {
        (Some("glusterfs"), Some(version)) => version.parse(),
        _ => Err(format!("unrecognized version info {:?}", text.trim())),
    }
}

/// Lines of a `snapshot list` output mentioning a client snapshot ID
pub fn matching_snapshots<'a>(text: &'a str, snapshot_id: &str) -> Vec<&'a str> {
    text.lines()
        .map(str::trim)
        .filter(|l| l.contains(snapshot_id))
        .collect()
}

//! `system/info` identity payloads.

use super::types::{ApiVersion, Capability, ComponentCategory};
use super::{parse_json, PacketError};
use serde::{Deserialize, Deserializer};
use std::net::Ipv4Addr;

/// Firmware platform block nested inside the identity payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlatformInfo {
    pub name: String,
    #[serde(default)]
    pub variant: Option<String>,
    pub ver: String,
    pub gb_pkg_ver: String,
    pub bootloader_ver: String,
}

/// Sanitized `system/info` payload.
///
/// Unknown keys are dropped during deserialization; address fields are
/// checked semantically by [`parse_system_info`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SystemInfo {
    pub api_ver: u32,
    #[serde(default)]
    pub gb_lib_ver: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub category: ComponentCategory,
    #[serde(deserialize_with = "capability_labels")]
    pub capabilities: Capability,
    #[serde(default)]
    pub platform: Option<PlatformInfo>,
    pub mac: String,
    pub ip: String,
    pub num_props: u32,
}

fn capability_labels<'de, D>(deserializer: D) -> Result<Capability, D::Error>
where
    D: Deserializer<'de>,
{
    let labels = Vec::<String>::deserialize(deserializer)?;
    Ok(Capability::from_labels(labels.iter().map(String::as_str)))
}

/// Parse and validate an identity payload.
pub fn parse_system_info(payload: &[u8]) -> Result<SystemInfo, PacketError> {
    let info: SystemInfo = parse_json("system info", payload)?;
    if ApiVersion::from_raw(info.api_ver).is_none() {
        return Err(PacketError::UnsupportedApiVersion(info.api_ver));
    }
    if !valid_mac(&info.mac) {
        return Err(PacketError::InvalidMac(info.mac));
    }
    if !valid_ip(&info.ip) {
        return Err(PacketError::InvalidIp(info.ip));
    }
    Ok(info)
}

/// Six two-digit hex pairs, colon- or dash-separated.
fn valid_mac(mac: &str) -> bool {
    let separator = if mac.contains(':') { ':' } else { '-' };
    let pairs: Vec<&str> = mac.split(separator).collect();
    pairs.len() == 6
        && pairs
            .iter()
            .all(|pair| pair.len() == 2 && pair.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Dotted quad, each octet 0-255, no leading zeros.
fn valid_ip(ip: &str) -> bool {
    ip.parse::<Ipv4Addr>().is_ok()
}

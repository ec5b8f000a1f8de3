//! Property registration records.

use super::types::PropertyType;
use super::{parse_json, PacketError};
use crate::codec::format::FormatSpec;
use serde::Deserialize;

/// Sanitized property registration. Unknown keys are dropped.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PropertyRegistration {
    pub path: String,
    pub index: u32,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(rename = "type")]
    pub prop_type: PropertyType,
    pub format: String,
    pub length: u32,
    pub settable: bool,
    pub gettable: bool,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub step: Option<f64>,
    #[serde(default)]
    pub ui_hidden: Option<bool>,
}

/// Parse and validate one registration record.
pub fn parse_property_registration(payload: &[u8]) -> Result<PropertyRegistration, PacketError> {
    let reg: PropertyRegistration = parse_json("property registration", payload)?;
    if !valid_path(&reg.path) {
        return Err(PacketError::InvalidPath(reg.path));
    }
    // An empty format is the "no payload" declaration and pairs with length 0;
    // anything else must parse and carry a positive record count.
    if reg.format.is_empty() != (reg.length == 0) {
        return Err(PacketError::FormatLength {
            format: reg.format,
            length: reg.length,
        });
    }
    if !reg.format.is_empty() {
        FormatSpec::parse(&reg.format).map_err(|err| PacketError::InvalidFormat {
            format: reg.format.clone(),
            detail: err.to_string(),
        })?;
    }
    Ok(reg)
}

/// Slash-separated, no empty segments, printable ASCII minus `#`, `$`, `+`.
fn valid_path(path: &str) -> bool {
    !path.is_empty()
        && path.split('/').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| matches!(c, ' '..='~') && !matches!(c, '#' | '$' | '+'))
        })
}

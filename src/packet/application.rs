//! `app/info` application payloads.

use super::{parse_json, PacketError};
use serde::Deserialize;

/// Sanitized `app/info` payload. Unknown keys are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApplicationInfo {
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub ver: Option<String>,
    #[serde(default)]
    pub gb_pkg_ver: Option<String>,
    pub num_props: u32,
}

pub fn parse_application_info(payload: &[u8]) -> Result<ApplicationInfo, PacketError> {
    parse_json("application info", payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_num_props_only() {
        let info = parse_application_info(br#"{"num_props": 1}"#).unwrap();
        assert_eq!(info.num_props, 1);
        assert!(info.file_name.is_none());
    }

    #[test]
    fn test_full_payload() {
        let info = parse_application_info(
            br#"{"file_name": "show.bin", "ver": "2.1", "gb_pkg_ver": "0.8.1", "num_props": 4, "extra": null}"#,
        )
        .unwrap();
        assert_eq!(info.file_name.as_deref(), Some("show.bin"));
        assert_eq!(info.num_props, 4);
    }

    #[test]
    fn test_missing_num_props() {
        assert!(matches!(
            parse_application_info(br#"{"ver": "2.1"}"#),
            Err(PacketError::Schema { .. })
        ));
    }
}

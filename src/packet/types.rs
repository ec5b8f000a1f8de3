//! Closed sums shared across the ingestion core.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical producer on a component. Every component carries exactly two
/// independent registrations, one per source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    System,
    App,
}

impl Source {
    pub const ALL: [Source; 2] = [Source::System, Source::App];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::App => "app",
        }
    }

    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "system" => Some(Self::System),
            "app" => Some(Self::App),
            _ => None,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for Source {}

/// Protocol generations this build understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiVersion {
    V2,
}

impl ApiVersion {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            2 => Some(Self::V2),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            Self::V2 => 2,
        }
    }
}

/// Hardware component category announced in the identity payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentCategory {
    Generic,
    Presence,
}

bitflags! {
    /// Capability surface a component announces in its identity payload.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Capability: u8 {
        const OTA = 0b001;
        const IDENTIFY = 0b010;
        const FILESYSTEM = 0b100;
    }
}

impl Capability {
    /// Parse one capability label; unknown labels map to `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "OTA" => Some(Self::OTA),
            "identify" => Some(Self::IDENTIFY),
            "filesystem" => Some(Self::FILESYSTEM),
            _ => None,
        }
    }

    /// Fold a label list into a flag set, discarding unknown labels.
    pub fn from_labels<'a>(labels: impl IntoIterator<Item = &'a str>) -> Self {
        labels
            .into_iter()
            .filter_map(Self::from_label)
            .fold(Self::empty(), |acc, cap| acc | cap)
    }
}

/// Declared value layout of a registered property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    #[serde(rename = "gmbnd_primitive")]
    Primitive,
    #[serde(rename = "gmbnd_color")]
    Color,
    #[serde(rename = "gmbnd_led")]
    Led,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primitive => "gmbnd_primitive",
            Self::Color => "gmbnd_color",
            Self::Led => "gmbnd_led",
        }
    }

    pub fn is_composite(&self) -> bool {
        !matches!(self, Self::Primitive)
    }
}

/// Severity carried by a `<source>/log` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Warning,
    Error,
}

impl LogLevel {
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "debug" => Some(Self::Debug),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_segments() {
        assert_eq!(Source::from_segment("system"), Some(Source::System));
        assert_eq!(Source::from_segment("app"), Some(Source::App));
        assert_eq!(Source::from_segment("device"), None);
        assert_eq!(Source::System.to_string(), "system");
    }

    #[test]
    fn test_api_version() {
        assert_eq!(ApiVersion::from_raw(2), Some(ApiVersion::V2));
        assert_eq!(ApiVersion::from_raw(1), None);
        assert_eq!(ApiVersion::V2.as_u32(), 2);
    }

    #[test]
    fn test_capability_labels() {
        let caps = Capability::from_labels(["OTA", "filesystem", "warp-drive"]);
        assert!(caps.contains(Capability::OTA));
        assert!(caps.contains(Capability::FILESYSTEM));
        assert!(!caps.contains(Capability::IDENTIFY));
    }

    #[test]
    fn test_property_type_wire_names() {
        let t: PropertyType = serde_json::from_str("\"gmbnd_color\"").unwrap();
        assert_eq!(t, PropertyType::Color);
        assert!(t.is_composite());
        assert!(!PropertyType::Primitive.is_composite());
        assert!(serde_json::from_str::<PropertyType>("\"gmbnd_blob\"").is_err());
    }

    #[test]
    fn test_log_level_labels() {
        assert_eq!(LogLevel::from_label("warning"), Some(LogLevel::Warning));
        assert_eq!(LogLevel::from_label("fatal"), None);
    }
}

//! V2 packet validation.
//!
//! Inbound JSON payloads are deserialized into typed records and then run
//! through explicit semantic checks (address formats, closed sets, the
//! format/length pairing). Unknown keys are discarded on the way in.
//!
//! - `types` - Closed sums shared across the crate
//! - `identity` - `system/info` payloads
//! - `application` - `app/info` payloads
//! - `property` - Property registration records
//! - `log` - `<source>/log` payloads

pub mod application;
pub mod identity;
pub mod log;
pub mod property;
pub mod types;

pub use application::{parse_application_info, ApplicationInfo};
pub use identity::{parse_system_info, PlatformInfo, SystemInfo};
pub use log::{parse_log_record, LogRecord};
pub use property::{parse_property_registration, PropertyRegistration};
pub use types::{ApiVersion, Capability, ComponentCategory, LogLevel, PropertyType, Source};

use serde::de::DeserializeOwned;
use thiserror::Error;

/// Why a payload was rejected.
#[derive(Debug, Error)]
pub enum PacketError {
    /// The payload is not UTF-8 JSON at all.
    #[error("payload is not valid JSON: {0}")]
    Json(serde_json::Error),
    /// The payload parsed as JSON but does not match the expected shape.
    #[error("payload does not match the {kind} schema: {detail}")]
    Schema { kind: &'static str, detail: String },
    #[error("malformed mac address {0:?}")]
    InvalidMac(String),
    #[error("malformed ip address {0:?}")]
    InvalidIp(String),
    #[error("invalid property path {0:?}")]
    InvalidPath(String),
    #[error("length {length} does not agree with format {format:?}")]
    FormatLength { format: String, length: u32 },
    #[error("invalid value format {format:?}: {detail}")]
    InvalidFormat { format: String, detail: String },
    #[error("unsupported api version {0}")]
    UnsupportedApiVersion(u32),
    #[error("unknown log severity {0:?}")]
    UnknownLogLevel(String),
    #[error("log text must be a string")]
    InvalidLogText,
}

/// Deserialize a payload, distinguishing malformed JSON from a shape
/// mismatch so callers can apply the right abandon policy.
pub(crate) fn parse_json<T: DeserializeOwned>(
    kind: &'static str,
    payload: &[u8],
) -> Result<T, PacketError> {
    serde_json::from_slice(payload).map_err(|err| match err.classify() {
        serde_json::error::Category::Data => PacketError::Schema {
            kind,
            detail: err.to_string(),
        },
        _ => PacketError::Json(err),
    })
}

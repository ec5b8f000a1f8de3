//! `<source>/log` payloads.
//!
//! Parsed by hand so a bad severity and a bad text body surface as
//! distinct errors rather than one opaque shape mismatch.

use super::types::LogLevel;
use super::PacketError;
use serde::Serialize;

/// A log line relayed from a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogRecord {
    pub severity: LogLevel,
    pub text: String,
}

pub fn parse_log_record(payload: &[u8]) -> Result<LogRecord, PacketError> {
    let value: serde_json::Value =
        serde_json::from_slice(payload).map_err(PacketError::Json)?;
    let severity_label = value
        .get("severity")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| PacketError::UnknownLogLevel(
            value.get("severity").map(ToString::to_string).unwrap_or_default(),
        ))?;
    let severity = LogLevel::from_label(severity_label)
        .ok_or_else(|| PacketError::UnknownLogLevel(severity_label.to_string()))?;
    let text = match value.get("text") {
        Some(serde_json::Value::String(text)) => text.clone(),
        _ => return Err(PacketError::InvalidLogText),
    };
    Ok(LogRecord { severity, text })
}
